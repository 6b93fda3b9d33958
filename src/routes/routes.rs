//! Defines routes for the image drop service.
//!
//! ## Structure
//! - `POST /upload`        — multipart upload, returns a public URL
//! - `GET  /{object_id}`   — fetch a live upload
//! - `GET  /`, `/index.html`, `/static/*` — bundled front-end
//! - `GET  /healthz`, `/readyz` — health checks
//!
//! Static segments win over `/{object_id}`; generated ids always contain
//! an underscore, so they never collide with the fixed routes.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{download_image, upload_image},
    },
    services::image_service::ImageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Room for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build and return the router.
///
/// `max_upload_bytes` only sizes the transport body limit; the per-file
/// limit itself is enforced by the object store.
pub fn routes(public_dir: &Path, max_upload_bytes: usize) -> Router<ImageService> {
    let index = public_dir.join("index.html");

    Router::new()
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // front-end
        .route_service("/", ServeFile::new(&index))
        .route_service("/index.html", ServeFile::new(&index))
        .nest_service("/static", ServeDir::new(public_dir.join("static")))
        // objects
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/{object_id}", get(download_image))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
