//! HTTP handlers for uploading and fetching images.
//! Payloads are small and read whole; storage concerns live in
//! `ImageService`.

use crate::{
    errors::AppError,
    services::{image_service::ImageService, object_store::StoreError},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Serialize;
use tracing::warn;

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "file";

/// Returned when no per-extension type is known. Scriptable formats such
/// as SVG deliberately land here.
const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: u16,
    pub url: String,
}

/// `POST /upload` — multipart form with a `file` field.
pub async fn upload_image(
    State(service): State<ImageService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let limit = service.store.max_size();

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| multipart_error(err, limit))?;
        upload = Some((bytes, content_type, filename));
        break;
    }

    // a form without the field is treated like a non-image upload
    let Some((bytes, content_type, filename)) = upload else {
        return Err(StoreError::UnsupportedType { declared: None }.into());
    };

    let id = service
        .upload(&bytes, content_type.as_deref(), filename.as_deref())
        .await?;

    let url = format!("{}://{}/{}", request_scheme(&headers), request_host(&headers), id);
    Ok(Json(UploadResponse {
        status: StatusCode::OK.as_u16(),
        url,
    }))
}

/// `GET /{object_id}` — raw bytes of a live upload, 404 otherwise.
pub async fn download_image(
    State(service): State<ImageService>,
    Path(object_id): Path<String>,
) -> Result<Response, AppError> {
    let (id, bytes) = service.download(&object_id).await?;
    let length = bytes.len();

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(id.extension())),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    Ok(response)
}

/// Map a multipart failure. A body over the transport limit is reported
/// with the same text as an oversize file.
fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return StoreError::TooLarge { limit }.into();
    }
    warn!("malformed multipart upload: {}", err);
    AppError::bad_request(err.body_text())
}

fn request_scheme(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http")
}

fn request_host(headers: &HeaderMap) -> &str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("localhost")
}

fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        _ => FALLBACK_CONTENT_TYPE,
    }
}
