//! src/services/object_store.rs
//!
//! ObjectStore — validated put/get/delete of image payloads stored flat in
//! a single upload directory as `base_path/<object id>`. There is no
//! metadata database: the id is the file name and carries its own
//! creation time.

use crate::{models::object_id::ObjectId, services::id_generator::IdGenerator};
use bytes::Bytes;
use std::{
    ffi::{OsStr, OsString},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default upload size limit (5 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// How many fresh ids to try before giving up on a name collision.
const MAX_CREATE_ATTEMPTS: usize = 4;

const IMAGE_MIME_PREFIX: &str = "image/";

/// Contents of the readiness scratch file.
const SCRATCH_BYTES: &[u8] = b"readyz";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("only image uploads are accepted (JPEG/PNG/GIF)")]
    UnsupportedType { declared: Option<String> },
    #[error("file size must not exceed {} ({limit} bytes)", human_size(.limit))]
    TooLarge { limit: usize },
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// ObjectStore owns the bytes in the upload directory.
///
/// Nothing else writes there; the sweeper removes files only through
/// [`ObjectStore::delete`] and [`ObjectStore::purge`]. No per-path locking
/// is done, so a `get` racing a `delete` may see either outcome.
pub struct ObjectStore {
    /// Directory holding one file per stored object.
    base_path: PathBuf,

    ids: IdGenerator,

    /// Largest accepted payload in bytes.
    max_size: usize,
}

impl ObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, ids: IdGenerator, max_size: usize) -> Self {
        Self {
            base_path: base_path.into(),
            ids,
            max_size,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.base_path.join(id.as_str())
    }

    /// Validate and store one upload.
    ///
    /// - `content_type` must start with `image/`
    /// - `bytes` must not exceed the configured limit
    /// - the extension comes from `filename` (see [`extension_of`])
    ///
    /// The whole buffer is written in one go to a file that must not
    /// already exist. Nothing touches the disk when validation fails.
    pub async fn put(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> StoreResult<ObjectId> {
        self.validate(bytes.len(), content_type)?;
        let extension = filename.map(extension_of).unwrap_or_default();

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let id = self.ids.generate(extension);
            let path = self.object_path(&id);
            match write_new(&path, bytes).await {
                Ok(()) => {
                    debug!("stored {} ({} bytes)", id, bytes.len());
                    return Ok(id);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!("object id {} already taken (attempt {}), regenerating", id, attempt);
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }

        Err(StoreError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate an unused object id",
        )))
    }

    fn validate(&self, size: usize, content_type: Option<&str>) -> StoreResult<()> {
        let is_image = content_type
            .and_then(|ct| ct.get(..IMAGE_MIME_PREFIX.len()))
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(IMAGE_MIME_PREFIX));
        if !is_image {
            return Err(StoreError::UnsupportedType {
                declared: content_type.map(str::to_string),
            });
        }
        if size > self.max_size {
            return Err(StoreError::TooLarge {
                limit: self.max_size,
            });
        }
        Ok(())
    }

    /// Read a stored object in full.
    ///
    /// Every failure (missing, permissions, deleted mid-read) is reported
    /// as `NotFound`; expired and never-existing objects look the same.
    pub async fn get(&self, id: &ObjectId) -> StoreResult<Bytes> {
        let path = self.object_path(id);
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    debug!("reading {} failed: {}", path.display(), err);
                }
                Err(StoreError::NotFound(id.to_string()))
            }
        }
    }

    /// Remove a stored object. A missing file is `NotFound`.
    pub async fn delete(&self, id: &ObjectId) -> StoreResult<()> {
        let path = self.object_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Names of every entry currently in the upload directory.
    pub async fn entries(&self) -> io::Result<Vec<OsString>> {
        let mut dir = fs::read_dir(&self.base_path).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name());
        }
        Ok(names)
    }

    /// Write, read back and remove a scratch file in the upload directory.
    ///
    /// The scratch name starts with a dot, so it never decodes as an id and
    /// is never served. One left behind by a failed removal is cleared by
    /// the next startup reconciliation.
    pub async fn check_writable(&self) -> io::Result<()> {
        let path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        write_new(&path, SCRATCH_BYTES).await?;

        let read = fs::read(&path).await;
        let removed = fs::remove_file(&path).await;
        match read {
            Ok(bytes) if bytes == SCRATCH_BYTES => removed,
            Ok(_) => Err(io::Error::new(
                ErrorKind::InvalidData,
                "scratch file content mismatch",
            )),
            Err(err) => Err(err),
        }
    }

    /// Remove an arbitrary entry of the upload directory, file or directory.
    pub async fn purge(&self, name: &OsStr) -> io::Result<()> {
        let path = self.base_path.join(name);
        let meta = fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        }
    }
}

/// Extension of a client file name: the last dot-segment.
///
/// No dot, a trailing dot, or a segment with anything but ASCII
/// alphanumerics all give an empty extension.
pub fn extension_of(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) if ext.bytes().all(|b| b.is_ascii_alphanumeric()) => ext,
        _ => "",
    }
}

/// Create `path` (which must not exist) and write `bytes` to it.
///
/// A failed write removes the partial file.
async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    if let Err(err) = file.write_all(bytes).await {
        let _ = fs::remove_file(path).await;
        return Err(err);
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(path).await;
        return Err(err);
    }
    Ok(())
}

fn human_size(bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;
    if *bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if *bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes}B")
    }
}
