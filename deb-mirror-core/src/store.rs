//! # store: the target object store seam
//!
//! The synchroniser only needs two operations from a target store: a metadata lookup
//! (existence plus stored checksum) and a streamed write. Both are expressed by the
//! [`ObjectStore`] trait so real clients and test mocks are interchangeable.
//!
//! One store handle is shared by the checker and every transfer worker, so implementations
//! must accept concurrent outstanding requests through `&self`.
//!
//! [`FsStore`] is a local-directory implementation used for on-disk mirrors and tests.
//! The HTTP client lives in the CLI crate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use md5::{Digest, Md5};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::ByteStream;

/// Metadata returned for an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    /// Lowercase hex MD5 of the stored bytes.
    pub md5: String,
}

/// Options for [`ObjectStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutOptions {
    /// Expected length; the store may pre-allocate or reject a body of another length.
    pub size: Option<u64>,
    /// Create missing parent containers.
    pub mkdirs: bool,
}

/// Trait for the store mirrored artifacts are written to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Looks up an object. `Ok(None)` means it does not exist; any `Err` means the
    /// store state is unknown.
    async fn info(&self, path: &str) -> Result<Option<ObjectInfo>, StoreError>;

    /// Streams `body` into the object at `path`, replacing it.
    async fn put(&self, path: &str, body: ByteStream, options: PutOptions)
        -> Result<(), StoreError>;
}

/// Converts a stored checksum to lowercase hex. Accepts hex as-is and base64 (as sent in
/// an HTTP `Content-MD5` header). Returns `None` for anything that is not an MD5 digest.
pub fn normalize_md5(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(raw.to_ascii_lowercase());
    }
    let decoded = base64::engine::general_purpose::STANDARD.decode(raw).ok()?;
    (decoded.len() == 16).then(|| hex::encode(decoded))
}

/// Joins a store base path and a relative path with exactly one `/` between them.
pub fn join_store_path(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        format!("/{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

/// A target store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a store path onto the local filesystem, refusing anything that would
    /// escape the root.
    pub fn local_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut local = self.root.clone();
        let mut depth = 0usize;
        for component in path.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(StoreError::InvalidPath(path.to_owned())),
                c => {
                    local.push(c);
                    depth += 1;
                }
            }
        }
        if depth == 0 {
            return Err(StoreError::InvalidPath(path.to_owned()));
        }
        Ok(local)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn info(&self, path: &str) -> Result<Option<ObjectInfo>, StoreError> {
        let local = self.local_path(path)?;
        let mut file = match tokio::fs::File::open(&local).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path, "[STORE] Object not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if meta.is_dir() {
            return Err(StoreError::InvalidPath(path.to_owned()));
        }

        let mut hasher = Md5::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Some(ObjectInfo {
            size: meta.len(),
            md5: hex::encode(hasher.finalize()),
        }))
    }

    async fn put(
        &self,
        path: &str,
        body: ByteStream,
        options: PutOptions,
    ) -> Result<(), StoreError> {
        let local = self.local_path(path)?;
        let (Some(parent), Some(name)) = (local.parent(), local.file_name()) else {
            return Err(StoreError::InvalidPath(path.to_owned()));
        };

        if options.mkdirs {
            tokio::fs::create_dir_all(parent).await?;
        } else if !tokio::fs::try_exists(parent).await? {
            return Err(StoreError::MissingParent(path.to_owned()));
        }

        let partial = parent.join(format!(
            ".{}.{}.partial",
            name.to_string_lossy(),
            uuid::Uuid::new_v4()
        ));
        match write_body(&partial, body, options.size, path).await {
            Ok(written) => {
                tokio::fs::rename(&partial, &local).await?;
                debug!(path, written, "[STORE] Object written");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}

async fn write_body(
    partial: &Path,
    mut body: ByteStream,
    expected: Option<u64>,
    path: &str,
) -> Result<u64, StoreError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if let Some(expected) = expected {
            if written > expected {
                return Err(StoreError::SizeMismatch {
                    path: path.to_owned(),
                    expected,
                    written,
                });
            }
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    match expected {
        Some(expected) if expected != written => Err(StoreError::SizeMismatch {
            path: path.to_owned(),
            expected,
            written,
        }),
        _ => Ok(written),
    }
}
