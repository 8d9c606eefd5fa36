#![doc = "HTTP object store client: bridges the core `ObjectStore` trait to a remote store speaking plain HEAD/PUT."]
//
//! # HTTP Object Store
//!
//! [`HttpStore`] implements [`deb_mirror_core::store::ObjectStore`] against a remote object
//! store addressed by path under a base URL:
//!
//! - `info` is a `HEAD`; `404` means "not found", `Content-MD5` (base64) is normalised to
//!   hex and `Content-Length` is reported as the size.
//! - `put` is a streamed `PUT` carrying `Content-Length` when the size is known.
//! - `mkdirs` creates each missing ancestor with a directory `PUT`
//!   (`Content-Type: application/json; type=directory`). Created directories are
//!   remembered for the lifetime of the client.
//!
//! Construct it with [`HttpStore::new_from_env`]: the bearer token is read from
//! `DEB_MIRROR_STORE_TOKEN` (a `.env` file is honoured).

use std::collections::HashSet;
use std::env;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use deb_mirror_core::error::StoreError;
use deb_mirror_core::store::{normalize_md5, ObjectInfo, ObjectStore, PutOptions};
use deb_mirror_core::ByteStream;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};

pub const STORE_TOKEN_ENV: &str = "DEB_MIRROR_STORE_TOKEN";

const DIRECTORY_CONTENT_TYPE: &str = "application/json; type=directory";

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    created_dirs: Mutex<HashSet<String>>,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|_| StoreError::InvalidPath(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::InvalidPath(base_url.to_owned()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            created_dirs: Mutex::new(HashSet::new()),
        })
    }

    pub fn new_from_env(base_url: &str) -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        let token = env::var(STORE_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        tracing::info!(
            base_url,
            token_set = token.is_some(),
            "Initialized HttpStore from environment"
        );
        Self::new(base_url, token)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url_for(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn backend_error(path: &str, e: reqwest::Error) -> StoreError {
        StoreError::Backend {
            path: path.to_owned(),
            message: e.to_string(),
        }
    }

    fn dir_known(&self, dir: &str) -> bool {
        self.created_dirs
            .lock()
            .map(|dirs| dirs.contains(dir))
            .unwrap_or(false)
    }

    fn remember_dir(&self, dir: String) {
        if let Ok(mut dirs) = self.created_dirs.lock() {
            dirs.insert(dir);
        }
    }

    /// Creates every ancestor container of `path`, outermost first.
    async fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let mut dir = String::new();
        for part in parts.iter().take(parts.len().saturating_sub(1)) {
            dir.push('/');
            dir.push_str(part);
            if self.dir_known(&dir) {
                continue;
            }

            let response = self
                .request(Method::PUT, &dir)
                .header(CONTENT_TYPE, DIRECTORY_CONTENT_TYPE)
                .send()
                .await
                .map_err(|e| Self::backend_error(&dir, e))?;
            if !response.status().is_success() {
                tracing::error!(
                    dir = %dir,
                    status = %response.status(),
                    "Failed to create directory"
                );
                return Err(StoreError::Status {
                    path: dir.clone(),
                    status: response.status().as_u16(),
                });
            }
            tracing::debug!(dir = %dir, "Created directory");
            self.remember_dir(dir.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn info(&self, path: &str) -> Result<Option<ObjectInfo>, StoreError> {
        let response = self
            .request(Method::HEAD, path)
            .send()
            .await
            .map_err(|e| Self::backend_error(path, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::error!(path, status = %status, "Store lookup returned error status");
            return Err(StoreError::Status {
                path: path.to_owned(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let md5 = headers
            .get("content-md5")
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_md5)
            .unwrap_or_else(|| {
                tracing::warn!(path, "Stored object has no usable Content-MD5");
                String::new()
            });
        Ok(Some(ObjectInfo { size, md5 }))
    }

    async fn put(
        &self,
        path: &str,
        mut body: ByteStream,
        options: PutOptions,
    ) -> Result<(), StoreError> {
        if options.mkdirs {
            self.mkdirs(path).await?;
        }

        // One chunk in flight between the origin stream and the request body.
        let (mut tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(1);
        let pump = async move {
            while let Some(chunk) = body.next().await {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        };

        let mut request = self
            .request(Method::PUT, path)
            .body(reqwest::Body::wrap_stream(rx));
        if let Some(size) = options.size {
            request = request.header(CONTENT_LENGTH, size);
        }

        let (response, ()) = futures::join!(request.send(), pump);
        let response = response.map_err(|e| Self::backend_error(path, e))?;
        if !response.status().is_success() {
            tracing::error!(path, status = %response.status(), "Store write returned error status");
            return Err(StoreError::Status {
                path: path.to_owned(),
                status: response.status().as_u16(),
            });
        }
        tracing::info!(path, size = ?options.size, "Stored object");
        Ok(())
    }
}
