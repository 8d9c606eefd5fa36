//! The origin repository: where indices and artifacts are fetched from.

use async_trait::async_trait;
use futures::TryStreamExt;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::OriginError;
use crate::parser::BoundaryStrategy;
use crate::ByteStream;

/// Trait for fetching files from the origin repository as byte streams.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Origin: Send + Sync {
    /// Opens a read stream for a path relative to the origin base.
    async fn fetch(&self, path: &str) -> Result<ByteStream, OriginError>;
}

/// Which index file of a distribution component is mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// `binary-{arch}/Packages`: one artifact per record.
    #[default]
    Packages,
    /// `source/Sources`: a directory plus a file manifest per record.
    Sources,
}

impl IndexKind {
    /// Packages indices commonly omit blank lines between stanzas, so they are split on
    /// `Package` recurrence; Sources stanzas are blank-line delimited.
    pub fn default_boundary(self) -> BoundaryStrategy {
        match self {
            IndexKind::Packages => BoundaryStrategy::key_recurrence(),
            IndexKind::Sources => BoundaryStrategy::BlankLineDelimited,
        }
    }

    /// The index path relative to the origin base.
    pub fn index_path(
        self,
        release: &str,
        component: &str,
        arch: &str,
        compression: Compression,
    ) -> String {
        let file = match self {
            IndexKind::Packages => format!("binary-{arch}/Packages"),
            IndexKind::Sources => "source/Sources".to_string(),
        };
        format!(
            "dists/{release}/{component}/{file}{}",
            compression.extension()
        )
    }
}

/// Transfer encoding of the index body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    pub fn extension(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }
}

/// Fetches from an HTTP(S) repository mirror with reqwest, streaming response bodies.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrigin {
    pub fn new(base_url: &str) -> Result<Self, OriginError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|_| OriginError::InvalidUrl(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(OriginError::InvalidUrl(base_url.to_owned()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, path: &str) -> Result<ByteStream, OriginError> {
        let url = self.url_for(path);
        debug!(url = %url, "[ORIGIN] GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OriginError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "[ORIGIN] Request returned error status");
            return Err(OriginError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::pin(body))
    }
}
