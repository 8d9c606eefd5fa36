#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use deb_mirror_core::error::OriginError;
use deb_mirror_core::origin::Origin;
use deb_mirror_core::ByteStream;
use futures::Stream;
use md5::{Digest, Md5};

/// An origin serving fixed files from memory, in small chunks.
#[derive(Default)]
pub struct MapOrigin {
    files: HashMap<String, Vec<u8>>,
    pub fetched: Mutex<Vec<String>>,
}

impl MapOrigin {
    pub fn new(files: Vec<(&str, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            files: files
                .into_iter()
                .map(|(path, body)| (path.to_string(), body))
                .collect(),
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Origin for MapOrigin {
    async fn fetch(&self, path: &str) -> Result<ByteStream, OriginError> {
        self.fetched.lock().unwrap().push(path.to_string());
        match self.files.get(path) {
            Some(body) => Ok(byte_stream(body)),
            None => Err(OriginError::Status {
                url: path.to_string(),
                status: 404,
            }),
        }
    }
}

/// Splits a body into 7-byte chunks so line and gzip boundaries fall mid-chunk.
pub fn byte_stream(body: &[u8]) -> ByteStream {
    let chunks: Vec<io::Result<Bytes>> = body
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

pub fn lines(text: &str) -> impl Stream<Item = io::Result<String>> + Unpin {
    let lines: Vec<io::Result<String>> = text.lines().map(|l| Ok(l.to_string())).collect();
    futures::stream::iter(lines)
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

pub async fn gzip(data: &[u8]) -> Vec<u8> {
    use async_compression::tokio::bufread::GzipEncoder;
    use tokio::io::AsyncReadExt;

    let mut encoder = GzipEncoder::new(data);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await.unwrap();
    out
}
