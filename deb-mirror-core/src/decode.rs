//! Byte-stream plumbing in front of the parser: splitting one index body into an archive
//! branch and a parse branch, and turning bytes into lines.

use std::io;
use std::pin::Pin;

use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::origin::Compression;
use crate::ByteStream;

/// Decoded index lines, without terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send + 'static>>;

/// Decompresses (if needed) and splits a body into lines. `\n` and `\r\n` are both
/// accepted as terminators. The stream ends after the first error.
pub fn index_lines(body: ByteStream, compression: Compression) -> LineStream {
    let reader = StreamReader::new(body);
    let reader: Pin<Box<dyn AsyncBufRead + Send>> = match compression {
        Compression::None => Box::pin(reader),
        Compression::Gzip => {
            let mut decoder = GzipDecoder::new(reader);
            decoder.multiple_members(true);
            Box::pin(BufReader::new(decoder))
        }
    };

    let lines = futures::stream::unfold(Some(reader.lines()), |lines| async move {
        let mut lines = lines?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });
    Box::pin(lines)
}

/// Splits one body into two streams carrying the same chunks. Each branch is bounded by
/// `buffer` chunks; a branch whose consumer has gone away is skipped while the other
/// keeps receiving data. Must be called from within a tokio runtime.
pub fn tee(mut body: ByteStream, buffer: usize) -> (ByteStream, ByteStream) {
    let (mut left_tx, left_rx) = mpsc::channel::<io::Result<Bytes>>(buffer);
    let (mut right_tx, right_rx) = mpsc::channel::<io::Result<Bytes>>(buffer);

    tokio::spawn(async move {
        let mut left_open = true;
        let mut right_open = true;
        while left_open || right_open {
            let Some(item) = body.next().await else {
                break;
            };
            let (left, right) = match item {
                Ok(chunk) => (Ok(chunk.clone()), Ok(chunk)),
                Err(e) => (Err(io::Error::new(e.kind(), e.to_string())), Err(e)),
            };
            if left_open && left_tx.send(left).await.is_err() {
                debug!("[TEE] First branch closed");
                left_open = false;
            }
            if right_open && right_tx.send(right).await.is_err() {
                debug!("[TEE] Second branch closed");
                right_open = false;
            }
        }
    });

    (Box::pin(left_rx), Box::pin(right_rx))
}
