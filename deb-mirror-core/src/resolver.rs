//! Expands a parsed [`Record`] into the concrete files it describes.

use serde::Serialize;

use crate::error::ResolveError;
use crate::record::{Record, RecordIdentity, DIRECTORY, FILENAME, FILES, MD5SUM, SIZE};

/// One remote file that may need to be mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Path relative to the origin base URL.
    pub path: String,
    /// Expected size in bytes, taken from the record.
    pub size: u64,
    /// Expected MD5 checksum (lowercase hex), taken from the record.
    pub checksum: String,
}

/// Returns one candidate for a single-file record, or one per manifest entry for a
/// directory record. The record is only read.
pub fn resolve(record: &Record) -> Result<Vec<Candidate>, ResolveError> {
    match record.identity() {
        Some(RecordIdentity::SingleFile) => {
            let (Some(path), Some(size), Some(checksum)) = (
                record.scalar(FILENAME),
                record.scalar(SIZE),
                record.scalar(MD5SUM),
            ) else {
                return Err(ResolveError::NoIdentity);
            };
            let path = path.trim().to_owned();
            let size = parse_size(&path, size)?;
            Ok(vec![Candidate {
                path,
                size,
                checksum: checksum.trim().to_ascii_lowercase(),
            }])
        }
        Some(RecordIdentity::Directory) => {
            let (Some(directory), Some(files)) = (record.scalar(DIRECTORY), record.get(FILES))
            else {
                return Err(ResolveError::NoIdentity);
            };
            files
                .entries()
                .into_iter()
                .map(|entry| manifest_candidate(directory.trim(), entry))
                .collect()
        }
        None => Err(ResolveError::NoIdentity),
    }
}

fn manifest_candidate(directory: &str, entry: &str) -> Result<Candidate, ResolveError> {
    let mut parts = entry.split_whitespace();
    let (Some(checksum), Some(size), Some(filename), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ResolveError::InvalidManifestEntry {
            entry: entry.to_owned(),
        });
    };
    let path = format!(
        "{}/{}",
        directory.trim_end_matches('/'),
        filename.trim_start_matches('/')
    );
    let size = parse_size(&path, size)?;
    Ok(Candidate {
        path,
        size,
        checksum: checksum.to_ascii_lowercase(),
    })
}

fn parse_size(path: &str, value: &str) -> Result<u64, ResolveError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ResolveError::InvalidSize {
            path: path.to_owned(),
            value: value.to_owned(),
        })
}
