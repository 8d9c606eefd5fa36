//! Error types for each pipeline stage.
//!
//! Parse errors are fatal for record consumption; resolve, store and origin errors are
//! recorded per candidate by [`crate::synchronise`] so independent candidates still run.

use thiserror::Error;

/// A control-file line that cannot be accepted. Always fatal for the parse pass.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The line matches none of the recognised forms.
    #[error("malformed line {line_number}: {line:?}")]
    Malformed { line_number: u64, line: String },

    /// A continuation line with no field to continue.
    #[error("continuation line {line_number} has no preceding field: {line:?}")]
    OrphanContinuation { line_number: u64, line: String },

    /// Reading or decoding the underlying stream failed.
    #[error("failed to read index after line {line_number}: {source}")]
    Io {
        line_number: u64,
        #[source]
        source: std::io::Error,
    },
}

/// A complete record whose identifying fields cannot be turned into candidates.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("record has neither a single-file nor a directory identity")]
    NoIdentity,

    #[error("invalid size {value:?} for {path}")]
    InvalidSize { path: String, value: String },

    #[error("manifest entry {entry:?} is not \"checksum size filename\"")]
    InvalidManifestEntry { entry: String },
}

/// Errors from target store operations. "Not found" is not an error; see
/// [`crate::store::ObjectStore::info`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path {0:?}")]
    InvalidPath(String),

    #[error("parent container of {0} does not exist")]
    MissingParent(String),

    #[error("size mismatch for {path}: expected {expected} bytes, wrote {written}")]
    SizeMismatch {
        path: String,
        expected: u64,
        written: u64,
    },

    #[error("store returned status {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("store request for {path} failed: {message}")]
    Backend { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors fetching from the origin repository.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("origin request for {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("invalid origin URL {0:?}")]
    InvalidUrl(String),
}

/// Errors that prevent a synchronisation run from starting at all.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to fetch index {path}: {source}")]
    IndexFetch {
        path: String,
        #[source]
        source: OriginError,
    },
}

/// Why a single transfer job did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("fetch failed: {0}")]
    Origin(#[from] OriginError),

    #[error("write failed: {0}")]
    Store(#[from] StoreError),

    #[error("transfer worker stopped unexpectedly: {0}")]
    Worker(String),
}
