use tracing::{info, trace};

use crate::error::StoreError;
use crate::resolver::Candidate;
use crate::store::ObjectStore;

/// What the target store holds for a candidate's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Nothing stored at the destination.
    Missing,
    /// Something is stored, but with another checksum (stale or corrupt).
    Mismatch { stored: String },
    /// Stored with the expected checksum.
    UpToDate,
}

impl CheckOutcome {
    pub fn needs_transfer(&self) -> bool {
        !matches!(self, CheckOutcome::UpToDate)
    }
}

/// Looks the destination up in the store and compares checksums. Only "not found" is a
/// normal answer; every other lookup failure is returned as an error.
pub async fn check<S>(
    store: &S,
    candidate: &Candidate,
    destination: &str,
) -> Result<CheckOutcome, StoreError>
where
    S: ObjectStore + ?Sized,
{
    match store.info(destination).await? {
        None => {
            trace!(destination, "[CHECK] Missing");
            Ok(CheckOutcome::Missing)
        }
        Some(stored) if stored.md5.eq_ignore_ascii_case(&candidate.checksum) => {
            trace!(destination, "[CHECK] Up to date");
            Ok(CheckOutcome::UpToDate)
        }
        Some(stored) => {
            info!(
                destination,
                expected = %candidate.checksum,
                stored = %stored.md5,
                stored_size = stored.size,
                expected_size = candidate.size,
                "[CHECK] md5 mismatch"
            );
            Ok(CheckOutcome::Mismatch { stored: stored.md5 })
        }
    }
}
