//! The external ledger that records tally fingerprints for later cross-checking.

use std::sync::Arc;

use thiserror::Error;

mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpAnchor;

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("Anchor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Anchor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Anchor has no record for election {0}")]
    NoRecord(String),
    #[error("Anchor misconfigured or misbehaving: {0}")]
    Malformed(String),
    #[error("Anchor unavailable: {0}")]
    Unavailable(String),
}

/// A ledger that durably records one fingerprint per election.
#[rocket::async_trait]
pub trait Anchor: Send + Sync {
    /// Record `fingerprint` for the election, returning a reference to the
    /// ledger entry (e.g. a transaction ID).
    async fn store(&self, election_id: &str, fingerprint: &str) -> Result<String, AnchorError>;

    /// The fingerprint previously recorded for the election.
    async fn fetch(&self, election_id: &str) -> Result<String, AnchorError>;
}

pub type SharedAnchor = Arc<dyn Anchor>;
