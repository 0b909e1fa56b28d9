//! Commitment hashing, and canonical encoding and fingerprinting of tally summaries.
//!
//! Everything here must stay byte-stable: a fingerprint computed at finalize time is
//! recomputed at verify time, possibly by a different build or by the offline CLI.

use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::HEXLOWER;
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix of every summary fingerprint.
pub const FINGERPRINT_PREFIX: &str = "0x";

/// Length of a hex-encoded SHA-256 digest.
pub const COMMITMENT_LEN: usize = 64;

/// The commitment a voter submits for `candidate_id` blinded by `nonce`:
/// lowercase hex SHA-256 of the two strings concatenated.
pub fn commitment_hash(candidate_id: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(candidate_id.as_bytes());
    hasher.update(nonce.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

/// Is this string shaped like something [`commitment_hash`] could have produced?
pub fn is_well_formed_commitment(commitment: &str) -> bool {
    commitment.len() == COMMITMENT_LEN
        && commitment
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// `0x`-prefixed lowercase hex SHA-256 of the given bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{FINGERPRINT_PREFIX}{}", HEXLOWER.encode(&digest))
}

/// One candidate's line in a tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTotal {
    pub candidate_id: String,
    pub total: u64,
}

/// The sealed result of an election.
///
/// Field order here is the canonical field order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallySummary {
    pub election_id: String,
    pub total_revealed: u64,
    /// Ordered by ascending candidate ID.
    pub results: Vec<CandidateTotal>,
    /// Empty if nothing was revealed.
    pub winner: String,
    /// RFC 3339, UTC, second precision.
    pub timestamp: String,
}

impl TallySummary {
    /// Canonical bytes: compact JSON, fields in declaration order, non-ASCII
    /// left unescaped, no trailing newline.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Canonical text and its fingerprint.
    pub fn seal(&self) -> Result<(String, String), serde_json::Error> {
        let text = serde_json::to_string(self)?;
        let fingerprint = fingerprint(text.as_bytes());
        Ok((text, fingerprint))
    }

    /// Parse a stored summary.
    pub fn parse(stored: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stored)
    }
}

/// Render a timestamp the way summaries carry it.
pub fn summary_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fingerprint a stored summary as it would be fingerprinted at finalize time.
///
/// The summary is parsed and re-encoded, so any drift from canonical form shows up
/// as a different fingerprint. Text that no longer parses is fingerprinted as-is.
pub fn refingerprint(stored: &str) -> String {
    match TallySummary::parse(stored).and_then(|summary| summary.canonical_bytes()) {
        Ok(bytes) => fingerprint(&bytes),
        Err(e) => {
            warn!("Stored summary is not a valid tally summary ({e}); fingerprinting raw text");
            fingerprint(stored.as_bytes())
        }
    }
}
