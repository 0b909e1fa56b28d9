use serde::{Deserialize, Serialize};

use crate::{
    anchor::SharedAnchor,
    error::{Error, Result},
    store::SharedStore,
};

use super::{hasher::refingerprint, parse_id};

/// The outcome of cross-checking an election's stored summary, its stored
/// fingerprint and the fingerprint held by the anchor.
///
/// Fingerprints that could not be obtained are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub election_id: String,
    pub local_fingerprint: String,
    pub stored_fingerprint: String,
    pub anchor_fingerprint: String,
    pub anchor_reference: String,
    pub valid: bool,
    pub message: String,
}

/// Cross-check a stored summary against its stored fingerprint and, if
/// consulted, the anchor's fingerprint.
///
/// `anchor_fingerprint` is `None` when the anchor was deliberately not
/// consulted, and `Some("")` when it was but had nothing to offer.
pub fn assess(
    election_id: &str,
    summary: Option<&str>,
    stored_fingerprint: Option<&str>,
    anchor_fingerprint: Option<&str>,
    anchor_reference: Option<&str>,
) -> Verification {
    let local_fingerprint = summary.map(refingerprint).unwrap_or_default();
    let stored_fingerprint = stored_fingerprint.unwrap_or_default();

    let (valid, message) = if summary.is_none() {
        (false, "election has not been finalized")
    } else if local_fingerprint != stored_fingerprint {
        (false, "stored summary does not match the stored fingerprint")
    } else {
        match anchor_fingerprint {
            None => (true, "stored summary matches the stored fingerprint; anchor not consulted"),
            Some("") => (false, "anchor has no fingerprint for this election"),
            Some(anchored) if anchored != stored_fingerprint => {
                (false, "stored fingerprint does not match the anchored fingerprint")
            }
            Some(_) => (true, "stored summary matches the stored and anchored fingerprints"),
        }
    };

    Verification {
        election_id: election_id.to_string(),
        local_fingerprint,
        stored_fingerprint: stored_fingerprint.to_string(),
        anchor_fingerprint: anchor_fingerprint.unwrap_or_default().to_string(),
        anchor_reference: anchor_reference.unwrap_or_default().to_string(),
        valid,
        message: message.to_string(),
    }
}

/// Checks finalized elections against the anchor. Read-only.
#[derive(Clone)]
pub struct Verifier {
    store: SharedStore,
    anchor: SharedAnchor,
}

impl Verifier {
    pub fn new(store: SharedStore, anchor: SharedAnchor) -> Self {
        Self { store, anchor }
    }

    /// Verify an election. A failed check is reported in the result, not as an error.
    pub async fn verify(&self, election_id: &str) -> Result<Verification> {
        let id = parse_id("election", election_id)?;
        let election = self
            .store
            .election(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("election {id}")))?;

        let anchor_fingerprint = match self.anchor.fetch(&id.to_string()).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Could not fetch the anchored fingerprint of election {id}: {e}");
                String::new()
            }
        };

        let verification = assess(
            &id.to_string(),
            election.summary.as_deref(),
            election.summary_fingerprint.as_deref(),
            Some(&anchor_fingerprint),
            election.anchor_reference.as_deref(),
        );
        if verification.valid {
            debug!("Election {id} verified");
        } else {
            warn!("Election {id} failed verification: {}", verification.message);
        }
        Ok(verification)
    }
}
