use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::db::election::Election,
    protocol::{finalize::FinalizeReceipt, hasher::TallySummary},
};

/// One candidate's line in a published result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    /// Empty if the candidate no longer exists.
    pub name: String,
    pub total: u64,
}

/// A sealed tally, with candidate names filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub total_revealed: u64,
    pub results: Vec<CandidateResult>,
    /// Empty if nothing was revealed.
    pub winner: String,
    pub winner_name: String,
    pub timestamp: String,
}

impl ElectionResults {
    /// Decorate a summary with the names of its candidates, keyed by candidate ID.
    pub fn new(summary: TallySummary, names: &HashMap<String, String>) -> Self {
        let name_of = |id: &str| names.get(id).cloned().unwrap_or_default();
        Self {
            total_revealed: summary.total_revealed,
            results: summary
                .results
                .into_iter()
                .map(|line| CandidateResult {
                    name: name_of(&line.candidate_id),
                    candidate_id: line.candidate_id,
                    total: line.total,
                })
                .collect(),
            winner_name: name_of(&summary.winner),
            winner: summary.winner,
            timestamp: summary.timestamp,
        }
    }
}

/// What a successful finalize reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub summary: Option<TallySummary>,
    pub fingerprint: String,
    pub anchor_reference: String,
}

impl From<FinalizeReceipt> for FinalizeOutcome {
    fn from(receipt: FinalizeReceipt) -> Self {
        Self {
            summary: receipt.summary,
            fingerprint: receipt.fingerprint,
            anchor_reference: receipt.anchor_reference,
        }
    }
}

/// An election's sealed record, exactly as stored, for offline verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRecord {
    pub election_id: String,
    /// The canonical summary text the fingerprint was computed over.
    pub summary: Option<String>,
    pub summary_fingerprint: Option<String>,
    pub anchor_reference: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl From<&Election> for ElectionRecord {
    fn from(election: &Election) -> Self {
        Self {
            election_id: election.id.to_string(),
            summary: election.summary.clone(),
            summary_fingerprint: election.summary_fingerprint.clone(),
            anchor_reference: election.anchor_reference.clone(),
            finalized_at: election.finalized_at.map(|at| at.to_chrono()),
        }
    }
}
