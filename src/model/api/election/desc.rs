use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::{ElectionStatus, FinalizeStatus},
    db::election::Election,
};

use super::ElectionResults;

/// A short view of an election, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ApiId,
    pub name: String,
    pub rt_id: ApiId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: ElectionStatus,
    pub finalize_status: Option<FinalizeStatus>,
}

impl From<&Election> for ElectionSummary {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id.into(),
            name: election.name.clone(),
            rt_id: election.rt_id.into(),
            start_at: election.start_at,
            end_at: election.end_at,
            status: election.status,
            finalize_status: election.finalize_status,
        }
    }
}

/// Everything public about one election, including its results once finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionDescription {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub finalize_error: Option<String>,
    pub summary_fingerprint: Option<String>,
    pub anchor_reference: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub results: Option<ElectionResults>,
}

impl ElectionDescription {
    pub fn new(election: &Election, results: Option<ElectionResults>) -> Self {
        Self {
            summary: election.into(),
            finalize_error: election.finalize_error.clone(),
            summary_fingerprint: election.summary_fingerprint.clone(),
            anchor_reference: election.anchor_reference.clone(),
            finalized_at: election.finalized_at.map(|at| at.to_chrono()),
            results,
        }
    }
}

/// An admin's overview of their RT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_elections: u64,
    pub active_elections: u64,
    /// Ended elections not yet finalized.
    pub awaiting_finalize: u64,
    /// Most recently created first.
    pub recent: Vec<ElectionSummary>,
}
