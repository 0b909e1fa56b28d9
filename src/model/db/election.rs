use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionStatus, FinalizeStatus},
    mongodb::Id,
};

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub name: String,
    /// The RT that owns this election.
    pub rt_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_at: DateTime<Utc>,
    pub status: ElectionStatus,
    #[serde(default)]
    pub finalize_status: Option<FinalizeStatus>,
    /// Why the last finalize attempt failed.
    #[serde(default)]
    pub finalize_error: Option<String>,
    /// Canonical JSON tally summary, exactly as fingerprinted.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub summary_fingerprint: Option<String>,
    #[serde(default)]
    pub anchor_reference: Option<String>,
    #[serde(default)]
    pub finalized_at: Option<BsonDateTime>,
    pub created_by: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// A freshly created election: upcoming, with finalization pending.
    pub fn new(
        name: String,
        rt_id: Id,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        created_by: Id,
    ) -> Self {
        Self {
            name,
            rt_id,
            start_at,
            end_at,
            status: ElectionStatus::Upcoming,
            finalize_status: Some(FinalizeStatus::Pending),
            finalize_error: None,
            summary: None,
            summary_fingerprint: None,
            anchor_reference: None,
            finalized_at: None,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use chrono::Duration;

    use super::*;

    impl Election {
        /// An election in the given RT and status, which started an hour ago.
        pub fn example(rt_id: Id, status: ElectionStatus) -> Self {
            let start_at = Utc::now() - Duration::hours(1);
            let mut election = ElectionCore::new(
                "Ketua RT 2026".to_string(),
                rt_id,
                start_at,
                start_at + Duration::days(1),
                Id::new(),
            );
            election.status = status;
            Self {
                id: Id::new(),
                election,
            }
        }
    }
}
