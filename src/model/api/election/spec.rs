use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{common::election::ElectionStatus, db::election::NewElection, mongodb::Id},
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election name.
    pub name: String,
    /// Election start time.
    pub start_at: DateTime<Utc>,
    /// Election end time.
    pub end_at: DateTime<Utc>,
}

impl ElectionSpec {
    /// Convert this spec into a new election in the given RT.
    pub fn into_election(self, rt_id: Id, created_by: Id) -> Result<NewElection> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("election name must not be empty".to_string()));
        }
        if self.start_at >= self.end_at {
            return Err(Error::Validation(
                "election must start before it ends".to_string(),
            ));
        }
        Ok(NewElection::new(
            name.to_string(),
            rt_id,
            self.start_at,
            self.end_at,
            created_by,
        ))
    }
}

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ElectionStatus,
}
