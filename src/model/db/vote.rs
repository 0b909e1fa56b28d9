use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// One voter's ballot in one election: a commitment, later disclosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub voter_id: Id,
    pub election_id: Id,
    /// Lowercase hex SHA-256 of the candidate ID followed by the nonce.
    pub commitment_hash: String,
    pub is_revealed: bool,
    #[serde(default)]
    pub revealed_candidate_id: Option<Id>,
    #[serde(default)]
    pub revealed_at: Option<BsonDateTime>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub committed_at: DateTime<Utc>,
}

impl VoteCore {
    /// A fresh, undisclosed commitment.
    pub fn commit(voter_id: Id, election_id: Id, commitment_hash: String) -> Self {
        Self {
            voter_id,
            election_id,
            commitment_hash,
            is_revealed: false,
            revealed_candidate_id: None,
            revealed_at: None,
            committed_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
