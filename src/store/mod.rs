//! The persistence contract the voting protocol relies on.
//!
//! All exclusivity between concurrent callers, including callers in other
//! server processes, comes from these operations being atomic in the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    common::election::FinalizeStatus,
    db::{
        election::Election,
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};

#[cfg(test)]
pub mod memory;
mod mongo;

pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key")]
    DuplicateKey,
    #[error(transparent)]
    Db(#[from] DbError),
    /// Failure reported by a store not backed by MongoDB.
    #[error("Store unavailable: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Election rows.
#[rocket::async_trait]
pub trait ElectionRepo: Send + Sync {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>>;

    /// Set the finalize status to `new` only if it currently is one of
    /// `allowed` (`None` standing for unset). Returns the number of elections
    /// changed, so zero means another caller got there first.
    async fn set_finalize_status_if(
        &self,
        id: Id,
        new: FinalizeStatus,
        allowed: &[Option<FinalizeStatus>],
    ) -> StoreResult<u64>;

    /// Mark a finalization in progress as failed, recording why, in one
    /// conditional write. Only an election in `finalizing` changes; returns the
    /// number of elections changed.
    async fn set_finalize_failed(&self, id: Id, reason: &str) -> StoreResult<u64>;

    /// Checkpoint the sealed summary and its fingerprint.
    async fn set_summary_and_fingerprint(
        &self,
        id: Id,
        summary: &str,
        fingerprint: &str,
    ) -> StoreResult<()>;

    /// Record a successful anchoring: stores the reference, and moves the
    /// election to `finalized` with finalize status `success`.
    async fn set_finalize_result(
        &self,
        id: Id,
        anchor_reference: &str,
        finalized_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// The active election of the RT which the voter has not committed to yet.
    async fn open_election_for_voter(&self, rt_id: Id, voter_id: Id)
        -> StoreResult<Option<Election>>;

    /// The most recently started election of the RT which the voter has committed to.
    async fn latest_committed_election(
        &self,
        rt_id: Id,
        voter_id: Id,
    ) -> StoreResult<Option<Election>>;
}

/// Vote rows, at most one per voter per election.
#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Insert a commitment. Fails with [`StoreError::DuplicateKey`] if the
    /// voter already has a vote in that election.
    async fn create_vote(&self, vote: &NewVote) -> StoreResult<()>;

    async fn vote(&self, voter_id: Id, election_id: Id) -> StoreResult<Option<Vote>>;

    /// Disclose a vote. Returns false if it was already disclosed.
    async fn mark_revealed(
        &self,
        voter_id: Id,
        election_id: Id,
        candidate_id: Id,
        revealed_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn revealed_votes(&self, election_id: Id) -> StoreResult<Vec<Vote>>;
}

/// Everything the voting protocol needs from persistence.
pub trait Store: ElectionRepo + VoteLedger {}

impl<T> Store for T where T: ElectionRepo + VoteLedger {}

pub type SharedStore = Arc<dyn Store>;
