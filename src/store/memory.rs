//! An in-process store for exercising the protocol without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

use crate::model::{
    common::election::{ElectionStatus, FinalizeStatus},
    db::{
        election::Election,
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};

use super::{ElectionRepo, StoreError, StoreResult, VoteLedger};

/// Operations that should fail instead of succeeding.
#[derive(Debug, Default, Clone, Copy)]
pub struct Faults {
    pub revealed_votes: bool,
    pub summary_writes: bool,
    pub result_writes: bool,
}

#[derive(Default)]
struct State {
    elections: HashMap<Id, Election>,
    votes: Vec<Vote>,
    faults: Faults,
    revealed_reads: usize,
    /// Whether another finalizer claims right after the next finalize status write.
    claim_armed: bool,
    interleaved_claim: Option<u64>,
}

impl State {
    /// Play a concurrent finalizer claiming the election between two store calls.
    fn interleave_claim(&mut self, id: Id) {
        if !std::mem::take(&mut self.claim_armed) {
            return;
        }
        let claimable = [
            None,
            Some(FinalizeStatus::Pending),
            Some(FinalizeStatus::Failed),
        ];
        let claimed = match self.elections.get_mut(&id) {
            Some(election) if claimable.contains(&election.finalize_status) => {
                election.finalize_status = Some(FinalizeStatus::Finalizing);
                1
            }
            _ => 0,
        };
        self.interleaved_claim = Some(claimed);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_election(&self, election: Election) {
        self.lock().elections.insert(election.id, election);
    }

    pub fn election_snapshot(&self, id: Id) -> Election {
        self.lock().elections[&id].clone()
    }

    /// Edit a stored election directly, bypassing the protocol.
    pub fn tamper(&self, id: Id, edit: impl FnOnce(&mut Election)) {
        let mut state = self.lock();
        if let Some(election) = state.elections.get_mut(&id) {
            edit(election);
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Have another finalizer try to claim an election straight after the next
    /// write to a finalize status.
    pub fn claim_after_next_status_write(&self) {
        self.lock().claim_armed = true;
    }

    /// How many elections that interleaved claim changed, once it has run.
    pub fn interleaved_claim(&self) -> Option<u64> {
        self.lock().interleaved_claim
    }

    /// How many times disclosed votes have been read.
    pub fn revealed_reads(&self) -> usize {
        self.lock().revealed_reads
    }

    fn fail(what: &str) -> StoreError {
        StoreError::Backend(format!("injected {what} failure"))
    }
}

#[rocket::async_trait]
impl ElectionRepo for MemoryStore {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>> {
        Ok(self.lock().elections.get(&id).cloned())
    }

    async fn set_finalize_status_if(
        &self,
        id: Id,
        new: FinalizeStatus,
        allowed: &[Option<FinalizeStatus>],
    ) -> StoreResult<u64> {
        let mut state = self.lock();
        match state.elections.get_mut(&id) {
            Some(election) if allowed.contains(&election.finalize_status) => {
                election.finalize_status = Some(new);
                state.interleave_claim(id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn set_finalize_failed(&self, id: Id, reason: &str) -> StoreResult<u64> {
        let mut state = self.lock();
        let changed = match state.elections.get_mut(&id) {
            Some(election) if election.finalize_status == Some(FinalizeStatus::Finalizing) => {
                election.finalize_status = Some(FinalizeStatus::Failed);
                election.finalize_error = Some(reason.to_string());
                1
            }
            _ => 0,
        };
        state.interleave_claim(id);
        Ok(changed)
    }

    async fn set_summary_and_fingerprint(
        &self,
        id: Id,
        summary: &str,
        fingerprint: &str,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        if state.faults.summary_writes {
            return Err(Self::fail("summary write"));
        }
        if let Some(election) = state.elections.get_mut(&id) {
            election.summary = Some(summary.to_string());
            election.summary_fingerprint = Some(fingerprint.to_string());
            election.finalize_status = Some(FinalizeStatus::Finalizing);
        }
        Ok(())
    }

    async fn set_finalize_result(
        &self,
        id: Id,
        anchor_reference: &str,
        finalized_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        if state.faults.result_writes {
            return Err(Self::fail("result write"));
        }
        if let Some(election) = state.elections.get_mut(&id) {
            election.anchor_reference = Some(anchor_reference.to_string());
            election.finalized_at = Some(BsonDateTime::from_chrono(finalized_at));
            election.finalize_status = Some(FinalizeStatus::Success);
            election.finalize_error = None;
            election.status = ElectionStatus::Finalized;
        }
        Ok(())
    }

    async fn open_election_for_voter(
        &self,
        rt_id: Id,
        voter_id: Id,
    ) -> StoreResult<Option<Election>> {
        let state = self.lock();
        let committed = |election: &Election| {
            state
                .votes
                .iter()
                .any(|vote| vote.voter_id == voter_id && vote.election_id == election.id)
        };
        Ok(state
            .elections
            .values()
            .filter(|e| e.rt_id == rt_id && e.status == ElectionStatus::Active && !committed(e))
            .min_by_key(|e| e.start_at)
            .cloned())
    }

    async fn latest_committed_election(
        &self,
        rt_id: Id,
        voter_id: Id,
    ) -> StoreResult<Option<Election>> {
        let state = self.lock();
        Ok(state
            .votes
            .iter()
            .filter(|vote| vote.voter_id == voter_id)
            .filter_map(|vote| state.elections.get(&vote.election_id))
            .filter(|e| e.rt_id == rt_id)
            .max_by_key(|e| e.start_at)
            .cloned())
    }
}

#[rocket::async_trait]
impl VoteLedger for MemoryStore {
    async fn create_vote(&self, vote: &NewVote) -> StoreResult<()> {
        let mut state = self.lock();
        let duplicate = state
            .votes
            .iter()
            .any(|v| v.voter_id == vote.voter_id && v.election_id == vote.election_id);
        if duplicate {
            return Err(StoreError::DuplicateKey);
        }
        state.votes.push(Vote {
            id: Id::new(),
            vote: vote.clone(),
        });
        Ok(())
    }

    async fn vote(&self, voter_id: Id, election_id: Id) -> StoreResult<Option<Vote>> {
        Ok(self
            .lock()
            .votes
            .iter()
            .find(|v| v.voter_id == voter_id && v.election_id == election_id)
            .cloned())
    }

    async fn mark_revealed(
        &self,
        voter_id: Id,
        election_id: Id,
        candidate_id: Id,
        revealed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        let vote = state.votes.iter_mut().find(|v| {
            v.voter_id == voter_id && v.election_id == election_id && !v.is_revealed
        });
        Ok(match vote {
            Some(vote) => {
                vote.vote.is_revealed = true;
                vote.vote.revealed_candidate_id = Some(candidate_id);
                vote.vote.revealed_at = Some(BsonDateTime::from_chrono(revealed_at));
                true
            }
            None => false,
        })
    }

    async fn revealed_votes(&self, election_id: Id) -> StoreResult<Vec<Vote>> {
        let mut state = self.lock();
        state.revealed_reads += 1;
        if state.faults.revealed_votes {
            return Err(Self::fail("vote read"));
        }
        Ok(state
            .votes
            .iter()
            .filter(|v| v.election_id == election_id && v.is_revealed)
            .cloned()
            .collect())
    }
}
