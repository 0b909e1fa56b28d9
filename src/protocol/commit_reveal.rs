use chrono::Utc;

use crate::{
    error::{Error, Result},
    model::{
        common::election::ElectionStatus,
        db::{election::Election, vote::NewVote},
        mongodb::Id,
    },
    store::{SharedStore, StoreError},
};

use super::{
    hasher::{commitment_hash, is_well_formed_commitment},
    parse_id,
};

/// Longest nonce accepted in a reveal.
pub const MAX_NONCE_LEN: usize = 256;

/// Where a voter stands in the election most relevant to them.
#[derive(Debug, Clone, PartialEq)]
pub struct VoterElectionStatus {
    pub election: Option<Election>,
    pub has_committed: bool,
    pub has_revealed: bool,
}

/// Accepts blind commitments and checks their later disclosure.
#[derive(Clone)]
pub struct CommitReveal {
    store: SharedStore,
}

impl CommitReveal {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Record the voter's commitment to a yet-undisclosed candidate.
    pub async fn commit(&self, voter_id: Id, election_id: &str, commitment: &str) -> Result<()> {
        let election_id = parse_id("election", election_id)?;
        if !is_well_formed_commitment(commitment) {
            return Err(Error::Validation(
                "commitment must be 64 lowercase hex characters".to_string(),
            ));
        }

        // Get the election.
        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("election {election_id}")))?;
        if election.status != ElectionStatus::Active {
            return Err(Error::ElectionNotActive);
        }

        // Check for an earlier commitment. The unique index catches any race past this point.
        if self.store.vote(voter_id, election_id).await?.is_some() {
            return Err(Error::AlreadyCommitted);
        }
        let vote = NewVote::commit(voter_id, election_id, commitment.to_string());
        match self.store.create_vote(&vote).await {
            Ok(()) => {
                debug!("Voter {voter_id} committed in election {election_id}");
                Ok(())
            }
            Err(StoreError::DuplicateKey) => Err(Error::AlreadyCommitted),
            Err(e) => Err(e.into()),
        }
    }

    /// Disclose the candidate and nonce behind the voter's commitment.
    ///
    /// A mismatch leaves the vote untouched, so the voter may try again.
    pub async fn reveal(
        &self,
        voter_id: Id,
        election_id: &str,
        candidate_id: &str,
        nonce: &str,
    ) -> Result<()> {
        let election_id = parse_id("election", election_id)?;
        let candidate = parse_id("candidate", candidate_id)?;
        if nonce.is_empty() || nonce.len() > MAX_NONCE_LEN {
            return Err(Error::Validation(format!(
                "nonce must be between 1 and {MAX_NONCE_LEN} bytes"
            )));
        }

        // Get the commitment.
        let vote = self
            .store
            .vote(voter_id, election_id)
            .await?
            .ok_or(Error::NoCommitmentFound)?;
        if vote.is_revealed {
            return Err(Error::AlreadyRevealed);
        }

        // Check the disclosure against it, byte for byte.
        if commitment_hash(candidate_id, nonce) != vote.commitment_hash {
            debug!("Voter {voter_id} failed to open their commitment in election {election_id}");
            return Err(Error::HashMismatch);
        }

        if !self
            .store
            .mark_revealed(voter_id, election_id, candidate, Utc::now())
            .await?
        {
            return Err(Error::AlreadyRevealed);
        }
        debug!("Voter {voter_id} revealed in election {election_id}");
        Ok(())
    }

    /// The election a voter should currently care about in their RT: one
    /// they can still commit to, otherwise the latest one they committed to.
    pub async fn status(&self, rt_id: Id, voter_id: Id) -> Result<VoterElectionStatus> {
        let election = match self.store.open_election_for_voter(rt_id, voter_id).await? {
            Some(election) => Some(election),
            None => self.store.latest_committed_election(rt_id, voter_id).await?,
        };
        let Some(election) = election else {
            return Ok(VoterElectionStatus {
                election: None,
                has_committed: false,
                has_revealed: false,
            });
        };

        let vote = self.store.vote(voter_id, election.id).await?;
        Ok(VoterElectionStatus {
            has_committed: vote.is_some(),
            has_revealed: vote.map_or(false, |v| v.is_revealed),
            election: Some(election),
        })
    }
}
