use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::{
        api::{election::ElectionSummary, id::ApiId},
        common::election::ElectionStatus,
        db::{election::Election, vote::Vote},
    },
    protocol::commit_reveal::VoterElectionStatus,
};

/// A blind commitment to a candidate.
///
/// IDs are taken as plain strings so that malformed ones are reported as
/// validation errors rather than as unparseable bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub election_id: String,
    /// Lowercase hex SHA-256 of the candidate ID followed by the nonce.
    pub commitment_hash: String,
}

/// The opening of an earlier commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRequest {
    pub election_id: String,
    pub candidate_id: String,
    pub nonce: String,
}

/// Where a voter stands in their current election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterElection {
    pub election: Option<ElectionSummary>,
    pub has_committed: bool,
    pub has_revealed: bool,
}

impl From<VoterElectionStatus> for VoterElection {
    fn from(status: VoterElectionStatus) -> Self {
        Self {
            election: status.election.as_ref().map(ElectionSummary::from),
            has_committed: status.has_committed,
            has_revealed: status.has_revealed,
        }
    }
}

/// One of a voter's past votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteHistoryEntry {
    pub election_id: ApiId,
    /// Empty if the election no longer exists.
    pub election_name: String,
    pub election_status: Option<ElectionStatus>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub committed_at: DateTime<Utc>,
    pub is_revealed: bool,
    pub revealed_candidate_id: Option<ApiId>,
    /// `None` if unrevealed, or if the candidate has since been removed.
    pub revealed_candidate_name: Option<String>,
    pub revealed_at: Option<DateTime<Utc>>,
}

impl VoteHistoryEntry {
    /// `candidate_names` maps hex candidate IDs to names.
    pub fn new(
        vote: &Vote,
        election: Option<&Election>,
        candidate_names: &HashMap<String, String>,
    ) -> Self {
        Self {
            election_id: vote.election_id.into(),
            election_name: election.map(|e| e.name.clone()).unwrap_or_default(),
            election_status: election.map(|e| e.status),
            start_at: election.map(|e| e.start_at),
            end_at: election.map(|e| e.end_at),
            committed_at: vote.committed_at,
            is_revealed: vote.is_revealed,
            revealed_candidate_id: vote.revealed_candidate_id.map(ApiId::from),
            revealed_candidate_name: vote
                .revealed_candidate_id
                .and_then(|id| candidate_names.get(&id.to_string()).cloned()),
            revealed_at: vote.revealed_at.map(|at| at.to_chrono()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{db::vote::NewVote, mongodb::Id};

    use super::*;

    #[test]
    fn history_names_the_revealed_candidate() {
        let election = Election::example(Id::new(), ElectionStatus::Ended);
        let candidate = Id::new();
        let mut vote = Vote {
            id: Id::new(),
            vote: NewVote::commit(Id::new(), election.id, "a".repeat(64)),
        };
        let names = HashMap::from([(candidate.to_string(), "Bu Siti".to_string())]);

        let pending = VoteHistoryEntry::new(&vote, Some(&election), &names);
        assert_eq!(pending.revealed_candidate_name, None);

        vote.vote.is_revealed = true;
        vote.vote.revealed_candidate_id = Some(candidate);
        let revealed = VoteHistoryEntry::new(&vote, Some(&election), &names);
        assert_eq!(revealed.revealed_candidate_name.as_deref(), Some("Bu Siti"));
        assert_eq!(revealed.election_name, "Ketua RT 2026");

        // A removed candidate leaves only the ID.
        let removed = VoteHistoryEntry::new(&vote, None, &HashMap::new());
        assert_eq!(removed.revealed_candidate_id, Some(ApiId::from(candidate)));
        assert_eq!(removed.revealed_candidate_name, None);
        assert_eq!(removed.election_name, "");
    }
}
