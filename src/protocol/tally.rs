use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::db::vote::Vote;

use super::hasher::{summary_timestamp, CandidateTotal, TallySummary};

/// Disclosed ballots counted per candidate, ordered by candidate ID.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tally {
    counts: BTreeMap<String, u64>,
}

impl Tally {
    /// Count one ballot per candidate ID yielded.
    pub fn count<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts = BTreeMap::new();
        for candidate in candidates {
            *counts.entry(candidate.into()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Count the disclosed ballots among `votes`. Undisclosed ones are skipped.
    pub fn from_votes(votes: &[Vote]) -> Self {
        Self::count(
            votes
                .iter()
                .filter(|vote| vote.is_revealed)
                .filter_map(|vote| vote.revealed_candidate_id)
                .map(|candidate| candidate.to_string()),
        )
    }

    /// Number of ballots counted.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The candidate with the most ballots and its count.
    /// Ties go to the lexicographically smallest candidate ID.
    pub fn winner(&self) -> Option<(&str, u64)> {
        let mut winner: Option<(&str, u64)> = None;
        for (candidate, &votes) in &self.counts {
            let better = match winner {
                None => true,
                Some((current, max)) => votes > max || (votes == max && candidate.as_str() < current),
            };
            if better {
                winner = Some((candidate, votes));
            }
        }
        winner
    }

    /// Seal these counts into a summary for the given election.
    pub fn summarize(&self, election_id: &str, at: DateTime<Utc>) -> TallySummary {
        let winner = self
            .winner()
            .map(|(candidate, _)| candidate.to_string())
            .unwrap_or_default();
        TallySummary {
            election_id: election_id.to_string(),
            total_revealed: self.total(),
            results: self
                .counts
                .iter()
                .map(|(candidate, &total)| CandidateTotal {
                    candidate_id: candidate.clone(),
                    total,
                })
                .collect(),
            winner,
            timestamp: summary_timestamp(at),
        }
    }
}
