use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        api::id::ApiId,
        db::{
            candidate::{Candidate, CandidateCore, NewCandidate},
            election::Election,
        },
    },
};

/// A candidate to add to an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CandidateSpec {
    pub fn into_candidate(self, election: &Election) -> Result<NewCandidate> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("candidate name must not be empty".to_string()));
        }
        Ok(NewCandidate {
            election_id: election.id,
            rt_id: election.rt_id,
            name: name.to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

/// Changes to an existing candidate. Absent fields are left as they are; an
/// empty description clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CandidateUpdate {
    pub fn apply(self, candidate: &mut CandidateCore) -> Result<()> {
        if let Some(name) = self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Validation("candidate name must not be empty".to_string()));
            }
            candidate.name = name.to_string();
        }
        if let Some(description) = self.description {
            candidate.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        Ok(())
    }
}

/// A candidate as shown to clients. Voters commit to `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub election_id: ApiId,
    pub name: String,
    pub description: Option<String>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            election_id: candidate.election_id.into(),
            name: candidate.candidate.name,
            description: candidate.candidate.description,
        }
    }
}
