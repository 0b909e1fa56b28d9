use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// Lifecycle of an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Created but not yet accepting commitments.
    Upcoming,
    /// Accepting commitments.
    Active,
    /// Commitments closed; can be finalized.
    Ended,
    /// Tally sealed and anchored.
    Finalized,
}

impl ElectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Finalized => "finalized",
        }
    }

    /// The status an administrator may manually advance this one to.
    /// `Finalized` is only ever reached through finalization.
    pub fn next_manual(self) -> Option<Self> {
        match self {
            Self::Upcoming => Some(Self::Active),
            Self::Active => Some(Self::Ended),
            Self::Ended | Self::Finalized => None,
        }
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Progress of finalization, orthogonal to [`ElectionStatus`].
///
/// An election with no finalize status at all is treated like `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeStatus {
    Pending,
    Finalizing,
    Success,
    Failed,
}

impl FinalizeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Finalizing => "finalizing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl Display for FinalizeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FinalizeStatus> for Bson {
    fn from(status: FinalizeStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}
