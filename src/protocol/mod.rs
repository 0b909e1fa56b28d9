//! The voting protocol: blind commitments, their disclosure, and sealing,
//! anchoring and re-checking the final tally.

use crate::{
    error::{Error, Result},
    model::mongodb::Id,
};

pub mod commit_reveal;
pub mod finalize;
pub mod hasher;
pub mod tally;
pub mod verify;

pub use commit_reveal::CommitReveal;
pub use finalize::Finalizer;
pub use verify::Verifier;

/// Parse an ID supplied by a client, naming what it should identify if it is malformed.
pub(crate) fn parse_id(what: &str, raw: &str) -> Result<Id> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("malformed {what} ID {raw:?}")))
}
