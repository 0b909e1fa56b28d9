mod desc;
mod results;
mod spec;

pub use desc::{Dashboard, ElectionDescription, ElectionSummary};
pub use results::{CandidateResult, ElectionRecord, ElectionResults, FinalizeOutcome};
pub use spec::{ElectionSpec, StatusUpdate};
