use chrono::Utc;

use crate::{
    anchor::SharedAnchor,
    error::{Error, Result},
    model::{
        api::auth::Caller,
        common::election::{ElectionStatus, FinalizeStatus},
        db::election::Election,
        mongodb::Id,
    },
    store::SharedStore,
};

use super::{
    hasher::{refingerprint, TallySummary},
    parse_id,
    tally::Tally,
};

/// Finalize statuses from which a new attempt may claim an election.
const CLAIMABLE: [Option<FinalizeStatus>; 3] = [
    None,
    Some(FinalizeStatus::Pending),
    Some(FinalizeStatus::Failed),
];

/// Reason recorded when an operator releases a stuck finalization.
pub const RESET_REASON: &str = "reset by operator";

/// What a finalized election is sealed with.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReceipt {
    /// `None` only if a stored summary no longer parses.
    pub summary: Option<TallySummary>,
    pub fingerprint: String,
    pub anchor_reference: String,
}

/// A failed finalize stage, with the error to hand back to the caller.
struct StageFailure {
    stage: &'static str,
    error: Error,
}

impl StageFailure {
    fn at(stage: &'static str) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }

    fn reason(&self) -> String {
        format!("{}: {}", self.stage, self.error)
    }
}

/// Seals an ended election's tally and anchors its fingerprint, at most once.
#[derive(Clone)]
pub struct Finalizer {
    store: SharedStore,
    anchor: SharedAnchor,
}

impl Finalizer {
    pub fn new(store: SharedStore, anchor: SharedAnchor) -> Self {
        Self { store, anchor }
    }

    async fn administered_election(&self, election_id: &str, caller: &Caller) -> Result<Election> {
        let id = parse_id("election", election_id)?;
        let election = self
            .store
            .election(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("election {id}")))?;
        if !caller.administers(election.rt_id) {
            return Err(Error::Forbidden(
                "only an administrator of the election's RT may do this".to_string(),
            ));
        }
        Ok(election)
    }

    /// Finalize an ended election on behalf of `caller`.
    ///
    /// Finalizing an already finalized election returns the existing result
    /// without touching the anchor. Of any number of concurrent callers,
    /// exactly one does the work; the others get [`Error::AlreadyInProgress`].
    pub async fn finalize(&self, election_id: &str, caller: &Caller) -> Result<FinalizeReceipt> {
        let election = self.administered_election(election_id, caller).await?;
        let id = election.id;

        if election.finalize_status == Some(FinalizeStatus::Success) {
            debug!("Election {id} is already finalized");
            return Self::existing_receipt(&election);
        }
        if election.status != ElectionStatus::Ended {
            return Err(Error::InvalidState(format!(
                "election is {}, only ended elections can be finalized",
                election.status
            )));
        }

        // Claim the election. Only one caller can move it into `finalizing`.
        let claimed = self
            .store
            .set_finalize_status_if(id, FinalizeStatus::Finalizing, &CLAIMABLE)
            .await?;
        if claimed == 0 {
            info!("Finalization of election {id} is already claimed");
            return Err(Error::AlreadyInProgress);
        }
        info!("Finalizing election {id} for {}", caller.id);

        match self.run(id).await {
            Ok(receipt) => {
                info!(
                    "Finalized election {id}: {} anchored as {}",
                    receipt.fingerprint, receipt.anchor_reference
                );
                Ok(receipt)
            }
            Err(failure) => {
                let reason = failure.reason();
                error!("Finalizing election {id} failed at {reason}");
                match self.store.set_finalize_failed(id, &reason).await {
                    Ok(0) => warn!("Election {id} was released before its failure could be recorded"),
                    Ok(_) => {}
                    Err(e) => error!("Could not record failed finalization of election {id}: {e}"),
                }
                Err(failure.error)
            }
        }
    }

    /// The claimed part of finalization. Any error leaves the election to be
    /// marked failed by the caller.
    async fn run(&self, id: Id) -> std::result::Result<FinalizeReceipt, StageFailure> {
        let election = self
            .store
            .election(id)
            .await
            .map_err(|e| StageFailure::at("reading election")(e.into()))?
            .ok_or_else(|| StageFailure::at("reading election")(Error::NotFound(format!("election {id}"))))?;

        let (summary, fingerprint) = match (&election.summary, &election.summary_fingerprint) {
            // An earlier attempt got as far as sealing the tally; keep it.
            (Some(stored), Some(stored_fingerprint)) => {
                let recomputed = refingerprint(stored);
                if recomputed != *stored_fingerprint {
                    return Err(StageFailure::at("checking stored summary")(Error::Integrity(
                        format!("summary hashes to {recomputed}, stored fingerprint is {stored_fingerprint}"),
                    )));
                }
                info!("Reusing the sealed summary of election {id}");
                (TallySummary::parse(stored).ok(), stored_fingerprint.clone())
            }
            _ => {
                let votes = self
                    .store
                    .revealed_votes(id)
                    .await
                    .map_err(|e| StageFailure::at("reading revealed votes")(e.into()))?;
                let summary = Tally::from_votes(&votes).summarize(&id.to_string(), Utc::now());
                let (text, fingerprint) = summary
                    .seal()
                    .map_err(|e| StageFailure::at("sealing summary")(e.into()))?;
                self.store
                    .set_summary_and_fingerprint(id, &text, &fingerprint)
                    .await
                    .map_err(|e| StageFailure::at("saving summary")(e.into()))?;
                debug!(
                    "Sealed election {id}: {} revealed votes, fingerprint {fingerprint}",
                    summary.total_revealed
                );
                (Some(summary), fingerprint)
            }
        };

        debug!("Anchoring election {id}");
        let anchor_reference = self
            .anchor
            .store(&id.to_string(), &fingerprint)
            .await
            .map_err(|e| StageFailure::at("anchor error")(e.into()))?;
        self.store
            .set_finalize_result(id, &anchor_reference, Utc::now())
            .await
            .map_err(|e| StageFailure::at("saving anchor result")(e.into()))?;
        info!("Anchored election {id} as {anchor_reference}");

        Ok(FinalizeReceipt {
            summary,
            fingerprint,
            anchor_reference,
        })
    }

    fn existing_receipt(election: &Election) -> Result<FinalizeReceipt> {
        match (&election.summary_fingerprint, &election.anchor_reference) {
            (Some(fingerprint), Some(anchor_reference)) => Ok(FinalizeReceipt {
                summary: election
                    .summary
                    .as_deref()
                    .and_then(|s| TallySummary::parse(s).ok()),
                fingerprint: fingerprint.clone(),
                anchor_reference: anchor_reference.clone(),
            }),
            _ => Err(Error::Integrity(format!(
                "election {} is finalized but has no anchored fingerprint",
                election.id
            ))),
        }
    }

    /// Release an election left in `finalizing` by a crashed attempt, so that
    /// finalize can be retried.
    pub async fn reset(&self, election_id: &str, caller: &Caller) -> Result<()> {
        let election = self.administered_election(election_id, caller).await?;
        let id = election.id;
        // Status and reason go in one write; a finalize may claim the election
        // the moment it is released.
        let released = self.store.set_finalize_failed(id, RESET_REASON).await?;
        if released == 0 {
            return Err(Error::InvalidState(
                "election is not being finalized".to_string(),
            ));
        }
        warn!("Finalization of election {id} was reset by {}", caller.id);
        Ok(())
    }
}
