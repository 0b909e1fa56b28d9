//! A scripted in-process anchor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rocket::tokio::sync::Notify;

use super::{Anchor, AnchorError};

/// Lets a test pause `store` calls mid-flight.
#[derive(Default)]
pub struct Gate {
    /// Notified when a `store` call reaches the gate.
    pub entered: Notify,
    /// Notify to let the waiting `store` call continue.
    pub release: Notify,
}

#[derive(Default)]
struct State {
    records: HashMap<String, String>,
    stores: usize,
    fail_stores: bool,
    fail_fetches: bool,
    gate: Option<Arc<Gate>>,
}

#[derive(Clone, Default)]
pub struct MockAnchor {
    state: Arc<Mutex<State>>,
}

impl MockAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Number of `store` calls that reached the ledger.
    pub fn stores(&self) -> usize {
        self.lock().stores
    }

    pub fn fail_stores(&self, fail: bool) {
        self.lock().fail_stores = fail;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.lock().fail_fetches = fail;
    }

    /// Replace the recorded fingerprint, as a diverging ledger would.
    pub fn overwrite(&self, election_id: &str, fingerprint: &str) {
        self.lock()
            .records
            .insert(election_id.to_string(), fingerprint.to_string());
    }

    pub fn recorded(&self, election_id: &str) -> Option<String> {
        self.lock().records.get(election_id).cloned()
    }

    /// Make every subsequent `store` call wait at the returned gate.
    pub fn hold_stores(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().gate = Some(gate.clone());
        gate
    }
}

#[rocket::async_trait]
impl Anchor for MockAnchor {
    async fn store(&self, election_id: &str, fingerprint: &str) -> Result<String, AnchorError> {
        let gate = self.lock().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.lock();
        if state.fail_stores {
            return Err(AnchorError::Unavailable("ledger node unreachable".to_string()));
        }
        state.stores += 1;
        state
            .records
            .insert(election_id.to_string(), fingerprint.to_string());
        Ok(format!(
            "0xtx{:04}{}",
            state.stores,
            fingerprint.get(2..10).unwrap_or_default()
        ))
    }

    async fn fetch(&self, election_id: &str) -> Result<String, AnchorError> {
        let state = self.lock();
        if state.fail_fetches {
            return Err(AnchorError::Unavailable("ledger node unreachable".to_string()));
        }
        state
            .records
            .get(election_id)
            .cloned()
            .ok_or_else(|| AnchorError::NoRecord(election_id.to_string()))
    }
}
