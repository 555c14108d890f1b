use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use rst_common::standard::chrono::Utc;

use super::types::{AgreementStatus, WatcherError};

/// `ConditionState` is one condition's lifecycle inside a running agreement
///
/// `Uninitialized → Unfulfilled → {Fulfilled | Aborted}`, the last two
/// terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    Uninitialized,
    Unfulfilled,
    Fulfilled,
    Aborted,
}

/// One running agreement: per-condition state, the derived condition ids,
/// and the set of already-dispatched (condition, event) pairs
#[derive(Debug, Clone)]
struct AgreementInstance {
    did: String,
    template_id: String,
    states: BTreeMap<String, ConditionState>,
    condition_ids: BTreeMap<String, String>,
    status: AgreementStatus,
    created_at: String,
    dispatched: HashSet<(String, String)>,
}

/// `AgreementRegistry` is the in-process projection of every watched
/// agreement's state
///
/// Cloning shares the underlying map, so the watcher's tasks and the caller
/// observe the same state. Per-key operations take the lock for their whole
/// read-modify-write, which makes `record_dispatch` the atomic idempotence
/// guard the dispatch path relies on
#[derive(Clone, Default)]
pub struct AgreementRegistry {
    inner: Arc<Mutex<HashMap<String, AgreementInstance>>>,
}

impl AgreementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `register` creates the instance record for a fresh agreement id,
    /// every condition starting `Unfulfilled`
    pub fn register(
        &self,
        agreement_id: &str,
        did: &str,
        template_id: &str,
        condition_ids: &[(String, String)],
    ) -> Result<(), WatcherError> {
        let mut map = self.lock();
        if map.contains_key(agreement_id) {
            return Err(WatcherError::AgreementAlreadyExists(
                agreement_id.to_string(),
            ));
        }

        let mut states = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for (name, condition_id) in condition_ids {
            states.insert(name.clone(), ConditionState::Unfulfilled);
            ids.insert(name.clone(), condition_id.clone());
        }

        map.insert(
            agreement_id.to_string(),
            AgreementInstance {
                did: did.to_string(),
                template_id: template_id.to_string(),
                states,
                condition_ids: ids,
                status: AgreementStatus::Pending,
                created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                dispatched: HashSet::new(),
            },
        );

        Ok(())
    }

    pub fn get_state(&self, agreement_id: &str, condition_name: &str) -> ConditionState {
        self.lock()
            .get(agreement_id)
            .and_then(|instance| instance.states.get(condition_name))
            .copied()
            .unwrap_or(ConditionState::Uninitialized)
    }

    pub fn set_state(&self, agreement_id: &str, condition_name: &str, state: ConditionState) {
        if let Some(instance) = self.lock().get_mut(agreement_id) {
            instance.states.insert(condition_name.to_string(), state);
        }
    }

    /// `record_dispatch` records one (condition, event) delivery, returning
    /// `true` only the first time the key is seen
    ///
    /// Duplicate log deliveries (replays, at-least-once sources) hit the
    /// recorded key and are dropped by the caller
    pub fn record_dispatch(
        &self,
        agreement_id: &str,
        condition_name: &str,
        event_name: &str,
    ) -> bool {
        match self.lock().get_mut(agreement_id) {
            Some(instance) => instance
                .dispatched
                .insert((condition_name.to_string(), event_name.to_string())),
            None => false,
        }
    }

    /// `mark_terminal` records the agreement's durable outcome
    pub fn mark_terminal(&self, agreement_id: &str, outcome: AgreementStatus) {
        if let Some(instance) = self.lock().get_mut(agreement_id) {
            instance.status = outcome;
        }
    }

    pub fn status(&self, agreement_id: &str) -> Option<AgreementStatus> {
        self.lock().get(agreement_id).map(|instance| instance.status)
    }

    pub fn did(&self, agreement_id: &str) -> Option<String> {
        self.lock()
            .get(agreement_id)
            .map(|instance| instance.did.clone())
    }

    pub fn template_id(&self, agreement_id: &str) -> Option<String> {
        self.lock()
            .get(agreement_id)
            .map(|instance| instance.template_id.clone())
    }

    pub fn created_at(&self, agreement_id: &str) -> Option<String> {
        self.lock()
            .get(agreement_id)
            .map(|instance| instance.created_at.clone())
    }

    pub fn condition_id(&self, agreement_id: &str, condition_name: &str) -> Option<String> {
        self.lock()
            .get(agreement_id)
            .and_then(|instance| instance.condition_ids.get(condition_name).cloned())
    }

    pub fn condition_states(
        &self,
        agreement_id: &str,
    ) -> Option<BTreeMap<String, ConditionState>> {
        self.lock()
            .get(agreement_id)
            .map(|instance| instance.states.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AgreementInstance>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
