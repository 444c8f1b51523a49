//! Shared state store
//!
//! Holds the versioned shared state history of every owner. The hub is the only
//! writer; reads may come from any extension's orderer task concurrently.

use dashmap::DashMap;
use hubkit_core::{EventData, SharedState, SharedStateError, SharedStateResult};
use tracing::trace;

// ----------------------------------------------------------------------------
// Shared State Store
// ----------------------------------------------------------------------------

/// Per-owner versioned shared state
#[derive(Debug, Default)]
pub struct SharedStateStore {
    states: DashMap<String, SharedState>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value for `owner` at `version`
    pub fn create(
        &self,
        owner: &str,
        version: u64,
        value: Option<EventData>,
    ) -> Result<(), SharedStateError> {
        trace!("Shared state for {} set at version {}", owner, version);
        self.states
            .entry(owner.to_string())
            .or_insert_with(|| SharedState::new(owner))
            .set(version, value)
    }

    /// Reserve `version` for `owner` without a value
    pub fn create_pending(&self, owner: &str, version: u64) -> Result<(), SharedStateError> {
        trace!("Shared state for {} pending at version {}", owner, version);
        self.states
            .entry(owner.to_string())
            .or_insert_with(|| SharedState::new(owner))
            .add_pending(version)
    }

    /// Resolve the pending slot of `owner` at `version`
    pub fn resolve_pending(
        &self,
        owner: &str,
        version: u64,
        value: Option<EventData>,
    ) -> Result<(), SharedStateError> {
        match self.states.get_mut(owner) {
            Some(mut state) => state.resolve_pending(version, value),
            None => Err(SharedStateError::NotPending {
                owner: owner.to_string(),
                version,
            }),
        }
    }

    /// State of `owner` as of `version`; `None` if the owner never published
    pub fn get(&self, owner: &str, version: Option<u64>) -> Option<SharedStateResult> {
        self.states.get(owner).map(|state| state.resolve(version))
    }

    /// Highest version recorded for `owner`, pending or set
    pub fn latest_version(&self, owner: &str) -> Option<u64> {
        self.states.get(owner).and_then(|state| state.latest_version())
    }

    /// Owners that have published at least once
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.states.iter().map(|entry| entry.key().clone()).collect();
        owners.sort();
        owners
    }
}
