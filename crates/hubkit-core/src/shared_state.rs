//! Versioned shared state
//!
//! Each extension publishes snapshots of its state under its own name. A snapshot
//! is versioned by the sequence number of the event that produced it, so a reader
//! processing event N always sees the state as of event N and never a later one.

use crate::errors::SharedStateError;
use crate::event::EventData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ----------------------------------------------------------------------------
// Status / Result
// ----------------------------------------------------------------------------

/// Status of a shared state entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedStateStatus {
    /// Entry holds a published value
    Set,
    /// Version slot reserved, value not yet available
    Pending,
    /// No entry at or before the requested version
    None,
}

/// Result of a shared state lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateResult {
    pub status: SharedStateStatus,
    pub value: Option<EventData>,
    /// Version of the entry that answered the lookup
    pub version: Option<u64>,
}

impl SharedStateResult {
    fn none() -> Self {
        Self {
            status: SharedStateStatus::None,
            value: None,
            version: None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.status == SharedStateStatus::Set
    }

    pub fn is_pending(&self) -> bool {
        self.status == SharedStateStatus::Pending
    }
}

#[derive(Debug, Clone)]
struct SharedStateEntry {
    status: SharedStateStatus,
    value: Option<EventData>,
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// Ordered version history of one extension's shared state
#[derive(Debug, Clone)]
pub struct SharedState {
    owner: String,
    entries: BTreeMap<u64, SharedStateEntry>,
}

impl SharedState {
    /// Create an empty history for `owner`
    pub fn new<T: Into<String>>(owner: T) -> Self {
        Self {
            owner: owner.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Highest version recorded, pending or set
    pub fn latest_version(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    /// Publish a value at `version`
    ///
    /// Versions only move forward: `version` must be greater than every version
    /// already recorded, pending slots included.
    pub fn set(&mut self, version: u64, value: Option<EventData>) -> Result<(), SharedStateError> {
        self.insert(version, SharedStateStatus::Set, value)
    }

    /// Reserve `version` as pending
    pub fn add_pending(&mut self, version: u64) -> Result<(), SharedStateError> {
        self.insert(version, SharedStateStatus::Pending, None)
    }

    /// Resolve the pending slot at `version` with a value
    pub fn resolve_pending(
        &mut self,
        version: u64,
        value: Option<EventData>,
    ) -> Result<(), SharedStateError> {
        match self.entries.get_mut(&version) {
            Some(entry) if entry.status == SharedStateStatus::Pending => {
                entry.status = SharedStateStatus::Set;
                entry.value = value;
                Ok(())
            }
            _ => Err(SharedStateError::NotPending {
                owner: self.owner.clone(),
                version,
            }),
        }
    }

    /// Latest entry at or before `version`, or the latest entry for `None`
    pub fn resolve(&self, version: Option<u64>) -> SharedStateResult {
        let found = match version {
            Some(version) => self.entries.range(..=version).next_back(),
            None => self.entries.iter().next_back(),
        };

        match found {
            Some((version, entry)) => SharedStateResult {
                status: entry.status,
                value: entry.value.clone(),
                version: Some(*version),
            },
            None => SharedStateResult::none(),
        }
    }

    fn insert(
        &mut self,
        version: u64,
        status: SharedStateStatus,
        value: Option<EventData>,
    ) -> Result<(), SharedStateError> {
        if let Some(latest) = self.latest_version() {
            if version <= latest {
                return Err(SharedStateError::StaleVersion {
                    owner: self.owner.clone(),
                    version,
                    latest,
                });
            }
        }
        self.entries.insert(version, SharedStateEntry { status, value });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: i64) -> Option<EventData> {
        let mut map = EventData::new();
        map.insert("value".into(), json!(value));
        Some(map)
    }

    #[test]
    fn test_resolve_returns_latest_at_or_before_version() {
        let mut state = SharedState::new("config");
        state.set(5, data(5)).unwrap();
        state.set(9, data(9)).unwrap();

        assert_eq!(state.resolve(Some(5)).value, data(5));
        assert_eq!(state.resolve(Some(8)).value, data(5));
        assert_eq!(state.resolve(Some(9)).value, data(9));
        assert_eq!(state.resolve(Some(100)).value, data(9));
        assert_eq!(state.resolve(None).value, data(9));
    }

    #[test]
    fn test_resolve_before_first_version_is_none() {
        let mut state = SharedState::new("config");
        state.set(5, data(5)).unwrap();

        let result = state.resolve(Some(4));
        assert_eq!(result.status, SharedStateStatus::None);
        assert_eq!(result.value, None);
        assert_eq!(result.version, None);
    }

    #[test]
    fn test_pending_then_resolved_keeps_version() {
        let mut state = SharedState::new("identity");
        state.add_pending(3).unwrap();

        let pending = state.resolve(Some(3));
        assert!(pending.is_pending());
        assert_eq!(pending.version, Some(3));

        state.resolve_pending(3, data(3)).unwrap();
        let resolved = state.resolve(Some(3));
        assert!(resolved.is_set());
        assert_eq!(resolved.value, data(3));
        assert_eq!(resolved.version, Some(3));
    }

    #[test]
    fn test_set_after_pending_does_not_skip_reservation() {
        let mut state = SharedState::new("identity");
        state.add_pending(3).unwrap();
        state.set(6, data(6)).unwrap();

        assert!(state.resolve(Some(4)).is_pending());
        assert_eq!(state.resolve(None).value, data(6));

        state.resolve_pending(3, data(3)).unwrap();
        assert_eq!(state.resolve(Some(4)).value, data(3));
        assert_eq!(state.resolve(None).value, data(6));
    }

    #[test]
    fn test_stale_version_rejected() {
        let mut state = SharedState::new("config");
        state.set(7, data(7)).unwrap();

        let err = state.set(7, data(1)).unwrap_err();
        assert_eq!(
            err,
            SharedStateError::StaleVersion {
                owner: "config".into(),
                version: 7,
                latest: 7
            }
        );
        assert!(state.add_pending(2).is_err());
        assert_eq!(state.resolve(None).value, data(7));
    }

    #[test]
    fn test_resolve_pending_requires_pending_entry() {
        let mut state = SharedState::new("config");
        state.set(1, data(1)).unwrap();

        assert!(matches!(
            state.resolve_pending(1, data(2)),
            Err(SharedStateError::NotPending { version: 1, .. })
        ));
        assert!(state.resolve_pending(4, data(2)).is_err());
    }
}
