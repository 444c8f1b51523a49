//! In-memory data queue

use super::{DataEntity, DataQueue};
use crate::errors::StorageError;
use std::collections::VecDeque;

/// In-memory queue for testing and for hits that need not survive a restart
#[derive(Debug)]
pub struct MemoryDataQueue {
    entries: VecDeque<DataEntity>,
    available: bool,
}

impl MemoryDataQueue {
    /// Create a new, empty memory queue
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            available: true,
        }
    }

    /// Simulate an unavailable storage medium (testing)
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable {
                reason: "memory queue marked unavailable".to_string(),
            })
        }
    }
}

impl Default for MemoryDataQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DataQueue for MemoryDataQueue {
    fn add(&mut self, entity: DataEntity) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.entries.push_back(entity);
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<DataEntity>, StorageError> {
        self.ensure_available()?;
        Ok(self.entries.front().cloned())
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        self.ensure_available()?;
        Ok(self.entries.pop_front().is_some())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.entries.clear();
        Ok(())
    }

    fn count(&self) -> Result<usize, StorageError> {
        self.ensure_available()?;
        Ok(self.entries.len())
    }
}
