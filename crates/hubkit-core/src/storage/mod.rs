//! Durable FIFO storage for hits
//!
//! A `DataQueue` is the persistence layer under a hit queue: records are appended
//! in arrival order, only the head is ever read or removed, and removal happens
//! only once the hit has been acknowledged. Two implementations are provided:
//! - `MemoryDataQueue` for tests and ephemeral queues
//! - `FileDataQueue`, which survives process restarts

mod file;
mod memory;

pub use file::FileDataQueue;
pub use memory::MemoryDataQueue;

use crate::errors::StorageError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Data Entity
// ----------------------------------------------------------------------------

/// One queued hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntity {
    /// Unique id of the hit
    pub unique_identifier: String,
    /// Time the hit was created
    pub timestamp: Timestamp,
    /// Opaque payload, interpreted only by the hit processor
    pub data: Option<Vec<u8>>,
}

impl DataEntity {
    /// Create a hit with a fresh identifier and the current time
    pub fn new(data: Option<Vec<u8>>) -> Self {
        Self {
            unique_identifier: Uuid::new_v4().to_string(),
            timestamp: Timestamp::now(),
            data,
        }
    }

    /// Create a hit from a payload
    pub fn with_payload<T: Into<Vec<u8>>>(payload: T) -> Self {
        Self::new(Some(payload.into()))
    }
}

// ----------------------------------------------------------------------------
// Data Queue Trait
// ----------------------------------------------------------------------------

/// Persisted FIFO queue of hits
///
/// Implementations are owned by exactly one hit queue engine, which serializes
/// every call; they need not be internally synchronized.
pub trait DataQueue: Send {
    /// Append a hit at the tail
    fn add(&mut self, entity: DataEntity) -> Result<(), StorageError>;

    /// Read the head without removing it
    fn peek(&mut self) -> Result<Option<DataEntity>, StorageError>;

    /// Remove the head, returning whether a record was removed
    fn remove(&mut self) -> Result<bool, StorageError>;

    /// Remove every record
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Number of queued records
    fn count(&self) -> Result<usize, StorageError>;
}

impl<Q: DataQueue + ?Sized> DataQueue for Box<Q> {
    fn add(&mut self, entity: DataEntity) -> Result<(), StorageError> {
        (**self).add(entity)
    }

    fn peek(&mut self) -> Result<Option<DataEntity>, StorageError> {
        (**self).peek()
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        (**self).remove()
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }

    fn count(&self) -> Result<usize, StorageError> {
        (**self).count()
    }
}
