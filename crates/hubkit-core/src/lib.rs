//! hubkit Core
//!
//! This crate provides the foundational types shared by every hubkit component:
//! - `Event` and its open `EventType` / `EventSource` vocabulary
//! - Versioned shared state snapshots (`SharedState`)
//! - Durable FIFO storage for outbound hits (`DataQueue` and its implementations)
//! - The pluggable `HitProcessor` contract
//! - Centralized configuration and error types
//!
//! The runtime engine (event hub, extension containers, orderers, hit queues)
//! lives in `hubkit-runtime` and is built entirely on these types.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod event;
pub mod hit_processor;
pub mod shared_state;
pub mod storage;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{DispatchConfig, HitQueueConfig, HubConfig, HubConfigBuilder, LoggingConfig};
pub use errors::{HubError, HubResult, SharedStateError, StorageError};
pub use event::{Event, EventData, EventSource, EventType};
pub use hit_processor::{HitProcessor, HitResult, RECOVERABLE_STATUS_CODES};
pub use shared_state::{SharedState, SharedStateResult, SharedStateStatus};
pub use storage::{DataEntity, DataQueue, FileDataQueue, MemoryDataQueue};
pub use types::Timestamp;
