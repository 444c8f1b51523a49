//! hubkit Runtime Engine
//!
//! This crate contains the runtime engine for hubkit, including:
//! - `EventHub`: global event ordering, fan-out and shared state mediation
//! - `ExtensionContainer`: one extension bound to its own ordered backlog
//! - `OperationOrderer`: the sequential, pausable task runner behind containers
//! - `HitQueue`: the at-most-one-in-flight durable hit processing engine
//! - `HubBuilder`: concurrent registration and startup
//!
//! `hubkit-core` provides the event, shared state, storage and configuration
//! types this engine is built on.

pub mod builder;
pub mod container;
pub mod extension;
pub mod hit_queue;
pub mod hub;
pub mod managers;
pub mod orderer;

pub use builder::{HubBuilder, StartupReport};
pub use container::ExtensionContainer;
pub use extension::{Extension, ExtensionApi, ExtensionRuntime};
pub use hit_queue::{HitQueue, HitQueueStats, HitResponse};
pub use hub::{EventHub, SharedStateResolver};
pub use managers::{ResponseListenerRegistry, SharedStateStore};
pub use orderer::{Disposition, OperationOrderer};

// Re-export core types for convenience
pub use hubkit_core::{
    DataEntity, DataQueue, Event, EventData, EventSource, EventType, FileDataQueue, HitProcessor,
    HitQueueConfig, HitResult, HubConfig, HubError, HubResult, MemoryDataQueue, SharedStateResult,
    SharedStateStatus,
};
