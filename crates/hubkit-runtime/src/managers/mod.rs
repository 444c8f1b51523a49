//! Stateful managers owned by the event hub
//!
//! This module contains the stores the hub mediates on behalf of extensions:
//! versioned shared state per owner and one-shot response listeners.

pub mod response;
pub mod shared_state;

pub use response::ResponseListenerRegistry;
pub use shared_state::SharedStateStore;
