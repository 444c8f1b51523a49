//! Hit processor contract
//!
//! A hit processor performs the actual unit of work for one queued hit, usually a
//! network request, and tells the hit queue whether the hit is finished.

use crate::storage::DataEntity;
use async_trait::async_trait;
use std::time::Duration;

/// Response codes treated as transient failures
pub const RECOVERABLE_STATUS_CODES: [u16; 3] = [408, 503, 504];

const STATUS_OK: u16 = 200;

// ----------------------------------------------------------------------------
// Hit Result
// ----------------------------------------------------------------------------

/// Outcome of processing one hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitResult {
    /// The hit is finished and is removed from the queue
    ///
    /// This covers both success and permanent failure; `response` holds the
    /// response body when there is one worth handing back to the owner.
    Completed { response: Option<Vec<u8>> },
    /// Transient failure; the hit stays at the head and processing pauses
    Retry,
}

impl HitResult {
    /// Completed without a response body (success or drop)
    pub fn dropped() -> Self {
        HitResult::Completed { response: None }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HitResult::Completed { .. })
    }

    /// Classify a network response
    ///
    /// One of [`RECOVERABLE_STATUS_CODES`] is retried and a 200 completes with
    /// its body. Every other code, or no status code at all, drops the hit.
    pub fn from_status_code(status: Option<u16>, body: Option<Vec<u8>>) -> Self {
        match status {
            Some(code) if RECOVERABLE_STATUS_CODES.contains(&code) => HitResult::Retry,
            Some(STATUS_OK) => HitResult::Completed { response: body },
            _ => HitResult::dropped(),
        }
    }
}

// ----------------------------------------------------------------------------
// Hit Processor Trait
// ----------------------------------------------------------------------------

/// Pluggable worker driven by a hit queue
///
/// The queue calls `process_hit` for at most one hit at a time. Payloads the
/// processor cannot parse should be reported as completed so they are dropped
/// instead of blocking the queue forever.
#[async_trait]
pub trait HitProcessor: Send + Sync {
    /// Delay after a `Retry` before the queue tries the head again on its own
    ///
    /// `None` means processing only resumes on the next queue or
    /// begin-processing call.
    fn retry_interval(&self) -> Option<Duration> {
        None
    }

    /// Process one hit
    async fn process_hit(&self, entity: &DataEntity) -> HitResult;
}
