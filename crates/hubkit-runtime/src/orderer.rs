//! Operation Orderer
//!
//! A generic sequential task runner. Items are processed strictly in submission
//! order on a dedicated tokio task while the orderer is running; items submitted
//! while it is stopped accumulate. A handler that defers an item halts the
//! orderer at that item (head-of-line blocking) until something re-triggers it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

// ----------------------------------------------------------------------------
// Disposition
// ----------------------------------------------------------------------------

/// What a handler did with the item at the head of the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Item fully handled; advance to the next one
    Consumed,
    /// Item not ready; keep it at the head and halt until re-triggered
    Deferred,
}

// ----------------------------------------------------------------------------
// Orderer Messages
// ----------------------------------------------------------------------------

enum OrdererMessage<T> {
    Submit(T),
    /// Resume processing (state flag already updated by the sender)
    Start,
    /// Re-attempt the head without changing state
    Wake,
    Shutdown,
}

// ----------------------------------------------------------------------------
// Operation Orderer Handle
// ----------------------------------------------------------------------------

/// Handle to a running orderer task
///
/// Handles are cheap to clone; every clone feeds the same backlog.
pub struct OperationOrderer<T> {
    label: Arc<str>,
    sender: mpsc::UnboundedSender<OrdererMessage<T>>,
    pending: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl<T> Clone for OperationOrderer<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            sender: self.sender.clone(),
            pending: Arc::clone(&self.pending),
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> fmt::Debug for OperationOrderer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationOrderer")
            .field("label", &self.label)
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T: Send + 'static> OperationOrderer<T> {
    /// Spawn a new orderer in the stopped state
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<L, H>(label: L, handler: H) -> Self
    where
        L: Into<String>,
        H: FnMut(&T) -> Disposition + Send + 'static,
    {
        let label: Arc<str> = Arc::from(label.into());
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(false));

        let task = OrdererTask {
            label: Arc::clone(&label),
            receiver,
            backlog: VecDeque::new(),
            handler,
            pending: Arc::clone(&pending),
            running: Arc::clone(&running),
        };
        tokio::spawn(task.run());

        Self {
            label,
            sender,
            pending,
            running,
        }
    }
}

impl<T> OperationOrderer<T> {
    /// Append an item to the backlog
    ///
    /// Returns `false` if the orderer has shut down.
    pub fn add(&self, item: T) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(OrdererMessage::Submit(item)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Begin (or resume) processing the backlog
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        let _ = self.sender.send(OrdererMessage::Start);
    }

    /// Stop processing after the item currently being handled
    ///
    /// Takes effect immediately, including when called from inside the handler.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Re-attempt a deferred head item
    pub fn wake(&self) {
        let _ = self.sender.send(OrdererMessage::Wake);
    }

    /// Terminate the orderer task, dropping any backlog
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.sender.send(OrdererMessage::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Items submitted and not yet consumed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

// ----------------------------------------------------------------------------
// Orderer Task
// ----------------------------------------------------------------------------

struct OrdererTask<T, H> {
    label: Arc<str>,
    receiver: mpsc::UnboundedReceiver<OrdererMessage<T>>,
    backlog: VecDeque<T>,
    handler: H,
    pending: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl<T, H> OrdererTask<T, H>
where
    H: FnMut(&T) -> Disposition,
{
    async fn run(mut self) {
        debug!("Orderer {} started", self.label);

        while let Some(message) = self.receiver.recv().await {
            match message {
                OrdererMessage::Submit(item) => self.backlog.push_back(item),
                OrdererMessage::Start | OrdererMessage::Wake => {}
                OrdererMessage::Shutdown => break,
            }
            self.drain();
        }

        self.receiver.close();
        let mut dropped = self.backlog.len();
        while let Ok(message) = self.receiver.try_recv() {
            if let OrdererMessage::Submit(_) = message {
                dropped += 1;
            }
        }
        self.pending.fetch_sub(dropped, Ordering::AcqRel);
        debug!(
            "Orderer {} stopped with {} unprocessed item(s)",
            self.label, dropped
        );
    }

    fn drain(&mut self) {
        while self.running.load(Ordering::Acquire) {
            let Some(head) = self.backlog.front() else {
                break;
            };

            match (self.handler)(head) {
                Disposition::Consumed => {
                    self.backlog.pop_front();
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                }
                Disposition::Deferred => {
                    trace!(
                        "Orderer {} blocked on head with {} item(s) waiting",
                        self.label,
                        self.backlog.len()
                    );
                    break;
                }
            }
        }
    }
}
