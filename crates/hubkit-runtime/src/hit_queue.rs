//! Hit Queue Engine
//!
//! Drives a durable [`DataQueue`] through a [`HitProcessor`], one hit at a time.
//! The engine runs on its own tokio task and owns the data queue outright; every
//! operation, including completion of the in-flight hit, is a message to that
//! task, so head removal is never raced.
//!
//! The head is removed only after the processor reports `Completed`, and only
//! if the head is still the hit that was processed. A `Retry` leaves the head in
//! place and halts until `queue`, `begin_processing` or the retry timer
//! re-triggers processing.

use hubkit_core::{DataEntity, DataQueue, HitProcessor, HitQueueConfig, HitResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

// ----------------------------------------------------------------------------
// Public Types
// ----------------------------------------------------------------------------

/// A completed hit with the response the processor returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitResponse {
    pub entity: DataEntity,
    pub response: Option<Vec<u8>>,
}

/// Snapshot of an engine's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HitQueueStats {
    pub queued: usize,
    pub running: bool,
    pub in_flight: bool,
    /// Hits removed after a `Completed` result
    pub completed: u64,
    /// `Retry` results observed
    pub retries: u64,
}

// ----------------------------------------------------------------------------
// Engine Messages
// ----------------------------------------------------------------------------

enum HitQueueCommand {
    Queue {
        entity: DataEntity,
        reply: Option<oneshot::Sender<bool>>,
    },
    BeginProcessing,
    Suspend,
    Clear {
        reply: oneshot::Sender<bool>,
    },
    Peek {
        reply: oneshot::Sender<Option<DataEntity>>,
    },
    Stats {
        reply: oneshot::Sender<HitQueueStats>,
    },
    Shutdown,
}

enum EngineSignal {
    Completed {
        entity: DataEntity,
        result: HitResult,
    },
    RetryElapsed,
}

// ----------------------------------------------------------------------------
// Hit Queue Handle
// ----------------------------------------------------------------------------

/// Handle to a hit queue engine
///
/// Cheap to clone. The engine exits when `shutdown` is called or every handle
/// has been dropped. A new engine starts suspended.
#[derive(Clone)]
pub struct HitQueue {
    label: Arc<str>,
    sender: mpsc::UnboundedSender<HitQueueCommand>,
}

impl HitQueue {
    /// Spawn an engine over `data_queue`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<Q>(
        label: &str,
        data_queue: Q,
        processor: Arc<dyn HitProcessor>,
        config: &HitQueueConfig,
    ) -> Self
    where
        Q: DataQueue + 'static,
    {
        Self::spawn_inner(label, Box::new(data_queue), processor, config, None)
    }

    /// Spawn an engine that also reports every completed hit
    pub fn spawn_with_responses<Q>(
        label: &str,
        data_queue: Q,
        processor: Arc<dyn HitProcessor>,
        config: &HitQueueConfig,
    ) -> (Self, mpsc::UnboundedReceiver<HitResponse>)
    where
        Q: DataQueue + 'static,
    {
        let (responses, receiver) = mpsc::unbounded_channel();
        let queue = Self::spawn_inner(
            label,
            Box::new(data_queue),
            processor,
            config,
            Some(responses),
        );
        (queue, receiver)
    }

    fn spawn_inner(
        label: &str,
        data_queue: Box<dyn DataQueue>,
        processor: Arc<dyn HitProcessor>,
        config: &HitQueueConfig,
        responses: Option<mpsc::UnboundedSender<HitResponse>>,
    ) -> Self {
        let label: Arc<str> = Arc::from(label);
        let (sender, commands) = mpsc::unbounded_channel();
        let (signal_sender, signals) = mpsc::unbounded_channel();
        let retry_interval = config.retry_interval().or_else(|| processor.retry_interval());

        let engine = HitQueueEngine {
            label: Arc::clone(&label),
            data_queue,
            processor,
            retry_interval,
            responses,
            commands,
            signals,
            signal_sender,
            running: false,
            in_flight: None,
            retry_timer: None,
            completed: 0,
            retries: 0,
        };
        tokio::spawn(engine.run());

        Self { label, sender }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Durably append a hit
    ///
    /// Resolves to whether the append succeeded. Triggers processing unless the
    /// engine is suspended.
    pub async fn queue(&self, entity: DataEntity) -> bool {
        let (reply, response) = oneshot::channel();
        if !self.send(HitQueueCommand::Queue {
            entity,
            reply: Some(reply),
        }) {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Append a hit without waiting for the result
    ///
    /// For synchronous callers such as extension listeners; ordering with other
    /// operations on this handle is preserved.
    pub fn submit(&self, entity: DataEntity) -> bool {
        self.send(HitQueueCommand::Queue {
            entity,
            reply: None,
        })
    }

    pub fn begin_processing(&self) {
        self.send(HitQueueCommand::BeginProcessing);
    }

    /// Stop pulling new hits; an in-flight hit still completes
    pub fn suspend(&self) {
        self.send(HitQueueCommand::Suspend);
    }

    /// Remove every queued hit
    pub async fn clear(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if !self.send(HitQueueCommand::Clear { reply }) {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// The head hit, if any
    pub async fn peek(&self) -> Option<DataEntity> {
        let (reply, response) = oneshot::channel();
        if !self.send(HitQueueCommand::Peek { reply }) {
            return None;
        }
        response.await.ok().flatten()
    }

    /// Number of queued hits, including one in flight
    pub async fn count(&self) -> usize {
        self.stats().await.map(|stats| stats.queued).unwrap_or(0)
    }

    pub async fn stats(&self) -> Option<HitQueueStats> {
        let (reply, response) = oneshot::channel();
        if !self.send(HitQueueCommand::Stats { reply }) {
            return None;
        }
        response.await.ok()
    }

    /// Stop the engine; queued hits stay in the data queue
    pub fn shutdown(&self) {
        self.send(HitQueueCommand::Shutdown);
    }

    fn send(&self, command: HitQueueCommand) -> bool {
        if self.sender.send(command).is_err() {
            debug!("Hit queue {} is shut down", self.label);
            return false;
        }
        true
    }
}

impl std::fmt::Debug for HitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitQueue")
            .field("label", &self.label)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Hit Queue Engine
// ----------------------------------------------------------------------------

struct HitQueueEngine {
    label: Arc<str>,
    data_queue: Box<dyn DataQueue>,
    processor: Arc<dyn HitProcessor>,
    retry_interval: Option<Duration>,
    responses: Option<mpsc::UnboundedSender<HitResponse>>,
    commands: mpsc::UnboundedReceiver<HitQueueCommand>,
    signals: mpsc::UnboundedReceiver<EngineSignal>,
    signal_sender: mpsc::UnboundedSender<EngineSignal>,
    running: bool,
    /// Identifier of the hit currently being processed
    in_flight: Option<String>,
    retry_timer: Option<JoinHandle<()>>,
    completed: u64,
    retries: u64,
}

impl HitQueueEngine {
    async fn run(mut self) {
        debug!("Hit queue {} started", self.label);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(HitQueueCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(signal) = self.signals.recv() => self.handle_signal(signal),
            }
        }

        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        info!("Hit queue {} stopped", self.label);
    }

    fn handle_command(&mut self, command: HitQueueCommand) {
        match command {
            HitQueueCommand::Queue { entity, reply } => {
                let id = entity.unique_identifier.clone();
                let added = match self.data_queue.add(entity) {
                    Ok(()) => true,
                    Err(err) => {
                        error!("Hit queue {} failed to persist {}: {}", self.label, id, err);
                        false
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(added);
                }
                if added {
                    trace!("Hit {} queued on {}", id, self.label);
                    self.process_next();
                }
            }
            HitQueueCommand::BeginProcessing => {
                self.running = true;
                self.process_next();
            }
            HitQueueCommand::Suspend => {
                self.running = false;
            }
            HitQueueCommand::Clear { reply } => {
                let cleared = match self.data_queue.clear() {
                    Ok(()) => true,
                    Err(err) => {
                        error!("Hit queue {} failed to clear: {}", self.label, err);
                        false
                    }
                };
                debug!("Hit queue {} cleared", self.label);
                let _ = reply.send(cleared);
            }
            HitQueueCommand::Peek { reply } => {
                let head = self.data_queue.peek().unwrap_or_else(|err| {
                    warn!("Hit queue {} failed to read head: {}", self.label, err);
                    None
                });
                let _ = reply.send(head);
            }
            HitQueueCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            HitQueueCommand::Shutdown => {}
        }
    }

    fn handle_signal(&mut self, signal: EngineSignal) {
        match signal {
            EngineSignal::Completed { entity, result } => self.on_completed(entity, result),
            EngineSignal::RetryElapsed => {
                self.retry_timer = None;
                trace!("Retry interval elapsed on {}", self.label);
                self.process_next();
            }
        }
    }

    /// Hand the head to the processor if running and nothing is in flight
    fn process_next(&mut self) {
        if !self.running || self.in_flight.is_some() {
            return;
        }

        let entity = match self.data_queue.peek() {
            Ok(Some(entity)) => entity,
            Ok(None) => return,
            Err(err) => {
                warn!("Hit queue {} failed to read head: {}", self.label, err);
                return;
            }
        };

        trace!("Processing hit {} on {}", entity.unique_identifier, self.label);
        self.in_flight = Some(entity.unique_identifier.clone());

        let processor = Arc::clone(&self.processor);
        let signals = self.signal_sender.clone();
        tokio::spawn(async move {
            let hit = entity.clone();
            let result = tokio::spawn(async move { processor.process_hit(&hit).await })
                .await
                .unwrap_or_else(|err| {
                    error!("Hit processor failed on {}: {}", entity.unique_identifier, err);
                    HitResult::Retry
                });
            let _ = signals.send(EngineSignal::Completed { entity, result });
        });
    }

    fn on_completed(&mut self, entity: DataEntity, result: HitResult) {
        self.in_flight = None;

        match result {
            HitResult::Completed { response } => {
                self.completed += 1;
                self.remove_head(&entity);
                if let Some(responses) = &self.responses {
                    let _ = responses.send(HitResponse { entity, response });
                }
                self.process_next();
            }
            HitResult::Retry => {
                self.retries += 1;
                debug!(
                    "Hit {} on {} will be retried",
                    entity.unique_identifier, self.label
                );
                self.schedule_retry();
            }
        }
    }

    /// Remove the head only if it is still `entity`
    fn remove_head(&mut self, entity: &DataEntity) {
        match self.data_queue.peek() {
            Ok(Some(head)) if head.unique_identifier == entity.unique_identifier => {
                if let Err(err) = self.data_queue.remove() {
                    error!(
                        "Hit queue {} failed to remove {}: {}",
                        self.label, entity.unique_identifier, err
                    );
                }
            }
            Ok(_) => debug!(
                "Hit {} no longer at head of {}; queue was cleared",
                entity.unique_identifier, self.label
            ),
            Err(err) => warn!("Hit queue {} failed to read head: {}", self.label, err),
        }
    }

    fn schedule_retry(&mut self) {
        let Some(interval) = self.retry_interval else {
            return;
        };
        if self.retry_timer.is_some() {
            return;
        }

        let signals = self.signal_sender.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = signals.send(EngineSignal::RetryElapsed);
        }));
    }

    fn stats(&self) -> HitQueueStats {
        HitQueueStats {
            queued: self.data_queue.count().unwrap_or(0),
            running: self.running,
            in_flight: self.in_flight.is_some(),
            completed: self.completed,
            retries: self.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hubkit_core::MemoryDataQueue;

    struct EchoProcessor;

    #[async_trait]
    impl HitProcessor for EchoProcessor {
        async fn process_hit(&self, entity: &DataEntity) -> HitResult {
            HitResult::Completed {
                response: entity.data.clone(),
            }
        }
    }

    #[tokio::test]
    async fn test_engine_starts_suspended() {
        let queue = HitQueue::spawn(
            "suspended",
            MemoryDataQueue::new(),
            Arc::new(EchoProcessor),
            &HitQueueConfig::default(),
        );

        assert!(queue.queue(DataEntity::with_payload("a")).await);
        assert!(queue.queue(DataEntity::with_payload("b")).await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queued, 2);
        assert!(!stats.running);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_responses_are_reported_in_order() {
        let (queue, mut responses) = HitQueue::spawn_with_responses(
            "echo",
            MemoryDataQueue::new(),
            Arc::new(EchoProcessor),
            &HitQueueConfig::default(),
        );
        queue.submit(DataEntity::with_payload("one"));
        queue.submit(DataEntity::with_payload("two"));
        queue.begin_processing();

        let first = responses.recv().await.unwrap();
        let second = responses.recv().await.unwrap();
        assert_eq!(first.response, Some(b"one".to_vec()));
        assert_eq!(second.response, Some(b"two".to_vec()));
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_handle_reports_failure_after_shutdown() {
        let queue = HitQueue::spawn(
            "closed",
            MemoryDataQueue::new(),
            Arc::new(EchoProcessor),
            &HitQueueConfig::default(),
        );
        queue.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!queue.queue(DataEntity::with_payload("late")).await);
        assert_eq!(queue.stats().await, None);
    }
}
