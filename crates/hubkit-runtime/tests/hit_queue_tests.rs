//! Hit queue integration tests
//!
//! Exercises the engine against scripted processors: one hit in flight, retry
//! keeps the head, suspension, clearing and persistence across restarts.


use async_trait::async_trait;
use hubkit_runtime::{
    DataEntity, FileDataQueue, HitProcessor, HitQueue, HitQueueConfig, HitResult, MemoryDataQueue,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use test_utils::{init_tracing, wait_until};

/// Plays back a script of results, then completes every hit
struct ScriptedProcessor {
    script: Mutex<VecDeque<HitResult>>,
    attempts: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Duration,
    retry_interval: Option<Duration>,
}

impl ScriptedProcessor {
    fn new(script: Vec<HitResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
            retry_interval: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HitProcessor for ScriptedProcessor {
    fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval
    }

    async fn process_hit(&self, entity: &DataEntity) -> HitResult {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.attempts
            .lock()
            .unwrap()
            .push(entity.unique_identifier.clone());

        tokio::time::sleep(self.delay).await;

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(HitResult::Completed { response: None });
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn hits(count: usize) -> Vec<DataEntity> {
    (0..count)
        .map(|i| DataEntity::with_payload(format!("hit-{}", i)))
        .collect()
}

#[tokio::test]
async fn test_retry_keeps_head_until_processing_resumes() {
    init_tracing();
    let processor = Arc::new(
        ScriptedProcessor::new(vec![HitResult::Retry]).with_delay(Duration::from_millis(30)),
    );
    let (queue, mut responses) = HitQueue::spawn_with_responses(
        "retry",
        MemoryDataQueue::new(),
        processor.clone(),
        &HitQueueConfig::default(),
    );

    let hits = hits(3);
    for hit in &hits {
        assert!(queue.queue(hit.clone()).await);
    }
    queue.begin_processing();

    wait_until(|| processor.attempts().len() == 1).await;
    assert!(wait_for_retries(&queue, 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Without a retry interval the engine waits for the next trigger
    assert_eq!(processor.attempts().len(), 1);
    assert_eq!(queue.count().await, 3);
    assert_eq!(queue.peek().await, Some(hits[0].clone()));

    queue.begin_processing();
    let first = responses.recv().await.unwrap();
    assert_eq!(first.entity, hits[0]);
    assert_eq!(queue.count().await, 2);

    assert!(wait_for_count(&queue, 0).await);
    let attempts = processor.attempts();
    assert_eq!(attempts[0], hits[0].unique_identifier);
    assert_eq!(attempts[1], hits[0].unique_identifier);
    assert_eq!(attempts[2], hits[1].unique_identifier);
    assert_eq!(attempts[3], hits[2].unique_identifier);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.retries, 1);
}

async fn wait_for_retries(queue: &HitQueue, expected: u64) -> bool {
    for _ in 0..200 {
        if queue.stats().await.map_or(false, |stats| stats.retries == expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

async fn wait_for_count(queue: &HitQueue, expected: usize) -> bool {
    for _ in 0..200 {
        if queue.count().await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_at_most_one_hit_in_flight() {
    let processor = Arc::new(
        ScriptedProcessor::new(vec![HitResult::Retry, HitResult::Retry])
            .with_delay(Duration::from_millis(5))
            .with_retry_interval(Duration::from_millis(10)),
    );
    let queue = HitQueue::spawn(
        "serial",
        MemoryDataQueue::new(),
        processor.clone(),
        &HitQueueConfig::default(),
    );
    queue.begin_processing();

    for hit in hits(10) {
        assert!(queue.queue(hit).await);
        queue.begin_processing();
    }

    assert!(wait_for_count(&queue, 0).await);
    assert_eq!(processor.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(processor.attempts().len(), 12);
}

#[tokio::test]
async fn test_retry_timer_resumes_processing() {
    let processor = Arc::new(ScriptedProcessor::new(vec![HitResult::Retry, HitResult::Retry]));
    let config = HitQueueConfig {
        retry_interval_ms: Some(20),
        ..HitQueueConfig::default()
    };
    let queue = HitQueue::spawn("timer", MemoryDataQueue::new(), processor.clone(), &config);
    let hit = DataEntity::with_payload("ping");
    assert!(queue.queue(hit.clone()).await);
    queue.begin_processing();

    assert!(wait_for_count(&queue, 0).await);
    assert_eq!(processor.attempts(), vec![hit.unique_identifier.clone(); 3]);
}

#[tokio::test]
async fn test_dropped_hits_are_removed() {
    let processor = Arc::new(ScriptedProcessor::new(vec![HitResult::dropped()]));
    let (queue, mut responses) = HitQueue::spawn_with_responses(
        "dropped",
        MemoryDataQueue::new(),
        processor.clone(),
        &HitQueueConfig::default(),
    );
    let hit = DataEntity::with_payload("rejected");
    queue.submit(hit.clone());
    queue.begin_processing();

    let response = responses.recv().await.unwrap();
    assert_eq!(response.entity, hit);
    assert_eq!(response.response, None);
    assert_eq!(queue.count().await, 0);
}

#[tokio::test]
async fn test_suspend_stops_pulling_new_hits() {
    let processor = Arc::new(ScriptedProcessor::new(vec![]).with_delay(Duration::from_millis(30)));
    let queue = HitQueue::spawn(
        "suspend",
        MemoryDataQueue::new(),
        processor.clone(),
        &HitQueueConfig::default(),
    );
    for hit in hits(3) {
        queue.submit(hit);
    }
    queue.begin_processing();
    wait_until(|| processor.attempts().len() == 1).await;
    queue.suspend();

    assert!(wait_for_count(&queue, 2).await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(processor.attempts().len(), 1);
    assert!(!queue.stats().await.unwrap().running);

    queue.begin_processing();
    assert!(wait_for_count(&queue, 0).await);
}

#[tokio::test]
async fn test_clear_during_flight_keeps_new_head() {
    let processor = Arc::new(ScriptedProcessor::new(vec![]).with_delay(Duration::from_millis(40)));
    let queue = HitQueue::spawn(
        "clear",
        MemoryDataQueue::new(),
        processor.clone(),
        &HitQueueConfig::default(),
    );
    let hits = hits(2);
    queue.submit(hits[0].clone());
    queue.begin_processing();
    wait_until(|| processor.attempts().len() == 1).await;

    assert!(queue.clear().await);
    queue.suspend();
    assert!(queue.queue(hits[1].clone()).await);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(queue.peek().await, Some(hits[1].clone()));
    assert_eq!(queue.count().await, 1);
}

#[tokio::test]
async fn test_unavailable_storage_rejects_hits() {
    let mut storage = MemoryDataQueue::new();
    storage.set_available(false);
    let queue = HitQueue::spawn(
        "unavailable",
        storage,
        Arc::new(ScriptedProcessor::new(vec![])),
        &HitQueueConfig::default(),
    );

    assert!(!queue.queue(DataEntity::with_payload("lost")).await);
    assert_eq!(queue.peek().await, None);
}

#[tokio::test]
async fn test_file_backed_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let hits = hits(3);

    {
        let queue = HitQueue::spawn(
            "persisted",
            FileDataQueue::open(dir.path()).unwrap(),
            Arc::new(ScriptedProcessor::new(vec![])),
            &HitQueueConfig::default(),
        );
        for hit in &hits {
            assert!(queue.queue(hit.clone()).await);
        }
        queue.shutdown();
    }

    let processor = Arc::new(ScriptedProcessor::new(vec![]));
    let (queue, mut responses) = HitQueue::spawn_with_responses(
        "persisted",
        FileDataQueue::open(dir.path()).unwrap(),
        processor.clone(),
        &HitQueueConfig::default(),
    );
    assert_eq!(queue.count().await, 3);
    queue.begin_processing();

    for hit in &hits {
        let response = responses.recv().await.unwrap();
        assert_eq!(&response.entity, hit);
    }
    assert_eq!(queue.count().await, 0);
}
