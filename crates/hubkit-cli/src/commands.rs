//! Command handlers for the hubkit CLI

use hubkit_core::{DataEntity, DataQueue, FileDataQueue};
use hubkit_runtime::{HitQueue, HubBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands, QueueAction};
use crate::config::AppConfig;
use crate::demo::{track_event, AnalyticsExtension, ConfigurationExtension, SimulatedProcessor};
use crate::error::{CliError, Result};

/// Retry interval of the simulated processor when the config sets none
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// Outcome of one demo run
#[derive(Debug, Clone, Serialize)]
pub struct DemoSummary {
    pub queue_dir: PathBuf,
    /// Hits left over from an earlier run
    pub backlog: usize,
    pub dispatched: usize,
    pub completed: u64,
    pub retries: u64,
    /// Hits still queued when the demo stopped waiting
    pub remaining: usize,
    pub elapsed_ms: u128,
}

/// Contents of a queue directory
#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub queue_dir: PathBuf,
    pub count: usize,
    pub head: Option<DataEntity>,
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Demo {
                events,
                queue_dir,
                fail_first,
            } => {
                let events = events.unwrap_or(config.demo.events);
                let queue_dir = config.queue_dir(queue_dir.as_deref());
                let summary = run_demo(&config, events, &queue_dir, fail_first).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            Commands::Queue { action } => match action {
                QueueAction::Inspect { dir } => {
                    let report = inspect_queue(&dir)?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                QueueAction::Clear { dir } => {
                    let cleared = clear_queue(&dir)?;
                    println!("Cleared {} hit(s) from {}", cleared, dir.display());
                    Ok(())
                }
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Demo
// ----------------------------------------------------------------------------

/// Boot the demo hub, dispatch `events` track events and wait for their hits
///
/// Hits left in `queue_dir` by an earlier run are sent first.
pub async fn run_demo(
    config: &AppConfig,
    events: usize,
    queue_dir: &Path,
    fail_first: usize,
) -> Result<DemoSummary> {
    let started = Instant::now();
    let storage = FileDataQueue::open(queue_dir)?;
    let processor = Arc::new(SimulatedProcessor::new(
        fail_first,
        Duration::from_millis(config.demo.processor_latency_ms),
        config
            .hub
            .hit_queue
            .retry_interval()
            .unwrap_or(DEFAULT_RETRY_INTERVAL),
    ));
    let (hit_queue, mut responses) =
        HitQueue::spawn_with_responses("analytics", storage, processor, &config.hub.hit_queue);
    let backlog = hit_queue.count().await;

    let (hub, report) = HubBuilder::new()
        .with_config(config.hub.clone())
        .with_extension(ConfigurationExtension::new(
            &config.demo.server,
            Duration::from_millis(config.demo.configuration_delay_ms),
        ))
        .with_extension(AnalyticsExtension::new(hit_queue.clone()))
        .build_and_start()
        .await?;
    if let Some((name, err)) = report.failed.into_iter().next() {
        hit_queue.shutdown();
        return Err(CliError::Demo(format!("{} failed to register: {}", name, err)));
    }

    info!("Dispatching {} track event(s); {} hit(s) in backlog", events, backlog);
    for index in 0..events {
        hub.dispatch(track_event(&format!("action-{}", index)));
    }

    let expected = backlog + events;
    let mut received = 0;
    let wait = tokio::time::timeout(
        Duration::from_millis(config.demo.completion_timeout_ms),
        async {
            while received < expected {
                match responses.recv().await {
                    Some(response) => {
                        received += 1;
                        debug!(
                            "Hit {} completed ({}/{})",
                            response.entity.unique_identifier, received, expected
                        );
                    }
                    None => break,
                }
            }
        },
    )
    .await;
    if wait.is_err() {
        warn!("Timed out with {}/{} hit(s) completed", received, expected);
    }

    let stats = hit_queue.stats().await.unwrap_or_default();
    hub.shutdown().await;
    hit_queue.shutdown();

    Ok(DemoSummary {
        queue_dir: queue_dir.to_path_buf(),
        backlog,
        dispatched: events,
        completed: stats.completed,
        retries: stats.retries,
        remaining: stats.queued,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

// ----------------------------------------------------------------------------
// Queue Maintenance
// ----------------------------------------------------------------------------

pub fn inspect_queue(dir: &Path) -> Result<QueueReport> {
    let mut queue = FileDataQueue::open(dir)?;
    Ok(QueueReport {
        queue_dir: dir.to_path_buf(),
        count: queue.count()?,
        head: queue.peek()?,
    })
}

/// Remove every hit in `dir`, returning how many there were
pub fn clear_queue(dir: &Path) -> Result<usize> {
    let mut queue = FileDataQueue::open(dir)?;
    let count = queue.count()?;
    queue.clear()?;
    info!("Cleared {} hit(s) from {}", count, dir.display());
    Ok(count)
}
