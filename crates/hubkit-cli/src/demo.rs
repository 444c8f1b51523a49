//! Demo extensions and the simulated analytics server
//!
//! The configuration extension reserves its shared state when the hub boots and
//! resolves it after a delay, as if it were downloading remote settings. The
//! analytics extension gates every track event on that state, turns each one
//! into a hit and hands it to a file-backed hit queue. The queue only starts
//! processing once the configuration is known.

use async_trait::async_trait;
use hubkit_core::{DataEntity, Event, EventData, EventSource, EventType, HitProcessor, HitResult};
use hubkit_runtime::{Extension, ExtensionApi, ExtensionRuntime, HitQueue, HubResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONFIGURATION_EXTENSION: &str = "com.hubkit.demo.configuration";
pub const ANALYTICS_EXTENSION: &str = "com.hubkit.demo.analytics";

/// Shared state key holding the analytics server
pub const SERVER_KEY: &str = "analytics.server";

/// Build a track event for the demo
pub fn track_event(action: &str) -> Event {
    let mut data = EventData::new();
    data.insert("action".to_string(), Value::String(action.to_string()));
    Event::new(
        "Track action",
        EventType::GENERIC_TRACK,
        EventSource::REQUEST_CONTENT,
        Some(data),
    )
}

// ----------------------------------------------------------------------------
// Configuration Extension
// ----------------------------------------------------------------------------

pub struct ConfigurationExtension {
    settings: EventData,
    delay: Duration,
}

impl ConfigurationExtension {
    pub fn new(server: &str, delay: Duration) -> Self {
        let mut settings = EventData::new();
        settings.insert(SERVER_KEY.to_string(), Value::String(server.to_string()));
        Self { settings, delay }
    }

    fn on_booted(&mut self, event: &Event, api: &mut ExtensionApi<Self>) {
        let resolver = match api.create_pending_shared_state(Some(event)) {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!("Failed to reserve configuration state: {}", err);
                return;
            }
        };

        let settings = self.settings.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match resolver.resolve(Some(settings)) {
                Ok(()) => info!("Configuration resolved"),
                Err(err) => warn!("Failed to resolve configuration state: {}", err),
            }
        });
    }
}

impl Extension for ConfigurationExtension {
    fn name(&self) -> &str {
        CONFIGURATION_EXTENSION
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn on_registered(&mut self, api: &mut ExtensionApi<Self>) -> HubResult<()> {
        api.register_listener(EventType::HUB, EventSource::BOOTED, Self::on_booted);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Analytics Extension
// ----------------------------------------------------------------------------

pub struct AnalyticsExtension {
    hit_queue: HitQueue,
    server: Option<String>,
}

impl AnalyticsExtension {
    pub fn new(hit_queue: HitQueue) -> Self {
        Self {
            hit_queue,
            server: None,
        }
    }

    fn on_track(&mut self, event: &Event, _api: &mut ExtensionApi<Self>) {
        let Some(server) = &self.server else {
            warn!("Dropping {}: no analytics server configured", event);
            return;
        };

        let payload = json!({
            "server": server,
            "name": event.name(),
            "sequence": event.sequence_number(),
            "timestamp": event.timestamp().as_millis(),
            "data": event.data(),
        });
        match serde_json::to_vec(&payload) {
            Ok(bytes) => {
                if !self.hit_queue.submit(DataEntity::with_payload(bytes)) {
                    warn!("Hit queue closed; dropping {}", event);
                }
            }
            Err(err) => warn!("Failed to encode hit for {}: {}", event, err),
        }
    }

    fn on_state_change(&mut self, event: &Event, api: &mut ExtensionApi<Self>) {
        if event.state_owner() != Some(CONFIGURATION_EXTENSION) {
            return;
        }
        let configured = api
            .get_shared_state(CONFIGURATION_EXTENSION, Some(event))
            .ok()
            .flatten()
            .map_or(false, |state| state.is_set());
        if configured {
            debug!("Configuration available; processing hits");
            self.hit_queue.begin_processing();
        }
    }
}

impl Extension for AnalyticsExtension {
    fn name(&self) -> &str {
        ANALYTICS_EXTENSION
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn on_registered(&mut self, api: &mut ExtensionApi<Self>) -> HubResult<()> {
        api.register_listener(EventType::GENERIC_TRACK, EventSource::WILDCARD, Self::on_track);
        api.register_listener(EventType::HUB, EventSource::SHARED_STATE, Self::on_state_change);
        Ok(())
    }

    fn on_unregistered(&mut self, _runtime: &ExtensionRuntime) {
        self.hit_queue.suspend();
    }

    /// Track events wait for the configuration that was valid when they happened
    fn ready_for_event(&mut self, event: &Event, runtime: &ExtensionRuntime) -> bool {
        if *event.event_type() != EventType::GENERIC_TRACK {
            return true;
        }

        let state = match runtime.get_shared_state(CONFIGURATION_EXTENSION, Some(event)) {
            Ok(Some(state)) if state.is_set() => state,
            _ => return false,
        };
        self.server = state
            .value
            .as_ref()
            .and_then(|settings| settings.get(SERVER_KEY))
            .and_then(Value::as_str)
            .map(str::to_string);
        true
    }
}

// ----------------------------------------------------------------------------
// Simulated Processor
// ----------------------------------------------------------------------------

/// Pretends to send hits to a server
///
/// The first `fail_first` hits are answered with 503, every later one with 200.
pub struct SimulatedProcessor {
    remaining_failures: AtomicUsize,
    latency: Duration,
    retry_interval: Duration,
}

impl SimulatedProcessor {
    pub fn new(fail_first: usize, latency: Duration, retry_interval: Duration) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(fail_first),
            latency,
            retry_interval,
        }
    }
}

#[async_trait]
impl HitProcessor for SimulatedProcessor {
    fn retry_interval(&self) -> Option<Duration> {
        Some(self.retry_interval)
    }

    async fn process_hit(&self, entity: &DataEntity) -> HitResult {
        tokio::time::sleep(self.latency).await;

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            debug!("Simulated server unavailable for {}", entity.unique_identifier);
            return HitResult::from_status_code(Some(503), None);
        }

        let body = serde_json::to_vec(&json!({ "accepted": entity.unique_identifier })).ok();
        HitResult::from_status_code(Some(200), body)
    }
}
