//! Event Hub
//!
//! The hub owns the global event order. Dispatching an event assigns the next
//! sequence number and appends the event to every registered container's
//! backlog while holding the hub state lock, so every container observes the
//! same relative order. Before `start()` events are held, with their sequence
//! numbers, and delivered in order when the hub starts.
//!
//! The hub also mediates shared state (versioned by sequence number) and
//! one-shot response listeners.

use crate::container::{ContainerHandle, ExtensionContainer};
use crate::extension::Extension;
use crate::managers::{ResponseListenerRegistry, SharedStateStore};
use hubkit_core::{
    Event, EventData, EventSource, EventType, HubConfig, HubError, HubResult, SharedStateResult,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

// ----------------------------------------------------------------------------
// Hub State
// ----------------------------------------------------------------------------

struct HubState {
    next_sequence: u64,
    started: bool,
    /// Events dispatched before start, in dispatch order
    held_events: Vec<Arc<Event>>,
    containers: HashMap<String, Arc<dyn ContainerHandle>>,
}

impl HubState {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            started: false,
            held_events: Vec::new(),
            containers: HashMap::new(),
        }
    }

    fn next_sequence_number(&mut self) -> u64 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        sequence_number
    }

    /// Version for a shared state write by `owner` as of `event`
    ///
    /// A dispatched event gives its own sequence number. Otherwise an extension
    /// that has processed events past its latest version writes at the last
    /// event it processed. Every other write reserves a fresh sequence number,
    /// so it never takes the number of a dispatched event and never answers
    /// reads for events that came before it.
    fn version_for(&mut self, owner: &str, event: Option<&Event>, store: &SharedStateStore) -> u64 {
        if let Some(version) = event.and_then(Event::sequence_number) {
            return version;
        }

        let processed = self.containers.get(owner).map(|container| container.last_processed());
        match (processed, store.latest_version(owner)) {
            (Some(processed), None) => processed,
            (Some(processed), Some(latest)) if latest < processed => processed,
            _ => self.next_sequence_number(),
        }
    }
}

pub(crate) struct HubInner {
    config: HubConfig,
    state: Mutex<HubState>,
    shared_states: SharedStateStore,
    responses: Arc<ResponseListenerRegistry>,
}

impl HubInner {
    fn lock_state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        let state = self.lock_state();
        for container in state.containers.values() {
            container.shutdown();
        }
    }
}

// ----------------------------------------------------------------------------
// Event Hub
// ----------------------------------------------------------------------------

/// The event dispatcher and shared state mediator
///
/// Cheap to clone; all clones drive the same hub. Dropping the last clone shuts
/// down every extension's orderer.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl EventHub {
    /// Owner name of the hub's own shared state
    pub const SHARED_STATE_NAME: &'static str = "com.hubkit.module.eventhub";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                state: Mutex::new(HubState::new()),
                shared_states: SharedStateStore::new(),
                responses: Arc::new(ResponseListenerRegistry::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HubInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock_state().started
    }

    // ------------------------------------------------------------------------
    // Extension lifecycle
    // ------------------------------------------------------------------------

    /// Register an extension
    ///
    /// Resolves once `on_registered` has run and the extension's orderer is
    /// started. Fails with `DuplicateExtension` if the name is taken, leaving the
    /// registered instance untouched.
    pub async fn register_extension<E: Extension>(&self, extension: E) -> HubResult<()> {
        let name = extension.name().to_string();
        let version = extension.version().to_string();
        if name.trim().is_empty() {
            return Err(HubError::InvalidExtensionName);
        }

        let (container, runtime) = {
            let mut state = self.inner.lock_state();
            if state.containers.contains_key(&name) {
                warn!("Rejected duplicate registration of {}", name);
                return Err(HubError::duplicate_extension(name));
            }

            let (container, runtime) =
                ExtensionContainer::<E>::new(&name, &version, Arc::downgrade(&self.inner));
            let container = Arc::new(container);
            state
                .containers
                .insert(name.clone(), Arc::clone(&container) as Arc<dyn ContainerHandle>);
            (container, runtime)
        };

        let installer = Arc::clone(&container);
        let installed =
            match tokio::task::spawn_blocking(move || installer.install(extension, runtime)).await
            {
                Ok(result) => result,
                Err(join_error) => Err(HubError::Registration {
                    name: name.clone(),
                    reason: if join_error.is_panic() {
                        "on_registered panicked".to_string()
                    } else {
                        "registration task cancelled".to_string()
                    },
                }),
            };

        if let Err(err) = installed {
            self.inner.lock_state().containers.remove(&name);
            container.shutdown();
            warn!("Failed to register {}: {}", name, err);
            return Err(err);
        }

        container.start();
        info!("Extension {} ({}) registered", name, version);

        if self.is_started() {
            self.publish_hub_state();
        }
        Ok(())
    }

    /// Unregister an extension, running its `on_unregistered` hook
    pub async fn unregister_extension(&self, name: &str) -> HubResult<()> {
        let container = self
            .inner
            .lock_state()
            .containers
            .remove(name)
            .ok_or_else(|| HubError::extension_not_found(name))?;

        tokio::task::spawn_blocking(move || container.unregister())
            .await
            .map_err(|err| HubError::channel_error(format!("unregister task failed: {}", err)))?;

        info!("Extension {} unregistered", name);
        if self.is_started() {
            self.publish_hub_state();
        }
        Ok(())
    }

    /// Unregister every extension
    pub async fn shutdown(&self) {
        let containers: Vec<Arc<dyn ContainerHandle>> = self
            .inner
            .lock_state()
            .containers
            .drain()
            .map(|(_, container)| container)
            .collect();

        info!("Shutting down event hub with {} extension(s)", containers.len());
        for container in containers {
            if let Err(err) = tokio::task::spawn_blocking(move || container.unregister()).await {
                warn!("Extension unregistration failed during shutdown: {}", err);
            }
        }
    }

    /// Registered extensions as `(name, version)`, sorted by name
    pub fn registered_extensions(&self) -> Vec<(String, String)> {
        let state = self.inner.lock_state();
        let mut extensions: Vec<(String, String)> = state
            .containers
            .values()
            .map(|container| (container.name().to_string(), container.version().to_string()))
            .collect();
        extensions.sort();
        extensions
    }

    /// Events waiting in an extension's backlog
    pub fn pending_events(&self, name: &str) -> Option<usize> {
        self.inner
            .lock_state()
            .containers
            .get(name)
            .map(|container| container.pending())
    }

    /// Begin delivering events
    ///
    /// Held events are delivered first, in dispatch order. The hub then
    /// publishes its own shared state and dispatches a booted event. Calling
    /// `start` again is a no-op.
    pub fn start(&self) {
        let held = {
            let mut state = self.inner.lock_state();
            if state.started {
                debug!("Event hub already started");
                return;
            }
            state.started = true;

            let held = std::mem::take(&mut state.held_events);
            for event in &held {
                for container in state.containers.values() {
                    container.deliver(Arc::clone(event));
                }
            }
            held
        };

        info!("Event hub started; delivered {} held event(s)", held.len());
        for event in &held {
            self.inner.responses.notify(event);
        }

        self.publish_hub_state();
        self.dispatch(Event::new(
            "Event Hub Booted",
            EventType::HUB,
            EventSource::BOOTED,
            None,
        ));
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Dispatch an event to every registered extension
    ///
    /// Returns the event stamped with its sequence number.
    pub fn dispatch(&self, event: Event) -> Arc<Event> {
        let (event, delivered) = {
            let mut state = self.inner.lock_state();
            let sequence_number = state.next_sequence_number();
            let event = Arc::new(event.with_sequence_number(sequence_number));

            if state.started {
                for container in state.containers.values() {
                    container.deliver(Arc::clone(&event));
                }
            } else {
                state.held_events.push(Arc::clone(&event));
            }
            (event, state.started)
        };

        trace!("Dispatched {}", event);
        if delivered {
            self.inner.responses.notify(&event);
        }
        event
    }

    /// Dispatch an event and wait for its response
    ///
    /// Resolves to `None` if no response arrives within `timeout`, or the
    /// configured response timeout when `timeout` is `None`.
    pub async fn dispatch_with_response(
        &self,
        event: Event,
        timeout: Option<Duration>,
    ) -> Option<Arc<Event>> {
        let timeout = timeout.unwrap_or_else(|| self.inner.config.dispatch.response_timeout());
        let (sender, receiver) = oneshot::channel();
        self.register_response_listener(&event, timeout, move |response| {
            let _ = sender.send(response);
        });
        self.dispatch(event);
        receiver.await.ok().flatten()
    }

    /// Register a one-shot listener for the response to `trigger`
    ///
    /// Invoked exactly once: with the first dispatched event whose triggering
    /// event id is `trigger`'s id, or with `None` after `timeout`.
    pub fn register_response_listener<F>(&self, trigger: &Event, timeout: Duration, listener: F)
    where
        F: FnOnce(Option<Arc<Event>>) + Send + 'static,
    {
        self.inner
            .responses
            .register(trigger.id(), timeout, listener);
    }

    // ------------------------------------------------------------------------
    // Shared State
    // ------------------------------------------------------------------------

    /// Publish `owner`'s shared state as of `event`
    ///
    /// The version is the event's sequence number. When `event` is `None` or
    /// has not been dispatched, an extension writes at the last event it
    /// processed unless it already published there; otherwise the write takes
    /// a fresh sequence number. Dispatches a shared-state change event on
    /// success.
    pub fn create_shared_state(
        &self,
        owner: &str,
        data: Option<EventData>,
        event: Option<&Event>,
    ) -> HubResult<()> {
        let version = {
            let mut state = self.inner.lock_state();
            let version = state.version_for(owner, event, &self.inner.shared_states);
            self.inner.shared_states.create(owner, version, data)?;
            version
        };

        debug!("Shared state of {} published at version {}", owner, version);
        self.dispatch(Event::shared_state_change(owner));
        Ok(())
    }

    /// Reserve `owner`'s shared state slot as of `event`
    ///
    /// Readers see the slot as pending until the returned resolver runs.
    pub fn create_pending_shared_state(
        &self,
        owner: &str,
        event: Option<&Event>,
    ) -> HubResult<SharedStateResolver> {
        let version = {
            let mut state = self.inner.lock_state();
            let version = state.version_for(owner, event, &self.inner.shared_states);
            self.inner.shared_states.create_pending(owner, version)?;
            version
        };

        debug!("Shared state of {} pending at version {}", owner, version);
        Ok(SharedStateResolver {
            hub: Arc::downgrade(&self.inner),
            owner: owner.to_string(),
            version,
        })
    }

    /// `owner`'s shared state as of `event`, or the latest for `None`
    ///
    /// Returns `None` if `owner` never published.
    pub fn get_shared_state(&self, owner: &str, event: Option<&Event>) -> Option<SharedStateResult> {
        let version = event.and_then(Event::sequence_number);
        self.inner.shared_states.get(owner, version)
    }

    fn publish_hub_state(&self) {
        let mut extensions = serde_json::Map::new();
        for (name, version) in self.registered_extensions() {
            extensions.insert(name, json!({ "version": version }));
        }

        let mut data = EventData::new();
        data.insert("version".to_string(), json!(Self::VERSION));
        data.insert("extensions".to_string(), Value::Object(extensions));

        if let Err(err) = self.create_shared_state(Self::SHARED_STATE_NAME, Some(data), None) {
            warn!("Failed to publish event hub shared state: {}", err);
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("EventHub")
            .field("started", &state.started)
            .field("next_sequence", &state.next_sequence)
            .field("extensions", &state.containers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Shared State Resolver
// ----------------------------------------------------------------------------

/// Completes a pending shared state slot
#[derive(Debug)]
pub struct SharedStateResolver {
    hub: Weak<HubInner>,
    owner: String,
    version: u64,
}

impl SharedStateResolver {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The reserved version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set the reserved slot to `data` and announce the change
    pub fn resolve(self, data: Option<EventData>) -> HubResult<()> {
        let inner = self.hub.upgrade().ok_or(HubError::HubUnavailable)?;
        inner
            .shared_states
            .resolve_pending(&self.owner, self.version, data)?;

        debug!(
            "Pending shared state of {} resolved at version {}",
            self.owner, self.version
        );
        EventHub::from_inner(inner).dispatch(Event::shared_state_change(&self.owner));
        Ok(())
    }
}
