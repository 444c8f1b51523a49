//! Extension contract
//!
//! An extension is an independently developed unit of business logic. It is
//! identified by a stable name, reacts to events through listeners registered
//! with its [`ExtensionApi`], and talks to the rest of the system only through
//! the hub: dispatching events, publishing its own shared state and reading
//! other extensions' shared state.

use crate::hub::{EventHub, HubInner, SharedStateResolver};
use crate::orderer::OperationOrderer;
use hubkit_core::{
    Event, EventData, EventSource, EventType, HubError, HubResult, SharedStateResult,
};
use smallvec::SmallVec;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::error;

// ----------------------------------------------------------------------------
// Extension Trait
// ----------------------------------------------------------------------------

/// A unit of business logic hosted by the event hub
pub trait Extension: Send + Sized + 'static {
    /// Unique name the extension is registered and publishes shared state under
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Called once, before the extension receives any event
    ///
    /// Listeners are registered here. An error aborts the registration.
    fn on_registered(&mut self, api: &mut ExtensionApi<Self>) -> HubResult<()>;

    /// Called when the extension is unregistered or the hub shuts down
    fn on_unregistered(&mut self, _runtime: &ExtensionRuntime) {}

    /// Readiness gate evaluated before listeners run
    ///
    /// Returning `false` keeps the event at the head of this extension's backlog;
    /// it is re-checked on the next event delivered to the extension.
    fn ready_for_event(&mut self, _event: &Event, _runtime: &ExtensionRuntime) -> bool {
        true
    }
}

// ----------------------------------------------------------------------------
// Listeners
// ----------------------------------------------------------------------------

type ListenerCallback<E> = Box<dyn FnMut(&mut E, &Event, &mut ExtensionApi<E>) + Send>;

struct ListenerEntry<E> {
    event_type: EventType,
    source: EventSource,
    callback: ListenerCallback<E>,
}

impl<E> ListenerEntry<E> {
    fn matches(&self, event: &Event) -> bool {
        (self.event_type.is_wildcard() || self.event_type == *event.event_type())
            && (self.source.is_wildcard() || self.source == *event.source())
    }
}

// ----------------------------------------------------------------------------
// Extension API
// ----------------------------------------------------------------------------

/// Per-extension listener registry plus access to the hub
///
/// Dereferences to [`ExtensionRuntime`] for dispatch and shared state access.
pub struct ExtensionApi<E> {
    runtime: ExtensionRuntime,
    listeners: SmallVec<[ListenerEntry<E>; 4]>,
}

impl<E> ExtensionApi<E> {
    pub(crate) fn new(runtime: ExtensionRuntime) -> Self {
        Self {
            runtime,
            listeners: SmallVec::new(),
        }
    }

    /// Listen for events with an exact type and source
    ///
    /// Either side may be the corresponding `WILDCARD` constant.
    pub fn register_listener<F>(&mut self, event_type: EventType, source: EventSource, listener: F)
    where
        F: FnMut(&mut E, &Event, &mut ExtensionApi<E>) + Send + 'static,
    {
        self.listeners.push(ListenerEntry {
            event_type,
            source,
            callback: Box::new(listener),
        });
    }

    /// Listen for every event
    pub fn register_wildcard_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&mut E, &Event, &mut ExtensionApi<E>) + Send + 'static,
    {
        self.register_listener(EventType::WILDCARD, EventSource::WILDCARD, listener);
    }

    pub fn runtime(&self) -> &ExtensionRuntime {
        &self.runtime
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invoke every matching listener in registration order
    ///
    /// A panicking listener is logged and skipped. Listeners registered while
    /// notifying run from the next event on.
    pub(crate) fn notify_listeners(&mut self, extension: &mut E, event: &Event) {
        let mut listeners = std::mem::take(&mut self.listeners);

        for entry in listeners.iter_mut().filter(|entry| entry.matches(event)) {
            let callback = &mut entry.callback;
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(extension, event, self)));
            if outcome.is_err() {
                error!(
                    "Listener of {} panicked while handling {}",
                    self.runtime.name(),
                    event
                );
            }
        }

        listeners.extend(self.listeners.drain(..));
        self.listeners = listeners;
    }
}

impl<E> Deref for ExtensionApi<E> {
    type Target = ExtensionRuntime;

    fn deref(&self) -> &ExtensionRuntime {
        &self.runtime
    }
}

// ----------------------------------------------------------------------------
// Extension Runtime
// ----------------------------------------------------------------------------

/// An extension's handle to the hub
///
/// Cheap to clone; clones may be moved into response listeners or background
/// tasks. Every operation fails with `HubError::HubUnavailable` once the hub has
/// been dropped.
#[derive(Clone)]
pub struct ExtensionRuntime {
    name: Arc<str>,
    hub: Weak<HubInner>,
    orderer: OperationOrderer<Arc<Event>>,
}

impl ExtensionRuntime {
    pub(crate) fn new(
        name: Arc<str>,
        hub: Weak<HubInner>,
        orderer: OperationOrderer<Arc<Event>>,
    ) -> Self {
        Self { name, hub, orderer }
    }

    /// Name of the extension this runtime belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hub, if it is still alive
    pub fn hub(&self) -> Option<EventHub> {
        self.hub.upgrade().map(EventHub::from_inner)
    }

    fn require_hub(&self) -> HubResult<EventHub> {
        self.hub().ok_or(HubError::HubUnavailable)
    }

    pub fn dispatch(&self, event: Event) -> HubResult<Arc<Event>> {
        Ok(self.require_hub()?.dispatch(event))
    }

    /// Publish this extension's shared state as of `event`
    pub fn create_shared_state(
        &self,
        data: Option<EventData>,
        event: Option<&Event>,
    ) -> HubResult<()> {
        self.require_hub()?
            .create_shared_state(&self.name, data, event)
    }

    /// Reserve this extension's shared state slot as of `event`
    pub fn create_pending_shared_state(
        &self,
        event: Option<&Event>,
    ) -> HubResult<SharedStateResolver> {
        self.require_hub()?
            .create_pending_shared_state(&self.name, event)
    }

    /// Read another extension's shared state as of `event`
    pub fn get_shared_state(
        &self,
        owner: &str,
        event: Option<&Event>,
    ) -> HubResult<Option<SharedStateResult>> {
        Ok(self.require_hub()?.get_shared_state(owner, event))
    }

    pub fn register_response_listener<F>(
        &self,
        trigger: &Event,
        timeout: Duration,
        listener: F,
    ) -> HubResult<()>
    where
        F: FnOnce(Option<Arc<Event>>) + Send + 'static,
    {
        self.require_hub()?
            .register_response_listener(trigger, timeout, listener);
        Ok(())
    }

    /// Resume delivering events to this extension
    pub fn start_events(&self) {
        self.orderer.start();
    }

    /// Pause delivery; events keep accumulating in order
    pub fn stop_events(&self) {
        self.orderer.stop();
    }
}

impl std::fmt::Debug for ExtensionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRuntime")
            .field("name", &self.name)
            .field("hub_alive", &(self.hub.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, source: EventSource) -> Event {
        Event::new("test", event_type, source, None)
    }

    fn entry(event_type: EventType, source: EventSource) -> ListenerEntry<()> {
        ListenerEntry {
            event_type,
            source,
            callback: Box::new(|_, _, _| {}),
        }
    }

    #[test]
    fn test_listener_matching() {
        let exact = entry(EventType::HUB, EventSource::SHARED_STATE);
        assert!(exact.matches(&event(EventType::HUB, EventSource::SHARED_STATE)));
        assert!(!exact.matches(&event(EventType::HUB, EventSource::BOOTED)));
        assert!(!exact.matches(&event(EventType::ANALYTICS, EventSource::SHARED_STATE)));

        let wildcard = entry(EventType::WILDCARD, EventSource::WILDCARD);
        assert!(wildcard.matches(&event(EventType::IDENTITY, EventSource::REQUEST_IDENTITY)));

        let any_source = entry(EventType::HUB, EventSource::WILDCARD);
        assert!(any_source.matches(&event(EventType::HUB, EventSource::BOOTED)));
        assert!(!any_source.matches(&event(EventType::LIFECYCLE, EventSource::BOOTED)));
    }
}
