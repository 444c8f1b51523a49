//! Event model
//!
//! Events are immutable, sequence-numbered messages exchanged through the event
//! hub. Any component may create one; the hub stamps its sequence number when it
//! is dispatched and shares the stamped copy as `Arc<Event>`.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Key-value payload carried by events and shared state snapshots
pub type EventData = Map<String, Value>;

/// Event data key naming the extension whose shared state changed
pub const STATE_OWNER_KEY: &str = "stateowner";

// ----------------------------------------------------------------------------
// Event Type / Source
// ----------------------------------------------------------------------------

/// Open, string-backed event type
///
/// Well-known types are provided as constants; extensions may define their own
/// with [`EventType::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const HUB: Self = Self(Cow::Borrowed("com.hubkit.eventType.hub"));
    pub const CONFIGURATION: Self = Self(Cow::Borrowed("com.hubkit.eventType.configuration"));
    pub const LIFECYCLE: Self = Self(Cow::Borrowed("com.hubkit.eventType.lifecycle"));
    pub const IDENTITY: Self = Self(Cow::Borrowed("com.hubkit.eventType.identity"));
    pub const ANALYTICS: Self = Self(Cow::Borrowed("com.hubkit.eventType.analytics"));
    pub const GENERIC_IDENTITY: Self = Self(Cow::Borrowed("com.hubkit.eventType.generic.identity"));
    pub const GENERIC_TRACK: Self = Self(Cow::Borrowed("com.hubkit.eventType.generic.track"));
    /// Matches every event type when used in a listener
    pub const WILDCARD: Self = Self(Cow::Borrowed("com.hubkit.eventType._wildcard_"));

    /// Create a custom event type
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Open, string-backed event source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSource(Cow<'static, str>);

impl EventSource {
    pub const BOOTED: Self = Self(Cow::Borrowed("com.hubkit.eventSource.booted"));
    pub const SHARED_STATE: Self = Self(Cow::Borrowed("com.hubkit.eventSource.sharedState"));
    pub const REQUEST_CONTENT: Self = Self(Cow::Borrowed("com.hubkit.eventSource.requestContent"));
    pub const RESPONSE_CONTENT: Self =
        Self(Cow::Borrowed("com.hubkit.eventSource.responseContent"));
    pub const REQUEST_IDENTITY: Self =
        Self(Cow::Borrowed("com.hubkit.eventSource.requestIdentity"));
    pub const RESPONSE_IDENTITY: Self =
        Self(Cow::Borrowed("com.hubkit.eventSource.responseIdentity"));
    /// Matches every event source when used in a listener
    pub const WILDCARD: Self = Self(Cow::Borrowed("com.hubkit.eventSource._wildcard_"));

    /// Create a custom event source
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Event
// ----------------------------------------------------------------------------

/// Immutable message dispatched through the event hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    name: String,
    event_type: EventType,
    source: EventSource,
    timestamp: Timestamp,
    data: Option<EventData>,
    /// Assigned by the hub on dispatch
    sequence_number: Option<u64>,
    /// Set for response events
    triggering_event_id: Option<Uuid>,
}

impl Event {
    /// Create a new, not yet dispatched event
    pub fn new<N: Into<String>>(
        name: N,
        event_type: EventType,
        source: EventSource,
        data: Option<EventData>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            event_type,
            source,
            timestamp: Timestamp::now(),
            data,
            sequence_number: None,
            triggering_event_id: None,
        }
    }

    /// Create a response to this event
    ///
    /// The response carries this event's id as its triggering event id, which is
    /// what one-shot response listeners match on.
    pub fn create_response_event<N: Into<String>>(
        &self,
        name: N,
        event_type: EventType,
        source: EventSource,
        data: Option<EventData>,
    ) -> Event {
        let mut response = Event::new(name, event_type, source, data);
        response.triggering_event_id = Some(self.id);
        response
    }

    /// Shared-state change notification published by the hub
    pub fn shared_state_change(owner: &str) -> Event {
        let mut data = EventData::new();
        data.insert(STATE_OWNER_KEY.to_string(), Value::String(owner.to_string()));
        Event::new(
            "Shared state change",
            EventType::HUB,
            EventSource::SHARED_STATE,
            Some(data),
        )
    }

    /// Copy of this event stamped with its dispatch sequence number
    ///
    /// Only the hub assigns sequence numbers; events are never mutated after
    /// they are shared.
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn data(&self) -> Option<&EventData> {
        self.data.as_ref()
    }

    /// Look up a single value in the event payload
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    pub fn triggering_event_id(&self) -> Option<Uuid> {
        self.triggering_event_id
    }

    /// Whether this is the hub's shared-state change notification
    pub fn is_shared_state_change(&self) -> bool {
        self.event_type == EventType::HUB && self.source == EventSource::SHARED_STATE
    }

    /// Owner named by a shared-state change notification
    pub fn state_owner(&self) -> Option<&str> {
        if !self.is_shared_state_change() {
            return None;
        }
        self.data_value(STATE_OWNER_KEY).and_then(Value::as_str)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sequence_number {
            Some(number) => write!(
                f,
                "#{} {} ({} / {})",
                number, self.name, self.event_type, self.source
            ),
            None => write!(f, "{} ({} / {})", self.name, self.event_type, self.source),
        }
    }
}
