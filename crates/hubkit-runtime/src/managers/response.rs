//! One-shot response listeners
//!
//! A response listener waits for the first event whose triggering event id
//! matches its trigger, or for its timeout, whichever comes first. Delivery and
//! timeout race on removing the entry from the registry; only the winner fires,
//! so every listener is invoked exactly once.

use hubkit_core::Event;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

/// Callback invoked with the response event, or `None` on timeout
pub type ResponseCallback = Box<dyn FnOnce(Option<Arc<Event>>) + Send>;

struct PendingResponse {
    trigger: Uuid,
    callback: ResponseCallback,
    timer: JoinHandle<()>,
}

// ----------------------------------------------------------------------------
// Response Listener Registry
// ----------------------------------------------------------------------------

/// Registry of outstanding one-shot response listeners
#[derive(Default)]
pub struct ResponseListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, PendingResponse>>,
}

impl ResponseListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for responses to `trigger`
    ///
    /// Must be called from within a tokio runtime; the timeout runs on its own
    /// task.
    pub fn register<F>(self: &Arc<Self>, trigger: Uuid, timeout: Duration, listener: F)
    where
        F: FnOnce(Option<Arc<Event>>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(self);

        // Holding the lock keeps the timer from firing before the entry exists
        let mut listeners = self.lock();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            Self::expire(registry, id);
        });
        listeners.insert(
            id,
            PendingResponse {
                trigger,
                callback: Box::new(listener),
                timer,
            },
        );
        trace!("Response listener {} registered for {}", id, trigger);
    }

    /// Fire every listener waiting on the event's trigger
    pub fn notify(&self, event: &Arc<Event>) {
        let Some(trigger) = event.triggering_event_id() else {
            return;
        };

        let matched: Vec<PendingResponse> = {
            let mut listeners = self.lock();
            let ids: Vec<u64> = listeners
                .iter()
                .filter(|(_, pending)| pending.trigger == trigger)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| listeners.remove(&id))
                .collect()
        };

        for pending in matched {
            pending.timer.abort();
            debug!("Response {} delivered for trigger {}", event, trigger);
            (pending.callback)(Some(Arc::clone(event)));
        }
    }

    /// Listeners still waiting
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(registry: Weak<Self>, id: u64) {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let expired = registry.lock().remove(&id);
        if let Some(pending) = expired {
            debug!("Response listener for {} timed out", pending.trigger);
            (pending.callback)(None);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingResponse>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubkit_core::{EventSource, EventType};
    use tokio::sync::oneshot;

    fn request() -> Event {
        Event::new(
            "Content request",
            EventType::ANALYTICS,
            EventSource::REQUEST_CONTENT,
            None,
        )
    }

    #[tokio::test]
    async fn test_response_fires_once_and_cancels_timeout() {
        let registry = Arc::new(ResponseListenerRegistry::new());
        let trigger = request();
        let (tx, rx) = oneshot::channel();
        registry.register(trigger.id(), Duration::from_millis(50), move |event| {
            let _ = tx.send(event);
        });
        assert_eq!(registry.len(), 1);

        let response = Arc::new(trigger.create_response_event(
            "Content response",
            EventType::ANALYTICS,
            EventSource::RESPONSE_CONTENT,
            None,
        ));
        registry.notify(&response);
        registry.notify(&response);

        let delivered = rx.await.unwrap();
        assert_eq!(delivered.map(|event| event.id()), Some(response.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_event_does_not_fire() {
        let registry = Arc::new(ResponseListenerRegistry::new());
        let trigger = request();
        let (tx, rx) = oneshot::channel();
        registry.register(trigger.id(), Duration::from_millis(30), move |event| {
            let _ = tx.send(event);
        });

        let other = Arc::new(request().create_response_event(
            "Other response",
            EventType::ANALYTICS,
            EventSource::RESPONSE_CONTENT,
            None,
        ));
        registry.notify(&other);
        assert_eq!(registry.len(), 1);

        assert!(rx.await.unwrap().is_none());
        assert!(registry.is_empty());
    }
}
