//! Extension Container
//!
//! Binds one extension instance to its private orderer and listener registry.
//! Every event the hub fans out is appended to the orderer; the orderer task
//! evaluates the readiness gate and then the matching listeners, strictly in
//! dispatch order. A not-ready extension blocks only its own backlog.

use crate::extension::{Extension, ExtensionApi, ExtensionRuntime};
use crate::hub::HubInner;
use crate::orderer::{Disposition, OperationOrderer};
use hubkit_core::{Event, HubError, HubResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error};

struct ExtensionCell<E: Extension> {
    extension: E,
    api: ExtensionApi<E>,
}

impl<E: Extension> ExtensionCell<E> {
    fn handle(&mut self, event: &Arc<Event>, last_processed: &AtomicU64) -> Disposition {
        let Self { extension, api } = self;

        let ready = catch_unwind(AssertUnwindSafe(|| {
            extension.ready_for_event(event, api.runtime())
        }));
        match ready {
            Ok(true) => {}
            Ok(false) => return Disposition::Deferred,
            Err(_) => {
                error!(
                    "Readiness check of {} panicked on {}; skipping event",
                    api.runtime().name(),
                    event
                );
                return Disposition::Consumed;
            }
        }

        if let Some(sequence_number) = event.sequence_number() {
            last_processed.store(sequence_number, Ordering::Release);
        }
        api.notify_listeners(extension, event);
        Disposition::Consumed
    }
}

// ----------------------------------------------------------------------------
// Extension Container
// ----------------------------------------------------------------------------

/// One registered extension and its event backlog
pub struct ExtensionContainer<E: Extension> {
    name: String,
    version: String,
    cell: Arc<Mutex<Option<ExtensionCell<E>>>>,
    last_processed: Arc<AtomicU64>,
    orderer: OperationOrderer<Arc<Event>>,
}

impl<E: Extension> ExtensionContainer<E> {
    /// Create the container with a stopped orderer
    ///
    /// Returns the runtime handle the extension will be given during
    /// registration.
    pub(crate) fn new(
        name: &str,
        version: &str,
        hub: Weak<HubInner>,
    ) -> (Self, ExtensionRuntime) {
        let cell: Arc<Mutex<Option<ExtensionCell<E>>>> = Arc::new(Mutex::new(None));
        let last_processed = Arc::new(AtomicU64::new(0));
        let handler_cell = Arc::clone(&cell);
        let handler_processed = Arc::clone(&last_processed);

        let orderer = OperationOrderer::new(name, move |event: &Arc<Event>| {
            let mut guard = lock_cell(&handler_cell);
            match guard.as_mut() {
                Some(cell) => cell.handle(event, &handler_processed),
                // Not registered yet or already unregistered
                None => Disposition::Consumed,
            }
        });

        let runtime = ExtensionRuntime::new(Arc::from(name), hub, orderer.clone());
        let container = Self {
            name: name.to_string(),
            version: version.to_string(),
            cell,
            last_processed,
            orderer,
        };
        (container, runtime)
    }

    /// Run `on_registered` and install the extension
    ///
    /// Blocking; the hub runs this on the blocking pool.
    pub(crate) fn install(&self, mut extension: E, runtime: ExtensionRuntime) -> HubResult<()> {
        let mut guard = lock_cell(&self.cell);
        let mut api = ExtensionApi::new(runtime);

        extension
            .on_registered(&mut api)
            .map_err(|err| HubError::Registration {
                name: self.name.clone(),
                reason: err.to_string(),
            })?;

        debug!(
            "Extension {} registered {} listener(s)",
            self.name,
            api.listener_count()
        );
        *guard = Some(ExtensionCell { extension, api });
        Ok(())
    }
}

fn lock_cell<E: Extension>(
    cell: &Mutex<Option<ExtensionCell<E>>>,
) -> MutexGuard<'_, Option<ExtensionCell<E>>> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Container Handle
// ----------------------------------------------------------------------------

/// Type-erased view of a container held by the hub
pub(crate) trait ContainerHandle: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Append an event to the container's backlog
    fn deliver(&self, event: Arc<Event>);

    /// Start processing the backlog
    fn start(&self);

    /// Events delivered and not yet consumed
    fn pending(&self) -> usize;

    /// Sequence number of the last event handed to the listeners, 0 if none
    fn last_processed(&self) -> u64;

    /// Run `on_unregistered` and stop the orderer for good
    fn unregister(&self);

    /// Stop the orderer without notifying the extension
    fn shutdown(&self);
}

impl<E: Extension> ContainerHandle for ExtensionContainer<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn deliver(&self, event: Arc<Event>) {
        if !self.orderer.add(event) {
            debug!("Extension {} is shut down; event not delivered", self.name);
        }
    }

    fn start(&self) {
        self.orderer.start();
    }

    fn pending(&self) -> usize {
        self.orderer.pending()
    }

    fn last_processed(&self) -> u64 {
        self.last_processed.load(Ordering::Acquire)
    }

    fn unregister(&self) {
        self.orderer.stop();
        let cell = lock_cell(&self.cell).take();

        if let Some(ExtensionCell { mut extension, api }) = cell {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                extension.on_unregistered(api.runtime())
            }));
            if outcome.is_err() {
                error!("on_unregistered of {} panicked", self.name);
            }
        }

        self.orderer.shutdown();
        debug!("Extension {} unregistered", self.name);
    }

    fn shutdown(&self) {
        self.orderer.shutdown();
    }
}
