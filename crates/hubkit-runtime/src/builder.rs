//! Hub Builder API
//!
//! Provides a builder-style API for consumers (CLI/tests) to configure a hub,
//! register a set of extensions concurrently and start it once every
//! registration has completed.

use crate::extension::Extension;
use crate::hub::EventHub;
use futures::future::{join_all, BoxFuture};
use hubkit_core::{HubConfig, HubError, HubResult};
use tracing::{info, warn};

type Registration = Box<dyn FnOnce(EventHub) -> BoxFuture<'static, (String, HubResult<()>)> + Send>;

// ----------------------------------------------------------------------------
// Startup Report
// ----------------------------------------------------------------------------

/// Outcome of registering the builder's extensions
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Names registered successfully, in builder order
    pub registered: Vec<String>,
    /// Names that failed, with the reason
    pub failed: Vec<(String, HubError)>,
}

impl StartupReport {
    /// Whether every extension registered
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Hub Builder
// ----------------------------------------------------------------------------

/// Builder for an [`EventHub`] with a set of extensions
pub struct HubBuilder {
    config: HubConfig,
    registrations: Vec<Registration>,
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HubBuilder {
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            registrations: Vec::new(),
        }
    }

    /// Set the hub configuration
    pub fn with_config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an extension to register
    pub fn with_extension<E: Extension>(mut self, extension: E) -> Self {
        self.registrations.push(Box::new(move |hub: EventHub| {
            Box::pin(async move {
                let name = extension.name().to_string();
                let result = hub.register_extension(extension).await;
                (name, result)
            })
        }));
        self
    }

    /// Validate the configuration and register every extension, without starting
    ///
    /// A failed registration is reported and does not affect the others.
    pub async fn build(self) -> HubResult<(EventHub, StartupReport)> {
        self.config.validate()?;
        let hub = EventHub::new(self.config);

        let outcomes = join_all(
            self.registrations
                .into_iter()
                .map(|register| register(hub.clone())),
        )
        .await;

        let mut report = StartupReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.registered.push(name),
                Err(err) => {
                    warn!("Extension {} failed to register: {}", name, err);
                    report.failed.push((name, err));
                }
            }
        }

        Ok((hub, report))
    }

    /// Register every extension, then start the hub
    pub async fn build_and_start(self) -> HubResult<(EventHub, StartupReport)> {
        let (hub, report) = self.build().await?;
        hub.start();
        info!(
            "Event hub running with {} extension(s), {} failed",
            report.registered.len(),
            report.failed.len()
        );
        Ok((hub, report))
    }
}
