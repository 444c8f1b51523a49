//! Centralized Configuration Management
//!
//! All hub tunables live here so embedders configure the hub, its dispatch
//! behavior, hit queues and logging from one serde-loadable structure.

use crate::errors::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Dispatch Configuration
// ----------------------------------------------------------------------------

/// Configuration for event dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default wait for a response event, in milliseconds
    pub response_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1000,
        }
    }
}

impl DispatchConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Hit Queue Configuration
// ----------------------------------------------------------------------------

/// Configuration for hit queues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitQueueConfig {
    /// Overrides the processor's own retry interval when set
    pub retry_interval_ms: Option<u64>,
    /// Root directory for file-backed queues
    pub storage_dir: Option<PathBuf>,
}

impl HitQueueConfig {
    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval_ms.map(Duration::from_millis)
    }
}

// ----------------------------------------------------------------------------
// Logging Configuration
// ----------------------------------------------------------------------------

/// Configuration for log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `hubkit_runtime=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Hub Configuration
// ----------------------------------------------------------------------------

/// Top-level event hub configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub dispatch: DispatchConfig,
    pub hit_queue: HitQueueConfig,
    pub logging: LoggingConfig,
}

impl HubConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            dispatch: DispatchConfig {
                response_timeout_ms: 100,
            },
            hit_queue: HitQueueConfig {
                retry_interval_ms: Some(20),
                storage_dir: None,
            },
            logging: LoggingConfig {
                enabled: false,
                level: "debug".to_string(),
            },
        }
    }

    /// Check the configuration for values the hub cannot run with
    pub fn validate(&self) -> HubResult<()> {
        if self.dispatch.response_timeout_ms == 0 {
            return Err(HubError::config_error(
                "dispatch.response_timeout_ms must be greater than zero",
            ));
        }
        if self.hit_queue.retry_interval_ms == Some(0) {
            return Err(HubError::config_error(
                "hit_queue.retry_interval_ms must be greater than zero when set",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(HubError::config_error("logging.level must not be empty"));
        }
        Ok(())
    }

    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder::default()
    }
}

// ----------------------------------------------------------------------------
// Configuration Builder
// ----------------------------------------------------------------------------

/// Builder for [`HubConfig`]
#[derive(Debug, Clone, Default)]
pub struct HubConfigBuilder {
    config: HubConfig,
}

impl HubConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.hit_queue.retry_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn storage_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.hit_queue.storage_dir = Some(dir.into());
        self
    }

    pub fn logging(mut self, enabled: bool, level: &str) -> Self {
        self.config.logging = LoggingConfig {
            enabled,
            level: level.to_string(),
        };
        self
    }

    /// Build and validate
    pub fn build(self) -> HubResult<HubConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation (testing)
    pub fn build_unchecked(self) -> HubConfig {
        self.config
    }
}
