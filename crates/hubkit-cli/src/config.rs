//! hubkit CLI Configuration
//!
//! The CLI reads a single TOML file holding the hub configuration and the demo
//! settings. Every section is optional; missing values fall back to defaults.
//!
//! ```toml
//! [hub.dispatch]
//! response_timeout_ms = 1000
//!
//! [hub.hit_queue]
//! retry_interval_ms = 250
//! storage_dir = "/var/lib/hubkit/queue"
//!
//! [demo]
//! events = 5
//! server = "analytics.example.com"
//! ```

use anyhow::Context;
use hubkit_core::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Queue directory used when neither the command line nor the config names one
pub const DEFAULT_QUEUE_DIR: &str = "hubkit-queue";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hub: HubConfig,
    pub demo: DemoConfig,
}

/// Settings of the `demo` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Track events dispatched by the demo
    pub events: usize,
    /// Delay before the configuration extension resolves its pending state
    pub configuration_delay_ms: u64,
    /// Simulated round trip of one hit
    pub processor_latency_ms: u64,
    /// Server the analytics extension addresses its hits to
    pub server: String,
    /// How long the demo waits for all hits to complete
    pub completion_timeout_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            events: 5,
            configuration_delay_ms: 200,
            processor_latency_ms: 20,
            server: "analytics.example.com".to_string(),
            completion_timeout_ms: 10_000,
        }
    }
}

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hub.validate()?;
        if self.demo.server.trim().is_empty() {
            return Err(CliError::Config("demo server must not be empty".to_string()));
        }
        if self.demo.completion_timeout_ms == 0 {
            return Err(CliError::Config(
                "demo completion timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Queue directory, preferring an explicit override
    pub fn queue_dir(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.hub.hit_queue.storage_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_QUEUE_DIR))
    }
}
