//! Global configuration types for Opsline.
//!
//! `GlobalConfig` represents the top-level `config.toml` in the data
//! directory: outbound HTTP settings, runtime sizing, and an optional
//! database URL override.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.opsline/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Overrides the default `sqlite://{data_dir}/opsline.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Settings for the outbound HTTP client used by API steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "opsline/0.1".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Sizing of the in-process execution runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of task queue workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded task queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Broadcast buffer of the event bus.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}
