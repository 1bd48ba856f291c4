//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::session::DestinationStrategy;
use crate::storage::RetentionPolicy;

/// Recall relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    // =========================================================================
    // Groups
    // =========================================================================
    /// Nickname of the group whose messages are tracked
    pub monitored_group: String,

    /// Where recalled content is republished
    pub destination: DestinationStrategy,

    // =========================================================================
    // Storage
    // =========================================================================
    /// SQLite database file
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Delete the database file before opening it
    #[serde(default = "default_true")]
    pub wipe_on_startup: bool,

    /// How long content stays recoverable
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: i64,

    /// Timer-driven sweep interval (None = sweep only after recalls)
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    // =========================================================================
    // Bridge
    // =========================================================================
    /// Bind address for bridge event callbacks
    #[serde(default = "default_webhook_addr")]
    pub webhook_addr: String,

    /// Base URL of the WeChat bridge API
    #[serde(default = "default_bridge_api_url")]
    pub bridge_api_url: String,

    /// Shared token for bridge requests in both directions
    #[serde(default)]
    pub bridge_token: Option<String>,

    /// Capacity of the classified-event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Enable debug mode (log raw events)
    #[serde(default)]
    pub debug_mode: bool,
}

pub const DEFAULT_DISCOVER_KEYWORD: &str = "#recall-audit";

fn default_storage_path() -> PathBuf {
    PathBuf::from("./messages.db")
}

fn default_true() -> bool {
    true
}

fn default_retention_minutes() -> i64 {
    5
}

fn default_webhook_addr() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_bridge_api_url() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_event_queue_capacity() -> usize {
    256
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let monitored_group = var("MONITORED_GROUP").context("MONITORED_GROUP is required")?;

        let destination = match (var("DESTINATION_GROUP"), var("DISCOVER_TRIGGER_SENDER")) {
            (Some(group), _) => DestinationStrategy::Static { group },
            (None, Some(trigger_sender)) => DestinationStrategy::DiscoverOnKeyword {
                trigger_sender,
                keyword: var("DISCOVER_KEYWORD")
                    .unwrap_or_else(|| DEFAULT_DISCOVER_KEYWORD.to_string()),
            },
            (None, None) => {
                bail!("Either DESTINATION_GROUP or DISCOVER_TRIGGER_SENDER is required")
            }
        };

        let retention_minutes = match var("RETENTION_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("RETENTION_MINUTES is not a number: {}", raw))?,
            None => default_retention_minutes(),
        };
        if retention_minutes <= 0 {
            bail!("RETENTION_MINUTES must be positive, got {}", retention_minutes);
        }

        Ok(Self {
            monitored_group,
            destination,
            storage_path: var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_storage_path),
            wipe_on_startup: var("WIPE_ON_STARTUP")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
            retention_minutes,
            sweep_interval_secs: var("SWEEP_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0),
            webhook_addr: var("WEBHOOK_ADDR").unwrap_or_else(default_webhook_addr),
            bridge_api_url: var("BRIDGE_API_URL").unwrap_or_else(default_bridge_api_url),
            bridge_token: var("BRIDGE_TOKEN").filter(|t| !t.is_empty()),
            event_queue_capacity: var("EVENT_QUEUE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(default_event_queue_capacity),
            debug_mode: var("DEBUG_MODE").is_some(),
        })
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from_minutes(self.retention_minutes)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}
