//! UGENT WeChat Recall Library
//!
//! Keeps recently posted content of one WeChat group so that messages the
//! sender later recalls can be republished to an audit group.
//!
//! # Architecture
//!
//! ```text
//! WeChat Bridge ──HTTP──▶ Webhook ──classify──▶ Queue ──▶ Recall Worker
//!      ▲                                                    │
//!      │                                                    ├── ContentStore (SQLite)
//!      │                                                    ├── RecallResolver + RetentionSweeper
//!      └──────────────── send_text / send_image ◀───────────┴── NotificationForwarder
//! ```
//!
//! # Usage
//!
//! ```bash
//! export MONITORED_GROUP="Owners Group"
//! export DESTINATION_GROUP="Recall Audit"      # or DISCOVER_TRIGGER_SENDER=admin
//! export BRIDGE_API_URL=http://127.0.0.1:8091
//! ugent-wechat-recall
//! ```
//!
//! The store file is wiped at every start, so recall recovery never spans a
//! restart.

pub mod bridge_api;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod forwarder;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod sweeper;
pub mod types;
pub mod webhook;
pub mod worker;

pub use bridge_api::BridgeClient;
pub use classifier::EventClassifier;
pub use config::RelayConfig;
pub use resolver::RecallResolver;
pub use storage::ContentStore;
pub use sweeper::RetentionSweeper;
pub use types::*;
pub use worker::RecallWorker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::classifier::{EventClassifier, ImageFetcher};
    pub use crate::config::RelayConfig;
    pub use crate::forwarder::{MessageSender, NotificationForwarder};
    pub use crate::resolver::RecallResolver;
    pub use crate::session::{DestinationStrategy, SessionContext};
    pub use crate::storage::{ContentStore, RetentionPolicy, StorageError};
    pub use crate::sweeper::RetentionSweeper;
    pub use crate::types::*;
    pub use crate::worker::RecallWorker;
}
