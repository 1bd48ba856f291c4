//! Storage module for recall recovery
//!
//! Provides SQLite-based short-term storage for:
//! - Text messages posted in the monitored group
//! - Fully downloaded images posted in the monitored group
//! - Age-based pruning of both

mod models;
mod sqlite;

pub use models::{ContentRecord, ImageRecord, RetentionPolicy, TextRecord};
pub use sqlite::{ContentStore, StorageError, StorageResult};
