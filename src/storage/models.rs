//! Records kept in the content store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RecalledContent;

/// Text message kept for recall recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// WeChat message ID
    pub id: String,
    pub body: String,
    /// Group nickname of the poster
    pub sender: String,
    /// Assigned by the store on insert
    pub inserted_at: DateTime<Utc>,
}

/// Image message kept for recall recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub sender: String,
    pub inserted_at: DateTime<Utc>,
}

/// A record from either collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRecord {
    Text(TextRecord),
    Image(ImageRecord),
}

impl ContentRecord {
    /// Split into sender and recovered content
    pub fn into_parts(self) -> (String, RecalledContent) {
        match self {
            ContentRecord::Text(r) => (r.sender, RecalledContent::Text(r.body)),
            ContentRecord::Image(r) => (r.sender, RecalledContent::Image(r.payload)),
        }
    }
}

impl From<TextRecord> for ContentRecord {
    fn from(record: TextRecord) -> Self {
        ContentRecord::Text(record)
    }
}

impl From<ImageRecord> for ContentRecord {
    fn from(record: ImageRecord) -> Self {
        ContentRecord::Image(record)
    }
}

/// Age limit applied by sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: chrono::Duration,
}

impl RetentionPolicy {
    pub fn new(max_age: chrono::Duration) -> Self {
        Self { max_age }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(chrono::Duration::minutes(minutes))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_minutes(5)
    }
}
