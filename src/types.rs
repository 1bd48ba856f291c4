//! Event and outcome types shared between the bridge adapter and the recall core

use serde::{Deserialize, Serialize};

// =============================================================================
// Content Kind
// =============================================================================

/// Discriminator between the two content collections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Text, ContentKind::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Bridge Event (raw, from the WeChat bot bridge)
// =============================================================================

/// Web WeChat message type codes
pub mod msg_type {
    pub const TEXT: i64 = 1;
    pub const IMAGE: i64 = 3;
    pub const RECALLED: i64 = 10002;
}

/// Raw message event pushed by the WeChat bridge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeEvent {
    #[serde(rename = "MsgId")]
    pub msg_id: String,
    #[serde(rename = "MsgType")]
    pub msg_type: i64,
    #[serde(rename = "Content", default)]
    pub content: String,
    /// Nickname of the group the message was posted in (absent for direct chats)
    #[serde(rename = "GroupName", default)]
    pub group_name: Option<String>,
    /// Nickname of the member who posted it
    #[serde(rename = "SenderNickName", default)]
    pub sender_nick_name: Option<String>,
    /// Where the bridge serves the full image (image messages only)
    #[serde(rename = "ImageUrl", default)]
    pub image_url: Option<String>,
}

impl BridgeEvent {
    pub fn is_from_group(&self, group: &str) -> bool {
        self.group_name.as_deref() == Some(group)
    }

    pub fn sender(&self) -> &str {
        self.sender_nick_name.as_deref().unwrap_or("unknown")
    }
}

// =============================================================================
// Classified Events (input of the recall core)
// =============================================================================

/// Closed set of events the recall core reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    TextPosted {
        id: String,
        body: String,
        sender: String,
    },
    /// `payload` is always the fully retrieved image
    ImagePosted {
        id: String,
        payload: Vec<u8>,
        sender: String,
    },
    ContentRecalled {
        id: String,
    },
    Other,
}

// =============================================================================
// Recall Outcome & Notification
// =============================================================================

/// Content recovered for a recalled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalledContent {
    Text(String),
    Image(Vec<u8>),
}

impl RecalledContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            RecalledContent::Text(_) => ContentKind::Text,
            RecalledContent::Image(_) => ContentKind::Image,
        }
    }
}

/// Result of resolving a recall; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecallOutcome {
    Found {
        kind: ContentKind,
        sender: String,
        content: RecalledContent,
    },
    NotFound,
}

impl RecallOutcome {
    pub fn found(sender: String, content: RecalledContent) -> Self {
        RecallOutcome::Found {
            kind: content.kind(),
            sender,
            content,
        }
    }

    /// Notification to republish, if anything was found
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            RecallOutcome::Found {
                kind,
                sender,
                content,
            } => Some(Notification {
                sender,
                kind,
                content,
            }),
            RecallOutcome::NotFound => None,
        }
    }
}

/// What the forwarder republishes to the audit group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sender: String,
    pub kind: ContentKind,
    pub content: RecalledContent,
}
