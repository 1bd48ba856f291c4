//! Session context - where recalled content gets republished

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{BridgeEvent, msg_type};

/// How the audit (destination) group is chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DestinationStrategy {
    /// Fixed group nickname
    Static { group: String },
    /// The first group in which `trigger_sender` posts `keyword` becomes the destination
    DiscoverOnKeyword {
        trigger_sender: String,
        keyword: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationState {
    Pending,
    Resolved(String),
}

/// Per-run session state shared by the webhook and the worker
pub struct SessionContext {
    strategy: DestinationStrategy,
    destination: RwLock<DestinationState>,
}

impl SessionContext {
    pub fn new(strategy: DestinationStrategy) -> Self {
        let destination = match &strategy {
            DestinationStrategy::Static { group } => DestinationState::Resolved(group.clone()),
            DestinationStrategy::DiscoverOnKeyword { .. } => DestinationState::Pending,
        };

        Self {
            strategy,
            destination: RwLock::new(destination),
        }
    }

    /// Current destination group, if known
    pub fn destination(&self) -> Option<String> {
        match &*self.destination.read() {
            DestinationState::Resolved(group) => Some(group.clone()),
            DestinationState::Pending => None,
        }
    }

    /// Check an incoming event for the discovery keyword
    ///
    /// Returns `true` if this event resolved the destination. Only the first
    /// matching event counts.
    pub fn observe(&self, event: &BridgeEvent) -> bool {
        let DestinationStrategy::DiscoverOnKeyword {
            trigger_sender,
            keyword,
        } = &self.strategy
        else {
            return false;
        };

        if event.msg_type != msg_type::TEXT
            || event.sender_nick_name.as_deref() != Some(trigger_sender.as_str())
            || event.content.trim() != keyword
        {
            return false;
        }

        let Some(group) = &event.group_name else {
            return false;
        };

        let mut guard = self.destination.write();
        if *guard != DestinationState::Pending {
            return false;
        }
        *guard = DestinationState::Resolved(group.clone());
        info!("🎯 Destination group discovered: {}", group);
        true
    }
}
