//! Notification forwarder - republishes recalled content to the audit group

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::session::SessionContext;
use crate::types::{Notification, RecalledContent};

/// Outbound side of the chat transport
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, destination: &str, text: &str) -> Result<()>;
    async fn send_image(&self, destination: &str, image: &[u8]) -> Result<()>;
}

/// Whether a notification reached the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { destination: String },
    /// No destination group known yet
    NoDestination,
}

/// Turns notifications into group messages
#[derive(Clone)]
pub struct NotificationForwarder {
    sender: Arc<dyn MessageSender>,
    session: Arc<SessionContext>,
}

impl NotificationForwarder {
    pub fn new(sender: Arc<dyn MessageSender>, session: Arc<SessionContext>) -> Self {
        Self { sender, session }
    }

    pub async fn deliver(&self, notification: &Notification) -> Result<Delivery> {
        let Some(destination) = self.session.destination() else {
            warn!(
                "Dropping recall notice from {}: destination group not discovered yet",
                notification.sender
            );
            return Ok(Delivery::NoDestination);
        };

        match &notification.content {
            RecalledContent::Text(body) => {
                self.sender
                    .send_text(&destination, &text_notice(&notification.sender, body))
                    .await?;
            }
            RecalledContent::Image(payload) => {
                self.sender
                    .send_text(&destination, &image_notice(&notification.sender))
                    .await?;
                self.sender.send_image(&destination, payload).await?;
            }
        }

        info!(
            "📤 Republished recalled {} from {} to {}",
            notification.kind, notification.sender, destination
        );
        Ok(Delivery::Sent { destination })
    }
}

fn text_notice(sender: &str, body: &str) -> String {
    format!("{}撤回了：{}", sender, body)
}

fn image_notice(sender: &str) -> String {
    format!("{}撤回的图片：", sender)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::DestinationStrategy;
    use crate::types::ContentKind;
    use parking_lot::Mutex;

    /// Message sent through a [`RecordingSender`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Sent {
        Text(String, String),
        Image(String, Vec<u8>),
    }

    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<Sent>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .push(Sent::Text(destination.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_image(&self, destination: &str, image: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .push(Sent::Image(destination.to_string(), image.to_vec()));
            Ok(())
        }
    }

    fn forwarder(strategy: DestinationStrategy) -> (NotificationForwarder, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let session = Arc::new(SessionContext::new(strategy));
        (NotificationForwarder::new(sender.clone(), session), sender)
    }

    fn audit() -> DestinationStrategy {
        DestinationStrategy::Static {
            group: "audit".to_string(),
        }
    }

    #[tokio::test]
    async fn test_text_notification() {
        let (forwarder, sender) = forwarder(audit());
        let notification = Notification {
            sender: "Alice".to_string(),
            kind: ContentKind::Text,
            content: RecalledContent::Text("hello".to_string()),
        };

        let delivery = forwarder.deliver(&notification).await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Sent {
                destination: "audit".to_string()
            }
        );
        assert_eq!(
            *sender.sent.lock(),
            vec![Sent::Text("audit".to_string(), "Alice撤回了：hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_image_notification_sends_caption_then_image() {
        let (forwarder, sender) = forwarder(audit());
        let notification = Notification {
            sender: "Bob".to_string(),
            kind: ContentKind::Image,
            content: RecalledContent::Image(vec![7, 8, 9]),
        };

        forwarder.deliver(&notification).await.unwrap();
        assert_eq!(
            *sender.sent.lock(),
            vec![
                Sent::Text("audit".to_string(), "Bob撤回的图片：".to_string()),
                Sent::Image("audit".to_string(), vec![7, 8, 9]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pending_destination_drops_notification() {
        let (forwarder, sender) = forwarder(DestinationStrategy::DiscoverOnKeyword {
            trigger_sender: "admin".to_string(),
            keyword: "#recall-audit".to_string(),
        });
        let notification = Notification {
            sender: "Alice".to_string(),
            kind: ContentKind::Text,
            content: RecalledContent::Text("hello".to_string()),
        };

        assert_eq!(
            forwarder.deliver(&notification).await.unwrap(),
            Delivery::NoDestination
        );
        assert!(sender.sent.lock().is_empty());
    }
}
