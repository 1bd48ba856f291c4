//! Event classifier - turns raw bridge events into recall-core events
//!
//! Responsibilities kept out of the core:
//! - Only the monitored group is tracked; everything else is `Other`
//! - Images are downloaded in full before an `ImagePosted` is emitted
//! - Recall notices (`<sysmsg type="revokemsg">`) are parsed for the recalled id

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::types::{BridgeEvent, InboundEvent, msg_type};

/// Maximum image size accepted for storage (20MB)
pub const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024;

/// Retrieves the full bytes of a posted image
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Why an event could not be classified
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Failed to retrieve image {id}: {reason}")]
    Transport { id: String, reason: String },

    #[error("Image {id} is {size} bytes (max: {max})")]
    PayloadTooLarge { id: String, size: usize, max: usize },

    #[error("Malformed recall notice: {0}")]
    MalformedRecall(String),
}

/// Revoke notice as delivered in a recall message's content
#[derive(Debug, Deserialize)]
struct SysMsg {
    #[serde(rename = "revokemsg")]
    revoke: RevokeMsg,
}

#[derive(Debug, Deserialize)]
struct RevokeMsg {
    /// ID of the message being recalled
    msgid: String,
}

/// Classifier bound to the single monitored source group
#[derive(Clone)]
pub struct EventClassifier {
    monitored_group: String,
    fetcher: Arc<dyn ImageFetcher>,
}

impl EventClassifier {
    pub fn new(monitored_group: impl Into<String>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            monitored_group: monitored_group.into(),
            fetcher,
        }
    }

    pub fn monitored_group(&self) -> &str {
        &self.monitored_group
    }

    pub async fn classify(&self, event: &BridgeEvent) -> Result<InboundEvent, ClassifyError> {
        if !event.is_from_group(&self.monitored_group) {
            return Ok(InboundEvent::Other);
        }

        match event.msg_type {
            msg_type::TEXT => Ok(InboundEvent::TextPosted {
                id: event.msg_id.clone(),
                body: event.content.clone(),
                sender: event.sender().to_string(),
            }),
            msg_type::IMAGE => {
                let payload = self.download_image(event).await?;
                Ok(InboundEvent::ImagePosted {
                    id: event.msg_id.clone(),
                    payload,
                    sender: event.sender().to_string(),
                })
            }
            msg_type::RECALLED => {
                let id = parse_recalled_id(&event.content)?;
                info!("Recall notice for message {}", id);
                Ok(InboundEvent::ContentRecalled { id })
            }
            other => {
                debug!("Ignoring message {} of type {}", event.msg_id, other);
                Ok(InboundEvent::Other)
            }
        }
    }

    async fn download_image(&self, event: &BridgeEvent) -> Result<Vec<u8>, ClassifyError> {
        let url = event
            .image_url
            .as_deref()
            .ok_or_else(|| ClassifyError::Transport {
                id: event.msg_id.clone(),
                reason: "no image url in event".to_string(),
            })?;

        let payload = self
            .fetcher
            .fetch_image(url)
            .await
            .map_err(|e| ClassifyError::Transport {
                id: event.msg_id.clone(),
                reason: format!("{:#}", e),
            })?;

        if payload.len() > MAX_IMAGE_SIZE {
            return Err(ClassifyError::PayloadTooLarge {
                id: event.msg_id.clone(),
                size: payload.len(),
                max: MAX_IMAGE_SIZE,
            });
        }

        debug!("Downloaded image {} ({} bytes)", event.msg_id, payload.len());
        Ok(payload)
    }
}

/// Extract the recalled message id from a recall notice
///
/// Group notices may be HTML-escaped and prefixed with `<group id>:\n`.
pub fn parse_recalled_id(content: &str) -> Result<String, ClassifyError> {
    let xml = content
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");

    let start = xml
        .find("<sysmsg")
        .ok_or_else(|| ClassifyError::MalformedRecall("missing <sysmsg>".to_string()))?;
    let end = xml
        .find("</sysmsg>")
        .map(|pos| pos + "</sysmsg>".len())
        .unwrap_or(xml.len());

    let notice: SysMsg = serde_xml_rs::from_str(&xml[start..end])
        .map_err(|e| ClassifyError::MalformedRecall(e.to_string()))?;

    let id = notice.revoke.msgid.trim();
    if id.is_empty() {
        return Err(ClassifyError::MalformedRecall("empty msgid".to_string()));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const REVOKE_XML: &str = r#"<sysmsg type="revokemsg"><revokemsg><session>12345@chatroom</session><oldmsgid>1693208817</oldmsgid><msgid>4616939301372950285</msgid><replacemsg><![CDATA["Alice" recalled a message]]></replacemsg></revokemsg></sysmsg>"#;

    struct FakeFetcher {
        image: Option<Vec<u8>>,
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch_image(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            self.image.clone().ok_or_else(|| anyhow!("connection reset"))
        }
    }

    fn classifier(image: Option<Vec<u8>>) -> EventClassifier {
        EventClassifier::new("owners", Arc::new(FakeFetcher { image }))
    }

    fn event(msg_type: i64, group: &str, content: &str) -> BridgeEvent {
        BridgeEvent {
            msg_id: "1001".to_string(),
            msg_type,
            content: content.to_string(),
            group_name: Some(group.to_string()),
            sender_nick_name: Some("Alice".to_string()),
            image_url: Some("/media/1001".to_string()),
        }
    }

    #[tokio::test]
    async fn test_text_from_monitored_group() {
        let classified = classifier(None)
            .classify(&event(msg_type::TEXT, "owners", "hello"))
            .await
            .unwrap();

        assert_eq!(
            classified,
            InboundEvent::TextPosted {
                id: "1001".to_string(),
                body: "hello".to_string(),
                sender: "Alice".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_other_groups_are_ignored() {
        let c = classifier(None);
        for t in [msg_type::TEXT, msg_type::IMAGE, msg_type::RECALLED] {
            assert_eq!(
                c.classify(&event(t, "elsewhere", "hello")).await.unwrap(),
                InboundEvent::Other
            );
        }

        let mut direct = event(msg_type::TEXT, "owners", "hi");
        direct.group_name = None;
        assert_eq!(c.classify(&direct).await.unwrap(), InboundEvent::Other);
    }

    #[tokio::test]
    async fn test_unknown_type_is_other() {
        // 47 = sticker
        let classified = classifier(None)
            .classify(&event(47, "owners", ""))
            .await
            .unwrap();
        assert_eq!(classified, InboundEvent::Other);
    }

    #[tokio::test]
    async fn test_image_is_fully_downloaded() {
        let classified = classifier(Some(vec![1, 2, 3]))
            .classify(&event(msg_type::IMAGE, "owners", ""))
            .await
            .unwrap();

        assert_eq!(
            classified,
            InboundEvent::ImagePosted {
                id: "1001".to_string(),
                payload: vec![1, 2, 3],
                sender: "Alice".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_image_download_failure_is_transport_error() {
        let err = classifier(None)
            .classify(&event(msg_type::IMAGE, "owners", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Transport { ref id, .. } if id == "1001"));
    }

    #[tokio::test]
    async fn test_image_without_url_is_transport_error() {
        let mut e = event(msg_type::IMAGE, "owners", "");
        e.image_url = None;
        let err = classifier(Some(vec![1])).classify(&e).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let err = classifier(Some(vec![0; MAX_IMAGE_SIZE + 1]))
            .classify(&event(msg_type::IMAGE, "owners", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_recall_notice() {
        let classified = classifier(None)
            .classify(&event(msg_type::RECALLED, "owners", REVOKE_XML))
            .await
            .unwrap();

        assert_eq!(
            classified,
            InboundEvent::ContentRecalled {
                id: "4616939301372950285".to_string()
            }
        );
    }

    #[test]
    fn test_parse_escaped_and_prefixed_notice() {
        let escaped = REVOKE_XML.replace('<', "&lt;").replace('>', "&gt;");
        let content = format!("12345@chatroom:\n{}", escaped);

        assert_eq!(parse_recalled_id(&content).unwrap(), "4616939301372950285");
    }

    #[test]
    fn test_parse_rejects_non_notice() {
        assert!(matches!(
            parse_recalled_id("just text"),
            Err(ClassifyError::MalformedRecall(_))
        ));
        assert!(matches!(
            parse_recalled_id("<sysmsg type=\"revokemsg\"><revokemsg></revokemsg></sysmsg>"),
            Err(ClassifyError::MalformedRecall(_))
        ));
    }
}
