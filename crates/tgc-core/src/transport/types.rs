use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, MessageId};

/// Opaque handle to media owned by the transport session (file reference, input media id…).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

/// Read-only snapshot of a channel message as returned by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMessage {
    pub id: MessageId,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub text: Option<String>,
    /// Service/action message (join, pin, title change…). Never replayed.
    #[serde(default, alias = "action")]
    pub is_service: bool,
}

impl SourceMessage {
    pub fn text(id: i64, text: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            media: None,
            text: Some(text.into()),
            is_service: false,
        }
    }

    pub fn media(id: i64, media: impl Into<String>, caption: Option<&str>) -> Self {
        Self {
            id: MessageId(id),
            media: Some(MediaRef(media.into())),
            text: caption.map(str::to_string),
            is_service: false,
        }
    }

    pub fn service(id: i64) -> Self {
        Self {
            id: MessageId(id),
            media: None,
            text: None,
            is_service: true,
        }
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// Text body, treating an empty string as absent.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// What to emit for this message, or `None` when it carries neither media nor text.
    pub fn outgoing(&self) -> Option<OutgoingContent> {
        if let Some(media) = &self.media {
            return Some(OutgoingContent::Media {
                media: media.clone(),
                caption: self.body().unwrap_or_default().to_string(),
            });
        }
        self.body().map(|t| OutgoingContent::Text(t.to_string()))
    }
}

/// Content re-posted to the target channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingContent {
    Media { media: MediaRef, caption: String },
    Text(String),
}

/// A channel the session has resolved into a sendable/readable peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: ChannelId,
    /// Transport-specific peer handle (access hash, input peer token…).
    pub peer: String,
}

/// One backward history page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only messages strictly older than this id; `MessageId::LATEST` starts at the newest.
    pub offset: MessageId,
    /// Only messages with `id >= floor`.
    pub floor: MessageId,
    pub limit: u32,
}

/// Acknowledgement of a successful send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub id: MessageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_prefers_media_with_caption() {
        let m = SourceMessage::media(3, "photo:1", Some("look"));
        assert_eq!(
            m.outgoing(),
            Some(OutgoingContent::Media {
                media: MediaRef("photo:1".to_string()),
                caption: "look".to_string()
            })
        );

        let bare = SourceMessage::media(4, "photo:2", None);
        assert_eq!(
            bare.outgoing(),
            Some(OutgoingContent::Media {
                media: MediaRef("photo:2".to_string()),
                caption: String::new()
            })
        );
    }

    #[test]
    fn outgoing_is_none_without_media_or_text() {
        assert_eq!(SourceMessage::text(1, "hi").outgoing(), Some(OutgoingContent::Text("hi".into())));
        assert_eq!(SourceMessage::text(2, "").outgoing(), None);
        assert_eq!(SourceMessage::service(3).outgoing(), None);
    }

    #[test]
    fn deserializes_gateway_shape() {
        let m: SourceMessage =
            serde_json::from_str(r#"{"id": 7, "text": "hello", "action": true}"#).unwrap();
        assert_eq!(m.id, MessageId(7));
        assert!(m.is_service);
        assert!(!m.has_media());
    }
}
