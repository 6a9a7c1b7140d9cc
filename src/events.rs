//! Webhook delivery payloads.
//!
//! Only the fields needed for dispatch and echoing are captured; unknown
//! fields and unknown event kinds deserialize without error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

impl WebhookPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reply_token: Option<String>,
    pub message: Option<MessageContent>,
    pub timestamp: Option<i64>,
    pub webhook_event_id: Option<String>,
    pub delivery_context: Option<DeliveryContext>,
    pub source: Option<EventSource>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub room_id: Option<String>,
}

/// Dispatch key: event type plus the message type for message events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub event_type: String,
    pub message_type: Option<String>,
}

impl EventKey {
    pub fn new(event_type: &str, message_type: Option<&str>) -> Self {
        Self {
            event_type: event_type.to_owned(),
            message_type: message_type.map(str::to_owned),
        }
    }

    /// The key with the message type dropped.
    pub fn event_only(&self) -> Self {
        Self {
            event_type: self.event_type.clone(),
            message_type: None,
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message_type {
            Some(m) => write!(f, "{}/{}", self.event_type, m),
            None => f.write_str(&self.event_type),
        }
    }
}

/// A text message ready to be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub reply_token: String,
    pub text: String,
}

impl WebhookEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(
            &self.event_type,
            self.message.as_ref().map(|m| m.message_type.as_str()),
        )
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .map(|d| d.is_redelivery)
            .unwrap_or(false)
    }

    /// `Some` for a text message carrying a reply token and non-empty text.
    pub fn text_message(&self) -> Option<TextMessage> {
        if self.event_type != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.message_type != "text" {
            return None;
        }
        let text = message.text.as_deref().filter(|t| !t.is_empty())?;
        let reply_token = self.reply_token.as_deref().filter(|t| !t.is_empty())?;
        Some(TextMessage {
            reply_token: reply_token.to_owned(),
            text: text.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_message_event() {
        let body = json!({
            "destination": "Uxxxxxxxx",
            "events": [{
                "type": "message",
                "mode": "active",
                "timestamp": 1462629479859i64,
                "source": {"type": "user", "userId": "U4af4980629"},
                "webhookEventId": "01FZ74A0TDDPYRVKNK77XKC3ZR",
                "deliveryContext": {"isRedelivery": false},
                "replyToken": "nHuyWiB7yP5Zw52FIkcQobQuGDXCTA",
                "message": {"id": "444573844083572737", "type": "text", "text": "hello"}
            }]
        });
        let payload = WebhookPayload::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(payload.events.len(), 1);
        let event = &payload.events[0];
        assert_eq!(event.key(), EventKey::new("message", Some("text")));
        assert_eq!(event.key().to_string(), "message/text");
        assert!(!event.is_redelivery());
        assert_eq!(
            event.text_message(),
            Some(TextMessage {
                reply_token: "nHuyWiB7yP5Zw52FIkcQobQuGDXCTA".into(),
                text: "hello".into()
            })
        );
    }

    #[test]
    fn unknown_event_kinds_parse_leniently() {
        let body = json!({
            "events": [
                {"type": "follow", "replyToken": "r1", "source": {"type": "user", "userId": "U1"}},
                {"type": "somethingNew", "payload": {"x": 1}},
                {"type": "message", "replyToken": "r2", "message": {"type": "sticker", "id": "1", "packageId": "1"}}
            ]
        });
        let payload = WebhookPayload::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(payload.events.len(), 3);
        assert_eq!(payload.events[0].key().to_string(), "follow");
        assert_eq!(payload.events[1].key().to_string(), "somethingNew");
        assert_eq!(payload.events[2].key().to_string(), "message/sticker");
        assert!(payload.events.iter().all(|e| e.text_message().is_none()));
    }

    #[test]
    fn missing_events_array_is_empty() {
        let payload = WebhookPayload::from_slice(b"{\"destination\":\"U1\"}").unwrap();
        assert!(payload.events.is_empty());
    }

    #[test]
    fn text_without_token_or_content_is_not_answerable() {
        let mut event = WebhookEvent {
            event_type: "message".into(),
            reply_token: None,
            message: Some(MessageContent {
                message_type: "text".into(),
                id: None,
                text: Some("hi".into()),
            }),
            ..WebhookEvent::default()
        };
        assert!(event.text_message().is_none());
        event.reply_token = Some("tok".into());
        assert!(event.text_message().is_some());
        event.message.as_mut().unwrap().text = Some(String::new());
        assert!(event.text_message().is_none());
    }

    #[test]
    fn redelivery_flag_is_read() {
        let body = json!({"events": [{"type": "message", "deliveryContext": {"isRedelivery": true}}]});
        let payload = WebhookPayload::from_slice(body.to_string().as_bytes()).unwrap();
        assert!(payload.events[0].is_redelivery());
    }
}
