use super::EventHandler;
use crate::events::{EventKey, WebhookEvent};
use crate::messaging::MessagingClient;

/// Replies to a text message with the same text.
pub struct EchoHandler {
    client: MessagingClient,
}

impl EchoHandler {
    pub fn new(client: MessagingClient) -> Self {
        Self { client }
    }

    pub fn key() -> EventKey {
        EventKey::new("message", Some("text"))
    }
}

#[async_trait::async_trait]
impl EventHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, event: &WebhookEvent) -> anyhow::Result<()> {
        let Some(msg) = event.text_message() else {
            tracing::warn!(
                webhook_event_id = ?event.webhook_event_id,
                "text event without reply token or text, skipping"
            );
            return Ok(());
        };
        self.client.reply_text(&msg.reply_token, &msg.text).await?;
        tracing::info!(chars = msg.text.chars().count(), "echoed text message");
        Ok(())
    }
}
