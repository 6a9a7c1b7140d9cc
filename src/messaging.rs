use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::ReplyError;

const REPLY_PATH: &str = "/v2/bot/message/reply";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessageRequest<'a> {
    pub reply_token: &'a str,
    pub messages: Vec<OutboundMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage<'a> {
    Text { text: &'a str },
}

/// Client for the Messaging API reply endpoint.
pub struct MessagingClient {
    client: reqwest::Client,
    reply_url: String,
    access_token: SecretString,
}

impl MessagingClient {
    pub fn new(
        api_base_url: &str,
        access_token: SecretString,
        timeout_ms: Option<u64>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(Self {
            client: builder.build()?,
            reply_url: format!("{}{}", api_base_url.trim_end_matches('/'), REPLY_PATH),
            access_token,
        })
    }

    pub fn reply_url(&self) -> &str {
        &self.reply_url
    }

    /// Answer one event with a single text message. Not retried: reply
    /// tokens are single-use.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), ReplyError> {
        let body = ReplyMessageRequest {
            reply_token,
            messages: vec![OutboundMessage::Text { text }],
        };
        let resp = self
            .client
            .post(&self.reply_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ReplyError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("reply_url", &self.reply_url)
            .finish_non_exhaustive()
    }
}
