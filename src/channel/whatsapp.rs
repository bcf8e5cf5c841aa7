//! WhatsApp gateway adapter.
//!
//! Talks to a local whatsapp-web gateway over its HTTP API: inbound
//! messages arrive as webhook POSTs (parsed here, served by
//! [`crate::channel::routes`]), outbound replies and media go out as JSON
//! requests. Media travels base64-encoded with the caption alongside.

use crate::channel::{is_direct_chat, ChannelMessage, ChatTransport};
use crate::config::GatewayConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;

/// Adapter for the gateway's HTTP API.
pub struct WhatsAppGateway {
    base_url: String,
    api_token: String,
    client: Client,
}

impl WhatsAppGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client: Client::new(),
        }
    }

    /// Parse a webhook payload into messages.
    ///
    /// Tolerant of missing fields; drops entries without a sender or body,
    /// non-direct chats (groups, broadcasts) and media-only messages.
    pub fn parse_webhook_payload(payload: &serde_json::Value) -> Vec<ChannelMessage> {
        let mut messages = Vec::new();

        let Some(entries) = payload.get("messages").and_then(|m| m.as_array()) else {
            return messages;
        };

        for entry in entries {
            let Some(from) = entry.get("from").and_then(|f| f.as_str()) else {
                continue;
            };

            if !is_direct_chat(from) {
                tracing::debug!(from, "ignoring message from non-direct chat");
                continue;
            }

            let body = entry
                .get("body")
                .and_then(|b| b.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if body.is_empty() {
                tracing::debug!(from, "skipping message without text body");
                continue;
            }

            let timestamp = entry
                .get("timestamp")
                .and_then(|t| t.as_i64())
                .map(|secs| secs * 1000)
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

            messages.push(ChannelMessage {
                id: entry
                    .get("id")
                    .and_then(|i| i.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                sender: from.to_string(),
                push_name: entry
                    .get("notifyName")
                    .and_then(|n| n.as_str())
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                body,
                timestamp,
            });
        }

        messages
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/api/{endpoint}", self.base_url);

        let mut request = self.client.post(&url).json(&body);
        if !self.api_token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_token));
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(BotError::SendFailed(format!(
                "gateway {endpoint} returned {status}: {error}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for WhatsAppGateway {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.post(
            "sendText",
            serde_json::json!({ "chatId": to, "text": text }),
        )
        .await?;
        tracing::debug!(to, "text reply sent");
        Ok(())
    }

    async fn send_image(&self, to: &str, data: Vec<u8>, caption: &str) -> Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.post(
            "sendImage",
            serde_json::json!({
                "chatId": to,
                "mimetype": "image/png",
                "data": encoded,
                "caption": caption,
            }),
        )
        .await?;
        tracing::debug!(to, "image reply sent");
        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<()> {
        self.post("sendTyping", serde_json::json!({ "chatId": to }))
            .await
    }
}
