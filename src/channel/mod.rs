//! Chat transport types and the outbound trait.
//!
//! The WhatsApp connection itself (pairing, delivery, receipts) lives in an
//! external gateway process; this crate only parses its webhook payloads
//! and calls its HTTP API. The router talks to the transport through
//! [`ChatTransport`] so tests can substitute a recording fake.

pub mod routes;
pub mod whatsapp;

use crate::error::Result;
use async_trait::async_trait;

/// Direct (one-to-one) chat JIDs end with this suffix; group and broadcast
/// JIDs do not and are ignored.
pub const DIRECT_CHAT_SUFFIX: &str = "@c.us";

/// Whether a JID denotes a direct conversation.
pub fn is_direct_chat(jid: &str) -> bool {
    jid.ends_with(DIRECT_CHAT_SUFFIX)
}

/// An inbound text message from the gateway.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Gateway-assigned message ID
    pub id: String,
    /// Sender JID (e.g. `5581999999999@c.us`)
    pub sender: String,
    /// Display name the sender set for themselves, when the gateway knows it
    pub push_name: Option<String>,
    /// Message text
    pub body: String,
    /// Unix millis
    pub timestamp: i64,
}

impl ChannelMessage {
    /// First word of the sender's display name, for greeting them.
    pub fn first_name(&self) -> Option<&str> {
        self.push_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
    }
}

/// Outbound message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    /// Plain text
    Text { text: String },
    /// Inline PNG with a caption
    Image { data: Vec<u8>, caption: String },
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain-text reply.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Send an inline image with a caption.
    async fn send_image(&self, to: &str, data: Vec<u8>, caption: &str) -> Result<()>;

    /// Show the typing indicator in the recipient's chat.
    async fn send_typing(&self, to: &str) -> Result<()>;
}
