use crate::types::{InboundMessage, OutboundMessage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier, e.g. "whatsapp".
    fn channel_id(&self) -> &str;

    /// Send a single message to a recipient address on this platform.
    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()>;

    /// Largest body a single `send` accepts, in characters.
    fn max_message_chars(&self) -> usize {
        1500
    }
}

/// Poll-based inbound listing.
#[async_trait]
pub trait InboundSource: Send + Sync {
    /// Messages addressed to this channel's own address that were sent after
    /// `sent_after`, newest first, at most `limit` of them. Results may
    /// include outbound messages; callers filter on direction.
    async fn list_recent(
        &self,
        sent_after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InboundMessage>>;
}
