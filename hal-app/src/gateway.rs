//! Poll loop: inbound source -> command dispatch / agent bridge -> channel.
//!
//! Messages are handled strictly one at a time in send order, and the
//! watermark is persisted after each one.

use crate::audit::{AuditRecord, AuditTrail};
use crate::bridge::ConversationBridge;
use crate::commands::{self, Handled};
use crate::session::SessionRegistry;
use crate::state::StateStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use hal_channels::{ChannelAdapter, InboundMessage, InboundSource, send_chunked};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub lookback: chrono::Duration,
    pub page_size: usize,
    pub chunk_delay: Duration,
}

pub struct Gateway {
    settings: PollSettings,
    source: Arc<dyn InboundSource>,
    channel: Arc<dyn ChannelAdapter>,
    state: StateStore,
    registry: Arc<SessionRegistry>,
    bridge: ConversationBridge,
    audit: AuditTrail,
}

impl Gateway {
    pub fn new(
        settings: PollSettings,
        source: Arc<dyn InboundSource>,
        channel: Arc<dyn ChannelAdapter>,
        state: StateStore,
        registry: Arc<SessionRegistry>,
        bridge: ConversationBridge,
        audit: AuditTrail,
    ) -> Self {
        Self {
            settings,
            source,
            channel,
            state,
            registry,
            bridge,
            audit,
        }
    }

    /// Poll until `shutdown` fires. Batch failures are logged and retried on
    /// the next tick.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_loop(&self, shutdown: CancellationToken) -> Result<()> {
        let mut watermark = match self.state.last_processed_time().await {
            Some(ts) => ts,
            None => Utc::now(),
        };
        tracing::info!(watermark = %watermark, "resuming from watermark");

        loop {
            if let Err(e) = self.poll_once(&mut watermark).await {
                tracing::error!(%e, "error in poll loop");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("poll loop stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Fetch and process one batch, advancing `watermark` per message.
    pub async fn poll_once(&self, watermark: &mut DateTime<Utc>) -> Result<usize> {
        let since = *watermark - self.settings.lookback;
        let listed = self
            .source
            .list_recent(since, self.settings.page_size)
            .await?;
        let batch = select_new_messages(listed, *watermark);
        let processed = batch.len();

        for (sent_at, inbound) in batch {
            self.handle_inbound(&inbound, sent_at).await;
            *watermark = self.state.advance_watermark(sent_at).await;
        }
        Ok(processed)
    }

    #[tracing::instrument(level = "info", skip_all, fields(message_id = %inbound.message_id))]
    async fn handle_inbound(&self, inbound: &InboundMessage, sent_at: DateTime<Utc>) {
        let sender = inbound.from.as_str();
        let text = inbound.body.trim();
        tracing::info!(sender = %sender, body = %text, "received message");

        let Handled { reply, action } =
            match commands::handle_command(&self.registry, sender, text).await {
                Some(handled) => handled,
                None => self.bridge.run_turn(sender, text).await,
            };
        tracing::info!(action = action.name(), reply_len = reply.len(), "message handled");

        self.audit
            .append(&AuditRecord {
                ts: Utc::now(),
                from: sender.to_string(),
                to: inbound.to.to_string(),
                inbound_ts: sent_at,
                inbound: text.to_string(),
                action,
            })
            .await;

        let report =
            send_chunked(self.channel.as_ref(), sender, &reply, self.settings.chunk_delay).await;
        if report.failed > 0 {
            tracing::warn!(
                sent = report.sent,
                failed = report.failed,
                "reply partially delivered"
            );
        }
    }
}

/// Inbound messages strictly newer than `watermark`, oldest first. Messages
/// without a send timestamp are skipped.
pub fn select_new_messages(
    messages: Vec<InboundMessage>,
    watermark: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, InboundMessage)> {
    let mut out: Vec<(DateTime<Utc>, InboundMessage)> = messages
        .into_iter()
        .filter(InboundMessage::is_inbound)
        .filter_map(|msg| msg.sent_at.map(|ts| (ts, msg)))
        .filter(|(ts, _)| *ts > watermark)
        .collect();
    out.sort_by_key(|(ts, _)| *ts);
    out
}
