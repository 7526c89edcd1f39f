use crate::traits::ChannelAdapter;
use crate::types::OutboundMessage;
use std::time::Duration;

/// Outcome of a chunked send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkedSendReport {
    pub sent: usize,
    pub failed: usize,
}

/// Split `body` into pieces of at most `max_chars` characters, preserving order.
pub fn chunk_text(body: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for ch in body.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send `body` as sequential chunks with a fixed delay after each one.
///
/// Chunks are independent: a failed chunk is logged and the remaining chunks
/// are still attempted. Nothing is retried.
#[tracing::instrument(level = "info", skip_all, fields(channel = adapter.channel_id(), recipient = %recipient_id))]
pub async fn send_chunked(
    adapter: &dyn ChannelAdapter,
    recipient_id: &str,
    body: &str,
    chunk_delay: Duration,
) -> ChunkedSendReport {
    let mut report = ChunkedSendReport::default();
    let chunks = chunk_text(body, adapter.max_message_chars());
    let total = chunks.len();
    for (index, chunk) in chunks.into_iter().enumerate() {
        match adapter
            .send(recipient_id, OutboundMessage::text(chunk))
            .await
        {
            Ok(()) => report.sent += 1,
            Err(error) => {
                report.failed += 1;
                tracing::error!(%error, chunk = index + 1, total, "chunk send failed");
            }
        }
        if !chunk_delay.is_zero() {
            tokio::time::sleep(chunk_delay).await;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct RecordingAdapter {
        max_chars: usize,
        fail_on: Option<usize>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn channel_id(&self) -> &str {
            "recording"
        }

        async fn send(&self, _recipient_id: &str, message: OutboundMessage) -> anyhow::Result<()> {
            let mut sent = self.sent.lock().unwrap();
            let attempt = sent.len();
            sent.push(message.content);
            if self.fail_on == Some(attempt) {
                return Err(anyhow!("boom"));
            }
            Ok(())
        }

        fn max_message_chars(&self) -> usize {
            self.max_chars
        }
    }

    #[test]
    fn chunks_respect_character_boundaries() {
        assert_eq!(chunk_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk_text("héllo", 2), vec!["hé", "ll", "o"]);
        assert!(chunk_text("", 10).is_empty());
        assert_eq!(chunk_text("abc", 3), vec!["abc"]);
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_later_chunks() {
        let adapter = RecordingAdapter {
            max_chars: 2,
            fail_on: Some(1),
            sent: Mutex::new(Vec::new()),
        };
        let report = send_chunked(&adapter, "whatsapp:+1", "aabbcc", Duration::ZERO).await;
        assert_eq!(report, ChunkedSendReport { sent: 2, failed: 1 });
        assert_eq!(*adapter.sent.lock().unwrap(), vec!["aa", "bb", "cc"]);
    }
}
