use crate::types::StreamEvent;

const LOG_LINE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStream {
    /// Concatenated `text` parts, trimmed.
    pub text: String,
    /// First non-empty `sessionID` seen in the stream.
    pub session_id: Option<String>,
    pub skipped_lines: usize,
}

/// Parse newline-delimited JSON events emitted by `opencode run --format=json`.
///
/// Malformed lines are skipped with a warning.
pub fn parse_event_stream(stdout: &str) -> ParsedStream {
    let mut parsed = ParsedStream::default();
    let mut text = String::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: StreamEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(error) => {
                parsed.skipped_lines += 1;
                let preview: String = line.chars().take(LOG_LINE_PREVIEW_CHARS).collect();
                tracing::warn!(%error, line = %preview, "skipping malformed agent event line");
                continue;
            }
        };

        if parsed.session_id.is_none() {
            parsed.session_id = event.session_id.filter(|id| !id.is_empty());
        }

        if event.kind.as_deref() == Some("text") {
            if let Some(fragment) = event.part.and_then(|part| part.text) {
                text.push_str(&fragment);
            }
        }
    }

    parsed.text = text.trim().to_string();
    parsed
}
