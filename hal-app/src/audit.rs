//! Append-only audit trail: one JSON line per processed inbound message.

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub inbound_ts: DateTime<Utc>,
    pub inbound: String,
    #[serde(flatten)]
    pub action: AuditAction,
}

/// What the bridge did with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    SessionInspect {
        session_id: Option<String>,
    },
    SessionRename {
        session_id: Option<String>,
        alias: Option<String>,
    },
    SessionReset {
        old_session: Option<String>,
    },
    SessionResume {
        target_input: Option<String>,
        /// Handle the sender is now attached to, when the resume succeeded.
        resumed: Option<String>,
    },
    Message {
        model: String,
        session_id: Option<String>,
        new_session: bool,
        prompt_len: usize,
        response_len: usize,
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AuditAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionInspect { .. } => "session_inspect",
            Self::SessionRename { .. } => "session_rename",
            Self::SessionReset { .. } => "session_reset",
            Self::SessionResume { .. } => "session_resume",
            Self::Message { .. } => "message",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditTrail {
    path: PathBuf,
}

impl AuditTrail {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append one record. Failures are logged; the trail never blocks processing.
    pub async fn append(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(%e, "failed to encode audit record");
                return;
            }
        };
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || append_line(&path, &line)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(audit_path = %self.path.display(), %e, "error writing audit trail");
            }
            Err(e) => tracing::error!(%e, "audit append task failed"),
        }
    }
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut lock = RwLock::new(file);
    let mut guard = lock
        .write()
        .map_err(|e| anyhow::anyhow!("lock failed: {e}"))?;
    writeln!(*guard, "{line}")?;
    Ok(())
}
