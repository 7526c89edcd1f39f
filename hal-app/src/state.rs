//! Persistent bridge state: watermark, sender sessions and aliases.
//!
//! The whole document is read and rewritten on every mutation. There is no
//! locking: at most one bridge process may use a given state path.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_time: Option<DateTime<Utc>>,
    /// Sender address -> conversation handle.
    #[serde(default)]
    pub sessions: BTreeMap<String, String>,
    /// Lowercased alias -> conversation handle.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; empty when absent or unreadable.
    pub async fn load(&self) -> StateDocument {
        match self.try_load().await {
            Ok(Some(doc)) => doc,
            Ok(None) => StateDocument::default(),
            Err(e) => {
                tracing::error!(state_path = %self.path.display(), %e, "error reading state file");
                StateDocument::default()
            }
        }
    }

    /// Best-effort full overwrite; failures are logged.
    pub async fn save(&self, doc: &StateDocument) {
        if let Err(e) = self.try_save(doc).await {
            tracing::error!(state_path = %self.path.display(), %e, "error saving state file");
        }
    }

    pub async fn last_processed_time(&self) -> Option<DateTime<Utc>> {
        self.load().await.last_processed_time
    }

    /// Move the watermark to `ts` unless it already is at or beyond it.
    /// Returns the watermark now in effect.
    pub async fn advance_watermark(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let mut doc = self.load().await;
        match doc.last_processed_time {
            Some(current) if current >= ts => current,
            _ => {
                doc.last_processed_time = Some(ts);
                self.save(&doc).await;
                ts
            }
        }
    }

    async fn try_load(&self) -> Result<Option<StateDocument>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("read {}: {e}", self.path.display())),
        };
        let doc = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse {}: {e}", self.path.display()))?;
        Ok(Some(doc))
    }

    /// Write to a sibling temp file and rename it over the target, so readers
    /// never observe a half-written document.
    async fn try_save(&self, doc: &StateDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("create state dir {}: {e}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(doc)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| anyhow::anyhow!("write {}: {e}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| anyhow::anyhow!("rename {} into place: {e}", tmp.display()))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn missing_file_loads_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        assert_eq!(store.load().await, StateDocument::default());
        assert!(store.last_processed_time().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = StateStore::new(&path);
        assert_eq!(store.load().await, StateDocument::default());
    }

    #[tokio::test]
    async fn save_creates_parent_dirs_and_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("nested").join("state.json"));
        let mut doc = StateDocument::default();
        doc.sessions
            .insert("whatsapp:+1".to_string(), "ses_1".to_string());
        doc.aliases.insert("work".to_string(), "ses_1".to_string());
        store.save(&doc).await;

        assert_eq!(store.load().await, doc);
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn reads_documents_with_offset_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"last_processed_time": "2025-01-02T03:04:05+00:00", "sessions": {"a": "ses_1"}}"#,
        )
        .unwrap();
        let doc = StateStore::new(&path).load().await;
        assert_eq!(
            doc.last_processed_time,
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(doc.sessions.get("a").map(String::as_str), Some("ses_1"));
        assert!(doc.aliases.is_empty());
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 2).unwrap();

        assert_eq!(store.advance_watermark(t2).await, t2);
        assert_eq!(store.advance_watermark(t1).await, t2);
        assert_eq!(store.last_processed_time().await, Some(t2));
    }

    #[tokio::test]
    async fn watermark_update_preserves_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let mut doc = StateDocument::default();
        doc.sessions.insert("a".to_string(), "ses_1".to_string());
        store.save(&doc).await;

        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store.advance_watermark(t).await;
        let doc = store.load().await;
        assert_eq!(doc.last_processed_time, Some(t));
        assert_eq!(doc.sessions.len(), 1);
    }
}
