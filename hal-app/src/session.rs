//! Session registry: sender -> opencode conversation handle, plus aliases.
//!
//! Every operation is load-mutate-save on the [`StateStore`].

use crate::state::StateStore;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    store: StateStore,
    handle_prefix: String,
    agent_storage_dir: PathBuf,
}

impl SessionRegistry {
    pub fn new(
        store: StateStore,
        handle_prefix: impl Into<String>,
        agent_storage_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            store,
            handle_prefix: handle_prefix.into(),
            agent_storage_dir: agent_storage_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn get_session(&self, sender: &str) -> Option<String> {
        self.store.load().await.sessions.get(sender).cloned()
    }

    pub async fn save_session(&self, sender: &str, handle: &str) {
        let mut doc = self.store.load().await;
        doc.sessions.insert(sender.to_string(), handle.to_string());
        self.store.save(&doc).await;
        tracing::info!(sender = %sender, session_id = %handle, "saved session");
    }

    /// Forget the sender's session; returns the handle that was removed.
    pub async fn clear_session(&self, sender: &str) -> Option<String> {
        let mut doc = self.store.load().await;
        let old = doc.sessions.remove(sender)?;
        self.store.save(&doc).await;
        tracing::info!(sender = %sender, session_id = %old, "cleared session");
        Some(old)
    }

    pub async fn set_alias(&self, name: &str, handle: &str) {
        let mut doc = self.store.load().await;
        doc.aliases.insert(name.to_lowercase(), handle.to_string());
        self.store.save(&doc).await;
        tracing::info!(alias = %name, session_id = %handle, "saved alias");
    }

    pub async fn get_alias(&self, name: &str) -> Option<String> {
        self.store
            .load()
            .await
            .aliases
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Reverse lookup. When several aliases point at the same handle, which
    /// one is returned is unspecified.
    pub async fn alias_for_handle(&self, handle: &str) -> Option<String> {
        self.store
            .load()
            .await
            .aliases
            .into_iter()
            .find(|(_, target)| target == handle)
            .map(|(name, _)| name)
    }

    /// A token carrying the handle prefix is taken verbatim; anything else is
    /// looked up as an alias.
    pub async fn resolve(&self, token: &str) -> Option<String> {
        if token.starts_with(&self.handle_prefix) {
            return Some(token.to_string());
        }
        self.get_alias(token).await
    }

    /// Whether opencode still has `<storage>/session/*/<handle>.json`.
    pub async fn exists_on_disk(&self, handle: &str) -> bool {
        let root = self.agent_storage_dir.join("session");
        let handle = handle.to_string();
        tokio::task::spawn_blocking(move || session_file_exists(&root, &handle))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "session existence check panicked");
                false
            })
    }

    /// `"alias" (handle)` when an alias exists, else the bare handle.
    pub async fn format_for_display(&self, handle: &str) -> String {
        match self.alias_for_handle(handle).await {
            Some(alias) => format!("\"{alias}\" ({handle})"),
            None => handle.to_string(),
        }
    }
}

fn session_file_exists(root: &Path, handle: &str) -> bool {
    if handle.is_empty() || handle.contains(['/', '\\']) {
        return false;
    }
    let file_name = format!("{handle}.json");
    WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_str() == Some(file_name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &Path) -> SessionRegistry {
        SessionRegistry::new(
            StateStore::new(dir.join("state.json")),
            "ses_",
            dir.join("opencode-storage"),
        )
    }

    #[tokio::test]
    async fn sessions_are_absent_until_saved() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert!(reg.get_session("whatsapp:+1").await.is_none());

        reg.save_session("whatsapp:+1", "ses_123").await;
        assert_eq!(
            reg.get_session("whatsapp:+1").await.as_deref(),
            Some("ses_123")
        );
        assert!(reg.get_session("whatsapp:+2").await.is_none());
    }

    #[tokio::test]
    async fn clear_session_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.save_session("a", "ses_1").await;

        assert_eq!(reg.clear_session("a").await.as_deref(), Some("ses_1"));
        assert!(reg.clear_session("a").await.is_none());
        assert!(reg.get_session("a").await.is_none());
    }

    #[tokio::test]
    async fn aliases_are_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.set_alias("Foo", "ses_9").await;

        assert_eq!(reg.get_alias("foo").await.as_deref(), Some("ses_9"));
        assert_eq!(reg.get_alias("FOO").await.as_deref(), Some("ses_9"));
        assert_eq!(reg.alias_for_handle("ses_9").await.as_deref(), Some("foo"));
        assert!(reg.alias_for_handle("ses_other").await.is_none());
    }

    #[tokio::test]
    async fn resolve_prefers_handle_syntax_over_alias() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.set_alias("ses_abc", "ses_from_alias").await;
        reg.set_alias("work", "ses_123").await;

        assert_eq!(reg.resolve("ses_abc").await.as_deref(), Some("ses_abc"));
        assert_eq!(reg.resolve("Work").await.as_deref(), Some("ses_123"));
        assert!(reg.resolve("home").await.is_none());
    }

    #[tokio::test]
    async fn display_includes_alias_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert_eq!(reg.format_for_display("ses_1").await, "ses_1");
        reg.set_alias("Work", "ses_1").await;
        assert_eq!(reg.format_for_display("ses_1").await, "\"work\" (ses_1)");
    }

    #[tokio::test]
    async fn exists_on_disk_matches_any_project_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let project_dir = tmp
            .path()
            .join("opencode-storage")
            .join("session")
            .join("project-a");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("ses_live.json"), "{}").unwrap();
        std::fs::write(
            tmp.path()
                .join("opencode-storage")
                .join("session")
                .join("ses_toplevel.json"),
            "{}",
        )
        .unwrap();

        assert!(reg.exists_on_disk("ses_live").await);
        assert!(!reg.exists_on_disk("ses_gone").await);
        assert!(!reg.exists_on_disk("ses_toplevel").await);
        assert!(!reg.exists_on_disk("../project-a/ses_live").await);
    }

    #[tokio::test]
    async fn exists_on_disk_is_false_without_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert!(!reg.exists_on_disk("ses_live").await);
    }
}
