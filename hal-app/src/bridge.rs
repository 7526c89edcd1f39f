//! Conversation bridge: turns an ordinary chat message into an agent turn.

use crate::audit::AuditAction;
use crate::commands::Handled;
use crate::session::SessionRegistry;
use hal_agent::{AgentRequest, AgentRunner};
use std::path::Path;
use std::sync::Arc;

pub struct ConversationBridge {
    registry: Arc<SessionRegistry>,
    runner: Arc<dyn AgentRunner>,
    identity: String,
}

impl ConversationBridge {
    pub fn new(
        registry: Arc<SessionRegistry>,
        runner: Arc<dyn AgentRunner>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            runner,
            identity: identity.into(),
        }
    }

    /// Run one turn for `sender`. Agent failures become a fallback reply;
    /// this never fails.
    #[tracing::instrument(level = "info", skip_all, fields(sender = %sender))]
    pub async fn run_turn(&self, sender: &str, text: &str) -> Handled {
        let existing = self.registry.get_session(sender).await;
        let is_new_session = existing.is_none();

        // The agent keeps history per handle, so the identity only goes into
        // the first prompt of a conversation.
        let prompt = match existing {
            Some(_) => text.to_string(),
            None => build_prompt(&self.identity, text),
        };

        let (mut response, returned_handle, error) = match self
            .runner
            .invoke(AgentRequest {
                prompt: &prompt,
                session_id: existing.as_deref(),
            })
            .await
        {
            Ok(reply) => (reply.text, reply.session_id, None),
            Err(e) => {
                tracing::warn!(%e, "agent invocation failed; sending fallback");
                (e.fallback_reply().to_string(), None, Some(e.to_string()))
            }
        };

        if is_new_session {
            if let Some(handle) = &returned_handle {
                self.registry.save_session(sender, handle).await;
            }
        }

        let session_id = returned_handle.or(existing);
        if is_new_session {
            if let Some(handle) = &session_id {
                response = format!("[New session: {handle}]\n\n{response}");
            }
        }

        Handled {
            action: AuditAction::Message {
                model: self.runner.model().to_string(),
                session_id,
                new_session: is_new_session,
                prompt_len: prompt.chars().count(),
                response_len: response.chars().count(),
                response: response.clone(),
                error,
            },
            reply: response,
        }
    }
}

/// First-turn prompt: identity, fixed instructions, then the user's text.
/// An empty identity leaves the text untouched.
pub fn build_prompt(identity: &str, user_text: &str) -> String {
    if identity.is_empty() {
        return user_text.to_string();
    }
    format!(
        "{identity}\n\n\
         Instructions: Follow the principles and behavior rules above. \
         Reply to the user message.\n\n\
         User message:\n{user_text}"
    )
}

/// Read the identity preamble; a missing or unreadable file yields "".
pub async fn load_identity(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            tracing::error!(identity_path = %path.display(), %e, "error reading identity file");
            String::new()
        }
    }
}
