//! Chat command parser and handlers.
//!
//! Commands are fixed literal prefixes matched case-insensitively on the
//! trimmed body, in priority order: `--id`, `--rename`, reset, `--resume`.
//! Anything else is a conversational turn.

use crate::audit::AuditAction;
use crate::session::SessionRegistry;

const ID_COMMAND: &str = "--id";
const RENAME_PREFIX: &str = "--rename";
const RESUME_PREFIX: &str = "--resume";
const RESUME_ID_PREFIX: &str = "id:";
const RESET_COMMANDS: &[&str] = &["--new", "--!reset", "--!new", "!reset", "!new"];

/// Reply text plus the audit entry describing what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub reply: String,
    pub action: AuditAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Inspect,
    Rename { name: &'a str },
    Reset,
    Resume { token: &'a str },
    Turn,
}

pub fn parse_command(body: &str) -> ChatCommand<'_> {
    let trimmed = body.trim();
    let lower = trimmed.to_lowercase();

    if lower == ID_COMMAND {
        return ChatCommand::Inspect;
    }
    if let Some(rest) = strip_prefix_ignore_ascii_case(trimmed, RENAME_PREFIX) {
        return ChatCommand::Rename { name: rest.trim() };
    }
    if RESET_COMMANDS.contains(&lower.as_str()) {
        return ChatCommand::Reset;
    }
    if let Some(rest) = strip_prefix_ignore_ascii_case(trimmed, RESUME_PREFIX) {
        let rest = rest.trim();
        let token = strip_prefix_ignore_ascii_case(rest, RESUME_ID_PREFIX)
            .map(str::trim)
            .unwrap_or(rest);
        return ChatCommand::Resume { token };
    }
    ChatCommand::Turn
}

/// Run a control command for `sender`. Returns `None` for conversational turns.
pub async fn handle_command(
    registry: &SessionRegistry,
    sender: &str,
    body: &str,
) -> Option<Handled> {
    let handled = match parse_command(body) {
        ChatCommand::Inspect => inspect(registry, sender).await,
        ChatCommand::Rename { name } => rename(registry, sender, name).await,
        ChatCommand::Reset => reset(registry, sender).await,
        ChatCommand::Resume { token } => resume(registry, sender, token).await,
        ChatCommand::Turn => return None,
    };
    Some(handled)
}

async fn inspect(registry: &SessionRegistry, sender: &str) -> Handled {
    let current = registry.get_session(sender).await;
    let reply = match &current {
        Some(handle) => format!(
            "Current session: {}",
            registry.format_for_display(handle).await
        ),
        None => "No active session. Send a message to start one.".to_string(),
    };
    Handled {
        reply,
        action: AuditAction::SessionInspect {
            session_id: current,
        },
    }
}

async fn rename(registry: &SessionRegistry, sender: &str, name: &str) -> Handled {
    let current = registry.get_session(sender).await;
    let reply = match &current {
        None => "No active session to rename.".to_string(),
        Some(_) if name.is_empty() => "Usage: --rename <name>".to_string(),
        Some(handle) => {
            registry.set_alias(name, handle).await;
            format!("Session renamed to \"{name}\"\n({handle})")
        }
    };
    Handled {
        reply,
        action: AuditAction::SessionRename {
            session_id: current,
            alias: non_empty(name),
        },
    }
}

async fn reset(registry: &SessionRegistry, sender: &str) -> Handled {
    let old = registry.clear_session(sender).await;
    let mut reply = "Session cleared. Send a message to start fresh.".to_string();
    if let Some(old) = &old {
        reply.push_str(&format!(
            "\n(Previous: {})",
            registry.format_for_display(old).await
        ));
    }
    Handled {
        reply,
        action: AuditAction::SessionReset { old_session: old },
    }
}

async fn resume(registry: &SessionRegistry, sender: &str, token: &str) -> Handled {
    let mut resumed = None;
    let reply = if token.is_empty() {
        "Usage: --resume <session_id or alias>".to_string()
    } else {
        match registry.resolve(token).await {
            None => format!("Alias \"{token}\" not found."),
            Some(handle) if !registry.exists_on_disk(&handle).await => {
                format!("Session {handle} not found on disk.")
            }
            Some(handle) => {
                registry.save_session(sender, &handle).await;
                let display = registry.format_for_display(&handle).await;
                resumed = Some(handle);
                format!("Session resumed: {display}\nSend a message to continue.")
            }
        }
    };
    Handled {
        reply,
        action: AuditAction::SessionResume {
            target_input: non_empty(token),
            resumed,
        },
    }
}

fn strip_prefix_ignore_ascii_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
