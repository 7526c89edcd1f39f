use serde::{Deserialize, Serialize};

/// One agent invocation.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub prompt: &'a str,
    /// Existing conversation handle to continue, if any.
    pub session_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub text: String,
    /// Conversation handle reported by the agent; may differ from the one requested.
    pub session_id: Option<String>,
}

/// A single record of the agent's `--format=json` output stream.
///
/// Only the fields the bridge consumes are modelled; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub part: Option<EventPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPart {
    #[serde(default)]
    pub text: Option<String>,
}
