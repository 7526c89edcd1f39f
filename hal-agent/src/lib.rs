//! Subprocess client for the opencode CLI agent.
//!
//! The bridge depends only on [`AgentRunner`]; [`OpencodeClient`] is the
//! production implementation and tests substitute scripted runners.

mod client;
mod error;
mod stream;
mod types;

pub use client::{AgentRunner, OpencodeClient};
pub use error::{AgentError, FALLBACK_REPLY, Result, SYSTEM_ERROR_REPLY, TIMEOUT_REPLY};
pub use stream::{ParsedStream, parse_event_stream};
pub use types::{AgentReply, AgentRequest, EventPart, StreamEvent};
