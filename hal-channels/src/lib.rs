//! Channel adapters for the HAL bridge.
//!
//! Adapters are pure I/O: they convert platform messages to/from
//! `InboundMessage` / `OutboundMessage`. Session logic lives in `hal-app`.

mod outbound;
mod traits;
mod twilio;
mod types;

pub use outbound::{ChunkedSendReport, chunk_text, send_chunked};
pub use traits::{ChannelAdapter, InboundSource};
pub use twilio::TwilioWhatsAppAdapter;
pub use types::{Address, InboundMessage, MessageDirection, MessageId, OutboundMessage};
