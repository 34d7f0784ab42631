//! Message delivery over two transports.
//!
//! A message is first offered to the realtime channel. If the channel is not
//! connected, reports a failure, or does not acknowledge within
//! [`REALTIME_ACK_TIMEOUT`], the same message is created through the reliable
//! request/response API instead:
//!
//! ```text
//!            ┌────────────── FallbackTransport ──────────────┐
//! send ────▶ │ RealtimeTransport ──ack within 3 s──▶ Delivery │
//!            │        │ not connected / failed / timeout      │
//!            │        ▼                                       │
//!            │ ReliableTransport ──────────────────▶ Delivery │
//!            └───────────────────────────────────────────────┘
//! ```
//!
//! Each transport returns the permanent [`Message`] and the [`Route`] it took;
//! reconciling the temporary entry is left to the caller.

use crate::error::ApiError;
use crate::types::{ConversationId, Message};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Realtime-first composition
pub mod fallback;

/// Realtime channel transport
pub mod realtime;

/// Request/response transport
pub mod reliable;

pub use fallback::FallbackTransport;
pub use realtime::{LocalRealtimeChannel, RealtimeChannel, RealtimeEvent, RealtimeTransport};
pub use reliable::ReliableTransport;

/// How long the realtime channel has to acknowledge a message.
///
/// Fixed; not adaptive and not configurable.
pub const REALTIME_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// A message on its way out, still identified by its temporary id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Local id, echoed back on reconciliation
    pub temporary_id: String,
    /// Target conversation
    pub conversation_id: ConversationId,
    /// Author
    pub sender: String,
    /// Addressee
    pub recipient: String,
    /// Body
    pub content: String,
    /// `text`, `image`, ...
    #[serde(rename = "type", default = "crate::types::default_message_kind")]
    pub kind: String,
}

/// Which transport confirmed a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Acknowledged over the realtime channel
    Realtime,
    /// Created through the request/response API
    Reliable,
}

impl Route {
    /// Metric / log label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Reliable => "reliable",
        }
    }
}

/// A confirmed delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// The permanent message
    pub message: Message,
    /// Transport that confirmed it
    pub route: Route,
}

/// Delivery failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The realtime channel is down
    #[error("Realtime channel is not connected")]
    NotConnected,

    /// The realtime peer refused the message
    #[error("Message was rejected: {0}")]
    Rejected(String),

    /// The realtime channel closed while waiting for the acknowledgement
    #[error("Realtime channel closed before acknowledging the message")]
    ChannelClosed,

    /// The realtime channel did not acknowledge in time
    #[error("Realtime channel did not acknowledge within {0:?}")]
    Timeout(Duration),

    /// The reliable transport failed
    #[error("Failed to send message: {0}")]
    Reliable(#[from] ApiError),
}

/// A way of getting a message to the backend
pub trait MessageTransport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Deliver `message` and return its permanent form
    fn deliver<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, Result<Delivery, DeliveryError>>;
}
