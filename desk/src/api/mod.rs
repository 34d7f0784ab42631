//! Backend client contract.
//!
//! The desk talks to the backend only through [`SupportApi`] and
//! [`MessageApi`]. Every response is wrapped in an [`ApiEnvelope`]; non-2xx
//! statuses and `success: false` both surface as [`ApiError`].
//!
//! The traits return boxed futures so they can be used as trait objects
//! (`Arc<dyn SupportApi>`), which is how services hold them.

use crate::delivery::OutgoingMessage;
use crate::device::DeviceInfo;
use crate::error::ApiError;
use crate::types::{
    Category, ConversationId, Message, MessageStatus, Note, Priority, Ticket, TicketAnalytics,
    TicketId,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Response envelope
pub mod envelope;

/// reqwest-backed implementation
pub mod http;

pub use envelope::ApiEnvelope;
pub use http::HttpBackend;

/// Result of a backend call
pub type ApiResult<T> = Result<T, ApiError>;

/// Ticket creation request body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    /// Requester
    pub user_id: String,
    /// Category
    pub category: Category,
    /// Priority
    pub priority: Priority,
    /// Short summary
    pub title: String,
    /// Full description
    pub description: String,
    /// Diagnostic context, passed through untouched
    pub device_info: DeviceInfo,
}

/// Human handoff request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    /// Conversation to hand off
    pub conversation_id: ConversationId,
    /// Requesting user
    pub user_id: String,
    /// Why the user wants a human
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Backend acknowledgement of an escalation request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationReceipt {
    /// Ticket opened for the handoff
    #[serde(default)]
    pub ticket_id: Option<TicketId>,
    /// Position in the agent queue
    #[serde(default)]
    pub queue_position: Option<u32>,
    /// Estimated wait in seconds
    #[serde(default)]
    pub estimated_wait_time: Option<u64>,
}

/// Ticket endpoints
pub trait SupportApi: Send + Sync {
    /// Create a ticket; it starts `pending`
    fn create_ticket<'a>(&'a self, ticket: &'a NewTicket) -> BoxFuture<'a, ApiResult<Ticket>>;

    /// Tickets waiting for an agent
    fn list_pending(&self) -> BoxFuture<'_, ApiResult<Vec<Ticket>>>;

    /// Tickets held by `agent_id`
    fn list_assigned<'a>(&'a self, agent_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Ticket>>>;

    /// Current copy of one ticket
    fn get_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>>;

    /// Claim a pending ticket; the backend arbitrates concurrent claims
    fn assign_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>>;

    /// Resolve an assigned ticket
    fn resolve_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
        resolution: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>>;

    /// Append an internal note
    fn add_note<'a>(&'a self, ticket_id: &'a TicketId, content: &'a str)
        -> BoxFuture<'a, ApiResult<Note>>;

    /// Archive a ticket
    fn close_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>>;

    /// Aggregated statistics
    fn analytics(&self) -> BoxFuture<'_, ApiResult<TicketAnalytics>>;

    /// Ask for a human agent
    fn request_escalation<'a>(
        &'a self,
        request: &'a EscalationRequest,
    ) -> BoxFuture<'a, ApiResult<EscalationReceipt>>;
}

/// Message endpoints
pub trait MessageApi: Send + Sync {
    /// Persist a message and return it with its permanent id
    fn create_message<'a>(&'a self, message: &'a OutgoingMessage)
        -> BoxFuture<'a, ApiResult<Message>>;

    /// Messages of a conversation, oldest first
    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>>;

    /// Mark every message addressed to `reader` in the conversation as read
    fn mark_read<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        reader: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>>;

    /// Overwrite a message's delivery status
    fn update_status<'a>(
        &'a self,
        message_id: &'a str,
        status: &'a MessageStatus,
    ) -> BoxFuture<'a, ApiResult<Message>>;

    /// Delete a message
    fn delete_message<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, ApiResult<()>>;
}
