//! Domain types for the support desk.
//!
//! Identifiers, tickets and their lifecycle, conversation escalation status,
//! and messages. Every type serializes with camelCase field names to match the
//! backend payloads carried on the event hub.

use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a support ticket (assigned by the backend)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wrap a backend identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a two-party conversation.
///
/// Derived from the participants, never assigned: both sides compute the same
/// value without a handshake.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// The conversation between two users: the sorted pair joined by `_`.
    ///
    /// ```
    /// use support_desk::types::ConversationId;
    ///
    /// let a = ConversationId::between("u2", "u1");
    /// let b = ConversationId::between("u1", "u2");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str(), "u1_u2");
    /// ```
    #[must_use]
    pub fn between(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}_{second}"))
    }

    /// Wrap an identifier received from the backend
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Shorthand for [`ConversationId::between`]
#[must_use]
pub fn conversation_id(a: &str, b: &str) -> ConversationId {
    ConversationId::between(a, b)
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Waiting for an agent
    Pending,
    /// Claimed by an agent
    Assigned,
    /// Closed by the agent with resolution notes
    Resolved,
    /// Archived (terminal)
    Closed,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Ticket priority
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low
    Low,
    /// Medium (default)
    #[default]
    Medium,
    /// High
    High,
    /// Urgent
    Urgent,
}

/// Ticket category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Login, profile, account settings
    Account,
    /// Payments and contributions
    Financial,
    /// Bugs and technical problems
    Technical,
    /// Security concerns
    Security,
    /// Suggestions
    Feedback,
    /// Anything else
    Other,
}

/// Internal note on a ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Who wrote the note
    pub author: String,
    /// Note text
    pub content: String,
    /// When the note was written
    pub created_at: DateTime<Utc>,
}

/// One entry of the conversation that led to the ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    /// `user`, `agent` or `bot`
    pub role: String,
    /// Entry text
    pub content: String,
    /// When it was said
    pub timestamp: DateTime<Utc>,
}

/// A support ticket.
///
/// Status changes go through [`Ticket::assign`], [`Ticket::resolve`] and
/// [`Ticket::close`], which keep `assigned_at` and `resolved_at` consistent
/// with the path the ticket took.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Backend identifier
    pub id: TicketId,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Priority
    #[serde(default)]
    pub priority: Priority,
    /// Category
    pub category: Category,
    /// Short summary
    pub title: String,
    /// Full description
    pub description: String,
    /// Requester
    pub user_id: String,
    /// Agent holding the ticket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Set on `pending → assigned` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    /// Set on `assigned → resolved` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Resolution notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Internal notes
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Conversation that led to the ticket
    #[serde(default)]
    pub conversation_history: Vec<ConversationEntry>,
}

impl Ticket {
    /// `pending → assigned`
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Ticket`] unless the ticket is pending.
    pub fn assign(&mut self, agent: &str, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != TicketStatus::Pending {
            return Err(self.illegal("assign"));
        }
        self.status = TicketStatus::Assigned;
        self.assigned_to = Some(agent.to_string());
        self.assigned_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// `assigned → resolved`, by the agent holding the ticket
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Ticket`] unless the ticket is assigned, or
    /// [`TransitionError::NotAssignee`] if `agent` does not hold it.
    pub fn resolve(
        &mut self,
        agent: &str,
        resolution: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != TicketStatus::Assigned {
            return Err(self.illegal("resolve"));
        }
        if self.assigned_to.as_deref() != Some(agent) {
            return Err(TransitionError::NotAssignee {
                ticket_id: self.id.clone(),
                agent: agent.to_string(),
            });
        }
        self.status = TicketStatus::Resolved;
        self.resolution = Some(resolution.to_string());
        self.resolved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Archive the ticket
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Ticket`] if the ticket is already closed.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status == TicketStatus::Closed {
            return Err(self.illegal("close"));
        }
        self.status = TicketStatus::Closed;
        self.updated_at = at;
        Ok(())
    }

    /// Append a note; status is unchanged
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Ticket`] if the ticket is closed.
    pub fn add_note(&mut self, note: Note) -> Result<(), TransitionError> {
        if self.status == TicketStatus::Closed {
            return Err(self.illegal("add a note to"));
        }
        self.updated_at = note.created_at;
        self.notes.push(note);
        Ok(())
    }

    fn illegal(&self, operation: &'static str) -> TransitionError {
        TransitionError::Ticket {
            ticket_id: self.id.clone(),
            from: self.status,
            operation,
        }
    }
}

/// Aggregated ticket statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAnalytics {
    /// Tickets ever created
    #[serde(default)]
    pub total: u64,
    /// Currently pending
    #[serde(default)]
    pub pending: u64,
    /// Currently assigned
    #[serde(default)]
    pub assigned: u64,
    /// Resolved
    #[serde(default)]
    pub resolved: u64,
    /// Mean minutes from creation to resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_resolution_minutes: Option<f64>,
}

// ============================================================================
// Conversation escalation
// ============================================================================

/// Escalation status of a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Requested, waiting for the backend
    Escalating,
    /// Queued for an agent
    Pending,
    /// An agent has been designated
    Assigned,
    /// A human agent is live in the conversation
    ActiveHuman,
    /// Finished
    Resolved,
    /// The attempt failed (the user may try again)
    Failed,
}

impl EscalationStatus {
    /// Whether the attempt is over
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }

    /// Whether `self → next` is a legal move.
    ///
    /// `escalating → pending → assigned → active_human → resolved`, any
    /// non-terminal state may fail, and a finished attempt may be re-initiated.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use EscalationStatus::{ActiveHuman, Assigned, Escalating, Failed, Pending, Resolved};
        match (self, next) {
            (Escalating, Pending)
            | (Pending, Assigned)
            | (Assigned, ActiveHuman)
            | (ActiveHuman, Resolved)
            | (Resolved | Failed, Escalating) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Escalating => "escalating",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::ActiveHuman => "active_human",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Escalation state of one conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    /// Conversation being escalated
    pub conversation_id: ConversationId,
    /// Current status
    pub status: EscalationStatus,
    /// Position in the agent queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    /// Estimated wait in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<u64>,
    /// Agent handling the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_by: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl Escalation {
    /// A fresh attempt in `escalating`
    #[must_use]
    pub const fn started(conversation_id: ConversationId, at: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            status: EscalationStatus::Escalating,
            queue_position: None,
            estimated_wait_time: None,
            handled_by: None,
            error: None,
            updated_at: at,
        }
    }

    /// Move to `next`, keeping details the update does not mention
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Escalation`] for an illegal move.
    pub fn apply(&mut self, update: &EscalationUpdate) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(update.status) {
            return Err(TransitionError::Escalation {
                conversation_id: self.conversation_id.clone(),
                from: self.status,
                to: update.status,
            });
        }
        self.status = update.status;
        if update.queue_position.is_some() {
            self.queue_position = update.queue_position;
        }
        if update.estimated_wait_time.is_some() {
            self.estimated_wait_time = update.estimated_wait_time;
        }
        if update.handled_by.is_some() {
            self.handled_by.clone_from(&update.handled_by);
        }
        self.error.clone_from(&update.error);
        self.updated_at = update.at;
        Ok(())
    }
}

/// A status change reported for an escalation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationUpdate {
    /// Conversation concerned
    pub conversation_id: ConversationId,
    /// New status
    pub status: EscalationStatus,
    /// Position in the agent queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    /// Estimated wait in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<u64>,
    /// Agent handling the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_by: Option<String>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the change happened
    pub at: DateTime<Utc>,
}

impl EscalationUpdate {
    /// An update carrying only a status
    #[must_use]
    pub const fn status(
        conversation_id: ConversationId,
        status: EscalationStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id,
            status,
            queue_position: None,
            estimated_wait_time: None,
            handled_by: None,
            error: None,
            at,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Delivery status of a message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    /// Reached the recipient
    #[serde(default)]
    pub delivered: bool,
    /// Read by the recipient
    #[serde(default)]
    pub read: bool,
    /// When it was read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// A server-confirmed message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned identifier
    pub id: String,
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Author
    pub sender: String,
    /// Addressee
    pub recipient: String,
    /// Body
    pub content: String,
    /// `text`, `image`, ...
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
    /// Delivery status
    #[serde(default)]
    pub status: MessageStatus,
}

pub(crate) fn default_message_kind() -> String {
    "text".to_string()
}

/// A locally synthesized message awaiting server confirmation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryMessage {
    /// Local identifier, replaced on reconciliation
    pub temporary_id: String,
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Author
    pub sender: String,
    /// Addressee
    pub recipient: String,
    /// Body
    pub content: String,
    /// `text`, `image`, ...
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
    /// Local creation time
    pub timestamp: DateTime<Utc>,
    /// Delivery in progress
    pub sending: bool,
    /// Failure reason once delivery gave up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of a conversation: optimistic or confirmed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum MessageEntry {
    /// Awaiting reconciliation
    Temporary(TemporaryMessage),
    /// Confirmed by the server
    Permanent(Message),
}

impl MessageEntry {
    /// Local id for temporary entries, server id for permanent ones
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Temporary(message) => &message.temporary_id,
            Self::Permanent(message) => &message.id,
        }
    }

    /// Whether this is the temporary entry `temporary_id`
    #[must_use]
    pub fn is_temporary(&self, temporary_id: &str) -> bool {
        matches!(self, Self::Temporary(message) if message.temporary_id == temporary_id)
    }

    /// Whether this is the permanent message `id`
    #[must_use]
    pub fn is_permanent(&self, id: &str) -> bool {
        matches!(self, Self::Permanent(message) if message.id == id)
    }

    /// Body text
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Temporary(message) => &message.content,
            Self::Permanent(message) => &message.content,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, minute, 0).unwrap()
    }

    fn pending_ticket(id: &str) -> Ticket {
        Ticket {
            id: TicketId::new(id),
            status: TicketStatus::Pending,
            priority: Priority::High,
            category: Category::Technical,
            title: "Cannot log in".to_string(),
            description: "The login button does nothing".to_string(),
            user_id: "requester".to_string(),
            assigned_to: None,
            created_at: at(0),
            updated_at: at(0),
            assigned_at: None,
            resolved_at: None,
            resolution: None,
            notes: Vec::new(),
            conversation_history: Vec::new(),
        }
    }

    #[test]
    fn conversation_id_matches_known_pair() {
        assert_eq!(conversation_id("u1", "u2").as_str(), "u1_u2");
        assert_eq!(conversation_id("u2", "u1").as_str(), "u1_u2");
    }

    proptest! {
        #[test]
        fn conversation_id_is_symmetric(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
            prop_assert_eq!(conversation_id(&a, &b), conversation_id(&b, &a));
        }
    }

    #[test]
    fn assign_then_resolve_sets_timestamps_in_order() {
        let mut ticket = pending_ticket("t1");

        ticket.assign("agent", at(5)).unwrap();
        assert_eq!(ticket.status, TicketStatus::Assigned);
        assert_eq!(ticket.assigned_at, Some(at(5)));
        assert_eq!(ticket.resolved_at, None);

        ticket.resolve("agent", "Cleared cache", at(9)).unwrap();
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.resolved_at, Some(at(9)));
        assert_eq!(ticket.assigned_at, Some(at(5)));
    }

    #[test]
    fn cannot_resolve_pending_ticket() {
        let mut ticket = pending_ticket("t1");
        let before = ticket.clone();

        let error = ticket.resolve("agent", "done", at(1)).unwrap_err();

        assert!(matches!(
            error,
            TransitionError::Ticket {
                from: TicketStatus::Pending,
                ..
            }
        ));
        assert_eq!(ticket, before);
    }

    #[test]
    fn only_assignee_resolves() {
        let mut ticket = pending_ticket("t1");
        ticket.assign("agent", at(1)).unwrap();

        let error = ticket.resolve("someone-else", "done", at(2)).unwrap_err();
        assert!(matches!(error, TransitionError::NotAssignee { .. }));
    }

    #[test]
    fn cannot_claim_twice() {
        let mut ticket = pending_ticket("t1");
        ticket.assign("a1", at(1)).unwrap();
        assert!(ticket.assign("a2", at(2)).is_err());
        assert_eq!(ticket.assigned_to.as_deref(), Some("a1"));
    }

    #[test]
    fn notes_allowed_until_closed() {
        let mut ticket = pending_ticket("t1");
        let note = Note {
            author: "agent".to_string(),
            content: "Asked for logs".to_string(),
            created_at: at(3),
        };

        ticket.add_note(note.clone()).unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);

        ticket.close(at(4)).unwrap();
        assert!(ticket.add_note(note).is_err());
        assert_eq!(ticket.notes.len(), 1);
    }

    #[test]
    fn escalation_transitions() {
        use EscalationStatus::*;

        assert!(Escalating.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(ActiveHuman));
        assert!(ActiveHuman.can_transition_to(Resolved));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Escalating));
        assert!(Resolved.can_transition_to(Escalating));

        assert!(!Escalating.can_transition_to(ActiveHuman));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Resolved.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Escalating));
    }

    #[test]
    fn escalation_apply_keeps_previous_details() {
        let id = ConversationId::between("bot", "u1");
        let mut escalation = Escalation::started(id.clone(), at(0));

        let mut queued = EscalationUpdate::status(id.clone(), EscalationStatus::Pending, at(1));
        queued.queue_position = Some(3);
        escalation.apply(&queued).unwrap();

        let mut assigned = EscalationUpdate::status(id, EscalationStatus::Assigned, at(2));
        assigned.handled_by = Some("agent".to_string());
        escalation.apply(&assigned).unwrap();

        assert_eq!(escalation.queue_position, Some(3));
        assert_eq!(escalation.handled_by.as_deref(), Some("agent"));
        assert_eq!(escalation.updated_at, at(2));
    }

    #[test]
    fn ticket_wire_format_is_camel_case() {
        let value = serde_json::to_value(pending_ticket("t9")).unwrap();
        assert_eq!(value["id"], "t9");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["userId"], "requester");
        assert!(value.get("assignedAt").is_none());
    }
}
