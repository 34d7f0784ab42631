//! In-memory backends for tests and local wiring.
//!
//! [`MockSupportApi`] and [`MockMessageApi`] behave like the real backend for
//! the happy path (tickets move through their lifecycle, messages receive
//! permanent ids) and can be told to fail.

use crate::api::{ApiResult, EscalationReceipt, EscalationRequest, MessageApi, NewTicket, SupportApi};
use crate::delivery::OutgoingMessage;
use crate::error::ApiError;
use crate::types::{
    ConversationId, Message, MessageStatus, Note, Ticket, TicketAnalytics, TicketId, TicketStatus,
};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use support_sync_core::environment::{Clock, SystemClock};
use tokio::time::Instant;

#[derive(Default)]
struct Calls {
    counts: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
}

impl Calls {
    /// Count the call and pop a scripted failure, if any
    fn enter(&mut self, operation: &'static str) -> ApiResult<()> {
        *self.counts.entry(operation).or_default() += 1;
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct SupportBackend {
    calls: Calls,
    tickets: BTreeMap<TicketId, Ticket>,
    next_id: u64,
    escalation: Option<EscalationReceipt>,
}

/// In-memory [`SupportApi`]
#[derive(Clone)]
pub struct MockSupportApi {
    inner: Arc<Mutex<SupportBackend>>,
    clock: Arc<dyn Clock>,
}

impl MockSupportApi {
    /// Empty backend stamping changes with the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty backend stamping changes with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SupportBackend::default())),
            clock,
        }
    }

    fn backend(&self) -> std::sync::MutexGuard<'_, SupportBackend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a ticket as is
    pub fn seed(&self, ticket: Ticket) {
        self.backend().tickets.insert(ticket.id.clone(), ticket);
    }

    /// Current backend copy of a ticket
    #[must_use]
    pub fn ticket(&self, id: &TicketId) -> Option<Ticket> {
        self.backend().tickets.get(id).cloned()
    }

    /// Make the next call to `operation` fail with `error`.
    ///
    /// Operations are named after the trait methods (`"list_pending"`, ...).
    /// Scripted failures queue up.
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.backend()
            .calls
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Receipt returned by `request_escalation`
    pub fn set_escalation_receipt(&self, receipt: EscalationReceipt) {
        self.backend().escalation = Some(receipt);
    }

    /// How many times `operation` was called
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.backend()
            .calls
            .counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Apply `change` to a stored ticket and return the new copy
    fn update(
        &self,
        operation: &'static str,
        ticket_id: &TicketId,
        change: impl FnOnce(&mut Ticket) -> ApiResult<()>,
    ) -> ApiResult<Ticket> {
        let mut backend = self.backend();
        backend.calls.enter(operation)?;
        let ticket = backend
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("Ticket {ticket_id} not found"),
            })?;
        change(ticket)?;
        Ok(ticket.clone())
    }
}

impl Default for MockSupportApi {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(error: impl std::fmt::Display) -> ApiError {
    ApiError::Rejected(error.to_string())
}

impl SupportApi for MockSupportApi {
    fn create_ticket<'a>(&'a self, ticket: &'a NewTicket) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut backend = self.backend();
            backend.calls.enter("create_ticket")?;
            backend.next_id += 1;
            let created = Ticket {
                id: TicketId::new(format!("ticket-{}", backend.next_id)),
                status: TicketStatus::Pending,
                priority: ticket.priority,
                category: ticket.category,
                title: ticket.title.clone(),
                description: ticket.description.clone(),
                user_id: ticket.user_id.clone(),
                assigned_to: None,
                created_at: now,
                updated_at: now,
                assigned_at: None,
                resolved_at: None,
                resolution: None,
                notes: Vec::new(),
                conversation_history: Vec::new(),
            };
            backend.tickets.insert(created.id.clone(), created.clone());
            Ok(created)
        })
    }

    fn list_pending(&self) -> BoxFuture<'_, ApiResult<Vec<Ticket>>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("list_pending")?;
            Ok(backend
                .tickets
                .values()
                .filter(|t| t.status == TicketStatus::Pending)
                .cloned()
                .collect())
        })
    }

    fn list_assigned<'a>(&'a self, agent_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Ticket>>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("list_assigned")?;
            Ok(backend
                .tickets
                .values()
                .filter(|t| {
                    t.status == TicketStatus::Assigned && t.assigned_to.as_deref() == Some(agent_id)
                })
                .cloned()
                .collect())
        })
    }

    fn get_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move { self.update("get_ticket", ticket_id, |_| Ok(())) })
    }

    fn assign_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            let now = self.clock.now();
            self.update("assign_ticket", ticket_id, |ticket| {
                if ticket.status != TicketStatus::Pending {
                    return Err(ApiError::Rejected("Ticket already assigned".to_string()));
                }
                ticket.assign(agent_id, now).map_err(rejected)
            })
        })
    }

    fn resolve_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
        resolution: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            let now = self.clock.now();
            self.update("resolve_ticket", ticket_id, |ticket| {
                ticket.resolve(agent_id, resolution, now).map_err(rejected)
            })
        })
    }

    fn add_note<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        content: &'a str,
    ) -> BoxFuture<'a, ApiResult<Note>> {
        Box::pin(async move {
            let note = Note {
                author: "agent".to_string(),
                content: content.to_string(),
                created_at: self.clock.now(),
            };
            let stored = note.clone();
            self.update("add_note", ticket_id, |ticket| {
                ticket.add_note(stored).map_err(rejected)
            })?;
            Ok(note)
        })
    }

    fn close_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            let now = self.clock.now();
            self.update("close_ticket", ticket_id, |ticket| {
                ticket.close(now).map_err(rejected)
            })
        })
    }

    fn analytics(&self) -> BoxFuture<'_, ApiResult<TicketAnalytics>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("analytics")?;
            let count = |status| {
                backend
                    .tickets
                    .values()
                    .filter(|t| t.status == status)
                    .count() as u64
            };
            Ok(TicketAnalytics {
                total: backend.tickets.len() as u64,
                pending: count(TicketStatus::Pending),
                assigned: count(TicketStatus::Assigned),
                resolved: count(TicketStatus::Resolved),
                average_resolution_minutes: None,
            })
        })
    }

    fn request_escalation<'a>(
        &'a self,
        _request: &'a EscalationRequest,
    ) -> BoxFuture<'a, ApiResult<EscalationReceipt>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("request_escalation")?;
            Ok(backend.escalation.clone().unwrap_or(EscalationReceipt {
                ticket_id: None,
                queue_position: Some(1),
                estimated_wait_time: Some(120),
            }))
        })
    }
}

#[derive(Default)]
struct MessageBackend {
    calls: Calls,
    messages: Vec<Message>,
    next_id: u64,
    create_delay: Option<Duration>,
    created_at: Vec<Instant>,
}

/// In-memory [`MessageApi`]
#[derive(Clone)]
pub struct MockMessageApi {
    inner: Arc<Mutex<MessageBackend>>,
    clock: Arc<dyn Clock>,
}

impl MockMessageApi {
    /// Empty backend stamping messages with the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty backend stamping messages with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MessageBackend::default())),
            clock,
        }
    }

    fn backend(&self) -> std::sync::MutexGuard<'_, MessageBackend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call to `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.backend()
            .calls
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Delay every `create_message` response
    pub fn set_create_delay(&self, delay: Duration) {
        self.backend().create_delay = Some(delay);
    }

    /// Store a message as is
    pub fn seed(&self, message: Message) {
        self.backend().messages.push(message);
    }

    /// How many times `operation` was called
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.backend()
            .calls
            .counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// When each `create_message` call arrived
    #[must_use]
    pub fn create_calls(&self) -> Vec<Instant> {
        self.backend().created_at.clone()
    }

    /// Stored messages of a conversation
    #[must_use]
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.backend()
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

impl Default for MockMessageApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageApi for MockMessageApi {
    fn create_message<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            let delay = {
                let mut backend = self.backend();
                backend.created_at.push(Instant::now());
                backend.calls.enter("create_message")?;
                backend.create_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut backend = self.backend();
            backend.next_id += 1;
            let created = Message {
                id: format!("msg-{}", backend.next_id),
                conversation_id: message.conversation_id.clone(),
                sender: message.sender.clone(),
                recipient: message.recipient.clone(),
                content: message.content.clone(),
                kind: message.kind.clone(),
                timestamp: self.clock.now(),
                status: MessageStatus::default(),
            };
            backend.messages.push(created.clone());
            Ok(created)
        })
    }

    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>> {
        Box::pin(async move {
            self.backend().calls.enter("list_messages")?;
            Ok(self.messages(conversation_id))
        })
    }

    fn mark_read<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        reader: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut backend = self.backend();
            backend.calls.enter("mark_read")?;
            for message in backend
                .messages
                .iter_mut()
                .filter(|m| &m.conversation_id == conversation_id && m.recipient == reader)
            {
                message.status.read = true;
                message.status.read_at = Some(now);
            }
            Ok(())
        })
    }

    fn update_status<'a>(
        &'a self,
        message_id: &'a str,
        status: &'a MessageStatus,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("update_status")?;
            let message = backend
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| ApiError::Status {
                    status: 404,
                    message: format!("Message {message_id} not found"),
                })?;
            message.status = status.clone();
            Ok(message.clone())
        })
    }

    fn delete_message<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            let mut backend = self.backend();
            backend.calls.enter("delete_message")?;
            let before = backend.messages.len();
            backend.messages.retain(|m| m.id != message_id);
            if backend.messages.len() == before {
                return Err(ApiError::Status {
                    status: 404,
                    message: format!("Message {message_id} not found"),
                });
            }
            Ok(())
        })
    }
}
