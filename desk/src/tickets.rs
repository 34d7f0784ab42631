//! Support ticket lifecycle service.
//!
//! Every operation validates its input before touching the network, checks
//! the actor's permissions where the operation requires them, calls the
//! backend, and only then emits the `support` event describing the confirmed
//! change. Conversation escalation is the one optimistic path:
//! `ESCALATION_REQUESTED` goes out before the backend is asked.
//!
//! ```text
//! create ──▶ pending ──assign──▶ assigned ──resolve──▶ resolved
//!               │                   │                     │
//!               └───────────────────┴──────close──────────┴──▶ closed
//! ```

use crate::api::{EscalationReceipt, EscalationRequest, NewTicket, SupportApi};
use crate::app::DeskStore;
use crate::device::DeviceInfoCollector;
use crate::error::{
    ApiError, DeskError, TransitionError, ValidationError, Violation, MIN_DESCRIPTION_LEN,
    MIN_TITLE_LEN,
};
use crate::permissions::{Actor, PermissionSource};
use crate::slices::support::{self, escalation_event, events};
use crate::types::{
    Category, ConversationId, EscalationStatus, EscalationUpdate, Note, Priority, Ticket,
    TicketAnalytics, TicketId,
};
use serde::Serialize;
use std::sync::Arc;
use support_sync_core::environment::{Clock, SystemClock};
use support_sync_core::event_hub::EventHub;
use support_sync_runtime::retry::{retry_if, RetryPolicy};

/// What a user fills in to open a ticket
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketDraft {
    pub category: Option<Category>,
    pub priority: Priority,
    pub title: String,
    pub description: String,
}

impl TicketDraft {
    /// Check every input rule
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every violated rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if self.category.is_none() {
            violations.push(Violation::CategoryRequired);
        }
        let title = self.title.trim().chars().count();
        if title < MIN_TITLE_LEN {
            violations.push(Violation::TitleTooShort { actual: title });
        }
        let description = self.description.trim().chars().count();
        if description < MIN_DESCRIPTION_LEN {
            violations.push(Violation::DescriptionTooShort {
                actual: description,
            });
        }
        ValidationError::check(violations)
    }
}

fn require_text(text: &str, violation: Violation) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        Err(violation.into())
    } else {
        Ok(())
    }
}

/// Reads the locally known escalation status of a conversation
pub trait EscalationView: Send + Sync {
    /// `None` when the conversation was never escalated
    fn escalation_status(&self, conversation_id: &ConversationId) -> Option<EscalationStatus>;
}

impl EscalationView for DeskStore {
    fn escalation_status(&self, conversation_id: &ConversationId) -> Option<EscalationStatus> {
        self.state(|state| {
            state
                .support
                .escalation(conversation_id)
                .map(|escalation| escalation.status)
        })
    }
}

/// Ticket and escalation operations
pub struct TicketService {
    hub: EventHub,
    api: Arc<dyn SupportApi>,
    permissions: Arc<dyn PermissionSource>,
    device: Arc<dyn DeviceInfoCollector>,
    escalations: Arc<dyn EscalationView>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl TicketService {
    /// Service emitting on `hub`
    #[must_use]
    pub fn new(
        hub: EventHub,
        api: Arc<dyn SupportApi>,
        permissions: Arc<dyn PermissionSource>,
        device: Arc<dyn DeviceInfoCollector>,
        escalations: Arc<dyn EscalationView>,
    ) -> Self {
        Self {
            hub,
            api,
            permissions,
            device,
            escalations,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    /// Use `clock` for optimistic timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Backoff for list fetches
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn emit(&self, event_type: &'static str, payload: &impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(payload) => {
                let outcome = self.hub.emit(support::SERVICE, event_type, payload);
                tracing::debug!(event_type, invoked = outcome.invoked, "Emitted support event");
            },
            Err(error) => {
                tracing::error!(event_type, %error, "Failed to encode support event");
            },
        }
    }

    fn actor(&self, operation: &'static str) -> Result<Actor, DeskError> {
        self.permissions
            .current_actor()
            .ok_or(DeskError::NotAuthenticated { operation })
    }

    fn support_actor(&self, operation: &'static str) -> Result<Actor, DeskError> {
        let actor = self.actor(operation)?;
        if actor.can_handle_support() {
            Ok(actor)
        } else {
            tracing::warn!(user_id = %actor.user_id, operation, "Permission denied");
            Err(DeskError::PermissionDenied { operation })
        }
    }

    /// Open a ticket for the signed-in user.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] before any network call
    /// - [`DeskError::NotAuthenticated`] when nobody is signed in
    /// - [`DeskError::Api`] when the backend refuses
    #[tracing::instrument(skip_all, fields(title = %draft.title))]
    pub async fn create_ticket(&self, draft: TicketDraft) -> Result<Ticket, DeskError> {
        draft.validate()?;
        let actor = self.actor("open a ticket")?;
        let category = draft
            .category
            .ok_or_else(|| ValidationError::from(Violation::CategoryRequired))?;

        let request = NewTicket {
            user_id: actor.user_id,
            category,
            priority: draft.priority,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            device_info: self.device.collect(),
        };
        let ticket = self.api.create_ticket(&request).await?;

        tracing::info!(ticket_id = %ticket.id, "Ticket created");
        self.emit(
            events::TICKET_CREATED,
            &events::TicketCreated {
                ticket: ticket.clone(),
            },
        );
        Ok(ticket)
    }

    /// Refresh the pending queue.
    ///
    /// Transport errors and 5xx responses are retried with backoff.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] once retries are exhausted.
    #[tracing::instrument(skip_all)]
    pub async fn fetch_pending(&self) -> Result<Vec<Ticket>, DeskError> {
        self.emit(events::TICKETS_LOADING, &serde_json::json!({}));
        let fetched = retry_if(&self.retry, || self.api.list_pending(), ApiError::is_transient).await;

        match fetched {
            Ok(tickets) => {
                self.emit(
                    events::PENDING_TICKETS_FETCHED,
                    &events::PendingFetched {
                        tickets: tickets.clone(),
                    },
                );
                Ok(tickets)
            },
            Err(error) => Err(self.fetch_failed(error)),
        }
    }

    /// Refresh the signed-in agent's tickets.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotAuthenticated`] when nobody is signed in
    /// - [`DeskError::Api`] once retries are exhausted
    #[tracing::instrument(skip_all)]
    pub async fn fetch_my_tickets(&self) -> Result<Vec<Ticket>, DeskError> {
        let actor = self.actor("list your tickets")?;
        self.emit(events::TICKETS_LOADING, &serde_json::json!({}));
        let fetched = retry_if(
            &self.retry,
            || self.api.list_assigned(&actor.user_id),
            ApiError::is_transient,
        )
        .await;

        match fetched {
            Ok(tickets) => {
                self.emit(
                    events::MY_TICKETS_FETCHED,
                    &events::MyTicketsFetched {
                        agent_id: actor.user_id.clone(),
                        tickets: tickets.clone(),
                    },
                );
                Ok(tickets)
            },
            Err(error) => Err(self.fetch_failed(error)),
        }
    }

    fn fetch_failed(&self, error: ApiError) -> DeskError {
        tracing::warn!(%error, "Ticket fetch failed");
        self.emit(
            events::TICKETS_FETCH_FAILED,
            &events::FetchFailed {
                reason: error.to_string(),
            },
        );
        DeskError::Api(error)
    }

    /// Claim a pending ticket for the signed-in agent.
    ///
    /// The backend arbitrates concurrent claims. A refused claim is reported
    /// as `TICKET_ASSIGN_FAILED`, the pending queue and the contested ticket
    /// are refreshed, and the call is not retried.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotAuthenticated`] / [`DeskError::PermissionDenied`]
    /// - [`DeskError::AlreadyClaimed`] when the backend refuses the claim
    /// - [`DeskError::Api`] on transport or server errors
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id))]
    pub async fn assign_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, DeskError> {
        let actor = self.support_actor("assign tickets")?;

        match self.api.assign_ticket(ticket_id, &actor.user_id).await {
            Ok(ticket) => {
                tracing::info!(agent_id = %actor.user_id, "Ticket assigned");
                self.emit(
                    events::TICKET_ASSIGNED,
                    &events::TicketAssigned {
                        ticket_id: ticket.id.clone(),
                        agent_id: actor.user_id,
                        title: ticket.title.clone(),
                        assigned_at: ticket.assigned_at.unwrap_or(ticket.updated_at),
                        ticket: Some(ticket.clone()),
                    },
                );
                Ok(ticket)
            },
            Err(error) => {
                tracing::warn!(agent_id = %actor.user_id, %error, "Ticket claim refused");
                self.emit(
                    events::TICKET_ASSIGN_FAILED,
                    &events::TicketAssignFailed {
                        ticket_id: ticket_id.clone(),
                        agent_id: actor.user_id,
                        reason: error.to_string(),
                    },
                );
                if let Err(refresh) = self.fetch_pending().await {
                    tracing::warn!(error = %refresh, "Pending refresh after refused claim failed");
                }
                self.refresh_ticket(ticket_id).await;

                if error.is_transient() {
                    Err(DeskError::Api(error))
                } else {
                    Err(DeskError::AlreadyClaimed {
                        ticket_id: ticket_id.clone(),
                        reason: error.to_string(),
                    })
                }
            },
        }
    }

    async fn refresh_ticket(&self, ticket_id: &TicketId) {
        match self.api.get_ticket(ticket_id).await {
            Ok(ticket) => self.emit(events::TICKET_UPDATED, &events::TicketUpdated { ticket }),
            Err(error) => tracing::warn!(%error, "Could not reload contested ticket"),
        }
    }

    /// Resolve a ticket held by the signed-in agent.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] when `resolution` is blank
    /// - [`DeskError::NotAuthenticated`] / [`DeskError::PermissionDenied`]
    /// - [`DeskError::Api`] when the backend refuses
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id))]
    pub async fn resolve_ticket(
        &self,
        ticket_id: &TicketId,
        resolution: &str,
    ) -> Result<Ticket, DeskError> {
        require_text(resolution, Violation::ResolutionRequired)?;
        let actor = self.support_actor("resolve tickets")?;
        let resolution = resolution.trim();

        let ticket = self
            .api
            .resolve_ticket(ticket_id, &actor.user_id, resolution)
            .await?;

        tracing::info!(agent_id = %actor.user_id, "Ticket resolved");
        self.emit(
            events::TICKET_RESOLVED,
            &events::TicketResolved {
                ticket_id: ticket.id.clone(),
                agent_id: actor.user_id,
                user_id: ticket.user_id.clone(),
                title: ticket.title.clone(),
                resolution: resolution.to_string(),
                resolved_at: ticket.resolved_at.unwrap_or(ticket.updated_at),
            },
        );
        Ok(ticket)
    }

    /// Append an internal note.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] when `content` is blank
    /// - [`DeskError::NotAuthenticated`] when nobody is signed in
    /// - [`DeskError::Api`] when the backend refuses (e.g. closed ticket)
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id))]
    pub async fn add_note(&self, ticket_id: &TicketId, content: &str) -> Result<Note, DeskError> {
        require_text(content, Violation::NoteRequired)?;
        self.actor("add notes")?;

        let note = self.api.add_note(ticket_id, content.trim()).await?;
        self.emit(
            events::TICKET_NOTE_ADDED,
            &events::TicketNoteAdded {
                ticket_id: ticket_id.clone(),
                note: note.clone(),
            },
        );
        Ok(note)
    }

    /// Archive a ticket.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotAuthenticated`] / [`DeskError::PermissionDenied`]
    /// - [`DeskError::Api`] when the backend refuses
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id))]
    pub async fn close_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, DeskError> {
        self.support_actor("close tickets")?;

        let ticket = self.api.close_ticket(ticket_id).await?;
        self.emit(
            events::TICKET_CLOSED,
            &events::TicketClosed {
                ticket_id: ticket.id.clone(),
                closed_at: ticket.updated_at,
            },
        );
        Ok(ticket)
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotAuthenticated`] / [`DeskError::PermissionDenied`]
    /// - [`DeskError::Api`] once retries are exhausted
    #[tracing::instrument(skip_all)]
    pub async fn fetch_analytics(&self) -> Result<TicketAnalytics, DeskError> {
        self.support_actor("view support analytics")?;

        let analytics = retry_if(&self.retry, || self.api.analytics(), ApiError::is_transient).await?;
        self.emit(events::ANALYTICS_FETCHED, &analytics);
        Ok(analytics)
    }

    /// Ask for a human agent to take over a conversation.
    ///
    /// The conversation is marked `escalating` immediately; it moves to
    /// `pending` when the backend queues the request, or to `failed`. Only a
    /// conversation with no escalation, or a finished one, may escalate.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotAuthenticated`] when nobody is signed in
    /// - [`DeskError::Transition`] while an escalation is still running;
    ///   nothing is emitted and the backend is not called
    /// - [`DeskError::Api`] when the request fails; the escalation is then `failed`
    #[tracing::instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn escalate_conversation(
        &self,
        conversation_id: &ConversationId,
        reason: Option<String>,
    ) -> Result<EscalationReceipt, DeskError> {
        let actor = self.actor("request human support")?;
        if let Some(from) = self.escalations.escalation_status(conversation_id) {
            if !from.can_transition_to(EscalationStatus::Escalating) {
                tracing::warn!(%from, "Escalation already in progress");
                return Err(TransitionError::Escalation {
                    conversation_id: conversation_id.clone(),
                    from,
                    to: EscalationStatus::Escalating,
                }
                .into());
            }
        }

        self.emit(
            events::ESCALATION_REQUESTED,
            &events::EscalationRequested {
                conversation_id: conversation_id.clone(),
                at: self.clock.now(),
            },
        );

        let request = EscalationRequest {
            conversation_id: conversation_id.clone(),
            user_id: actor.user_id,
            reason,
        };
        match self.api.request_escalation(&request).await {
            Ok(receipt) => {
                tracing::info!(queue_position = ?receipt.queue_position, "Escalation queued");
                self.record_escalation_update(&EscalationUpdate {
                    queue_position: receipt.queue_position,
                    estimated_wait_time: receipt.estimated_wait_time,
                    ..EscalationUpdate::status(
                        conversation_id.clone(),
                        EscalationStatus::Pending,
                        self.clock.now(),
                    )
                });
                Ok(receipt)
            },
            Err(error) => {
                tracing::warn!(%error, "Escalation request failed");
                self.record_escalation_update(&EscalationUpdate {
                    error: Some(error.to_string()),
                    ..EscalationUpdate::status(
                        conversation_id.clone(),
                        EscalationStatus::Failed,
                        self.clock.now(),
                    )
                });
                Err(DeskError::Api(error))
            },
        }
    }

    /// Publish an escalation status change pushed by the backend
    /// (agent designated, agent live, resolved, failed).
    pub fn record_escalation_update(&self, update: &EscalationUpdate) {
        if update.status == EscalationStatus::Escalating {
            self.emit(
                events::ESCALATION_REQUESTED,
                &events::EscalationRequested {
                    conversation_id: update.conversation_id.clone(),
                    at: update.at,
                },
            );
        } else {
            self.emit(escalation_event(update.status), update);
        }
    }

    /// Forget the escalation state of a conversation (session end)
    pub fn clear_escalation(&self, conversation_id: &ConversationId) {
        self.emit(
            events::ESCALATION_CLEARED,
            &events::EscalationCleared {
                conversation_id: conversation_id.clone(),
            },
        );
    }
}
