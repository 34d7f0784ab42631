//! Support tickets and conversation escalations.
//!
//! Ticket status only changes when the backend has confirmed the move: the
//! [`TicketService`](crate::tickets::TicketService) emits an event after each
//! successful call, and the reducer replays the transition through the
//! [`Ticket`] methods so `assigned_at`/`resolved_at` stay consistent. A replay
//! that the local copy rejects (unknown ticket, illegal move) only records
//! `last_error`.
//!
//! Escalations are the exception: `ESCALATION_REQUESTED` is emitted before the
//! backend answers so the conversation shows `escalating` immediately.

use crate::app::{AppAction, AppState};
use crate::types::{
    ConversationId, Escalation, EscalationStatus, EscalationUpdate, Ticket, TicketAnalytics,
    TicketId, TicketStatus,
};
use std::collections::BTreeMap;
use support_sync_core::mapping::{decode, Mapping, MappingError};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "support";

/// Event names and payloads of the `support` service.
///
/// Payloads are camelCase JSON objects; the structs below are shared by the
/// emitting service and the mapping table.
pub mod events {
    use crate::types::{ConversationId, Note, Ticket, TicketId};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// The backend accepted a new ticket
    pub const TICKET_CREATED: &str = "TICKET_CREATED";
    /// A list fetch started
    pub const TICKETS_LOADING: &str = "TICKETS_LOADING";
    /// A list fetch gave up
    pub const TICKETS_FETCH_FAILED: &str = "TICKETS_FETCH_FAILED";
    /// Fresh copy of the pending queue
    pub const PENDING_TICKETS_FETCHED: &str = "PENDING_TICKETS_FETCHED";
    /// Fresh copy of one agent's tickets
    pub const MY_TICKETS_FETCHED: &str = "MY_TICKETS_FETCHED";
    /// Fresh server copy of one ticket
    pub const TICKET_UPDATED: &str = "TICKET_UPDATED";
    /// A claim was confirmed
    pub const TICKET_ASSIGNED: &str = "TICKET_ASSIGNED";
    /// A claim was refused
    pub const TICKET_ASSIGN_FAILED: &str = "TICKET_ASSIGN_FAILED";
    /// A ticket was resolved
    pub const TICKET_RESOLVED: &str = "TICKET_RESOLVED";
    /// A ticket was archived
    pub const TICKET_CLOSED: &str = "TICKET_CLOSED";
    /// An internal note was appended
    pub const TICKET_NOTE_ADDED: &str = "TICKET_NOTE_ADDED";
    /// Queue statistics arrived
    pub const ANALYTICS_FETCHED: &str = "ANALYTICS_FETCHED";
    /// A conversation asked for a human (optimistic)
    pub const ESCALATION_REQUESTED: &str = "ESCALATION_REQUESTED";
    /// Escalation queued for an agent
    pub const ESCALATION_QUEUED: &str = "ESCALATION_QUEUED";
    /// Agent designated
    pub const ESCALATION_ASSIGNED: &str = "ESCALATION_ASSIGNED";
    /// Agent live in the conversation
    pub const ESCALATION_ACTIVE: &str = "ESCALATION_ACTIVE";
    /// Escalation finished
    pub const ESCALATION_RESOLVED: &str = "ESCALATION_RESOLVED";
    /// Escalation attempt failed
    pub const ESCALATION_FAILED: &str = "ESCALATION_FAILED";
    /// Escalation state dropped
    pub const ESCALATION_CLEARED: &str = "ESCALATION_CLEARED";

    /// `TICKET_CREATED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketCreated {
        /// Ticket as stored by the backend
        pub ticket: Ticket,
    }

    /// `PENDING_TICKETS_FETCHED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PendingFetched {
        /// Tickets returned by the queue endpoint
        pub tickets: Vec<Ticket>,
    }

    /// `MY_TICKETS_FETCHED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MyTicketsFetched {
        /// Agent whose tickets these are
        pub agent_id: String,
        /// Tickets currently held
        pub tickets: Vec<Ticket>,
    }

    /// `TICKET_UPDATED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketUpdated {
        /// Ticket as stored by the backend
        pub ticket: Ticket,
    }

    /// `TICKETS_FETCH_FAILED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FetchFailed {
        /// Last error seen
        pub reason: String,
    }

    /// `TICKET_ASSIGNED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketAssigned {
        /// Claimed ticket
        pub ticket_id: TicketId,
        /// Agent now holding it
        pub agent_id: String,
        /// Ticket title, for notifications
        pub title: String,
        /// Claim time
        pub assigned_at: DateTime<Utc>,
        /// Backend copy after the claim
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ticket: Option<Ticket>,
    }

    /// `TICKET_ASSIGN_FAILED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketAssignFailed {
        /// Ticket that could not be claimed
        pub ticket_id: TicketId,
        /// Agent who tried
        pub agent_id: String,
        /// Backend explanation
        pub reason: String,
    }

    /// `TICKET_RESOLVED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketResolved {
        /// Resolved ticket
        pub ticket_id: TicketId,
        /// Resolving agent
        pub agent_id: String,
        /// Requester, who gets notified
        pub user_id: String,
        /// Ticket title
        pub title: String,
        /// Resolution notes
        pub resolution: String,
        /// Resolution time
        pub resolved_at: DateTime<Utc>,
    }

    /// `TICKET_CLOSED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketClosed {
        /// Archived ticket
        pub ticket_id: TicketId,
        /// Archive time
        pub closed_at: DateTime<Utc>,
    }

    /// `TICKET_NOTE_ADDED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TicketNoteAdded {
        /// Annotated ticket
        pub ticket_id: TicketId,
        /// Note as stored
        pub note: Note,
    }

    /// `ESCALATION_REQUESTED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EscalationRequested {
        /// Conversation asking for a human
        pub conversation_id: ConversationId,
        /// Request time
        pub at: DateTime<Utc>,
    }

    /// `ESCALATION_CLEARED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EscalationCleared {
        /// Conversation whose escalation is dropped
        pub conversation_id: ConversationId,
    }
}

/// Event type announcing that an escalation reached `status`
#[must_use]
pub const fn escalation_event(status: EscalationStatus) -> &'static str {
    match status {
        EscalationStatus::Escalating => events::ESCALATION_REQUESTED,
        EscalationStatus::Pending => events::ESCALATION_QUEUED,
        EscalationStatus::Assigned => events::ESCALATION_ASSIGNED,
        EscalationStatus::ActiveHuman => events::ESCALATION_ACTIVE,
        EscalationStatus::Resolved => events::ESCALATION_RESOLVED,
        EscalationStatus::Failed => events::ESCALATION_FAILED,
    }
}

/// Support slice
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupportState {
    /// Every known ticket
    pub tickets: BTreeMap<TicketId, Ticket>,
    /// Queue of unclaimed tickets, oldest first
    pub pending: Vec<TicketId>,
    /// Active tickets per agent
    pub by_agent: BTreeMap<String, Vec<TicketId>>,
    /// Escalation per conversation
    pub escalations: BTreeMap<ConversationId, Escalation>,
    /// Latest queue statistics
    pub analytics: Option<TicketAnalytics>,
    /// A list fetch is in flight
    pub loading: bool,
    /// Last failure or rejected replay
    pub last_error: Option<String>,
}

impl SupportState {
    /// Ticket by id
    #[must_use]
    pub fn ticket(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    /// Pending queue
    #[must_use]
    pub fn pending_tickets(&self) -> Vec<&Ticket> {
        self.pending.iter().filter_map(|id| self.tickets.get(id)).collect()
    }

    /// Active tickets held by `agent`
    #[must_use]
    pub fn tickets_for(&self, agent: &str) -> Vec<&Ticket> {
        self.by_agent
            .get(agent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tickets.get(id))
            .collect()
    }

    /// Escalation of a conversation
    #[must_use]
    pub fn escalation(&self, conversation_id: &ConversationId) -> Option<&Escalation> {
        self.escalations.get(conversation_id)
    }

    fn upsert(&mut self, ticket: Ticket) -> TicketId {
        let id = ticket.id.clone();
        self.tickets.insert(id.clone(), ticket);
        id
    }

    /// Store a server copy and move its id to the agent now holding it
    fn refresh(&mut self, ticket: Ticket) -> TicketId {
        let holder = (ticket.status == TicketStatus::Assigned)
            .then(|| ticket.assigned_to.clone())
            .flatten();
        let id = self.upsert(ticket);
        let stale: Vec<String> = self
            .by_agent
            .iter()
            .filter(|(agent, held)| holder.as_deref() != Some(agent.as_str()) && held.contains(&id))
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in stale {
            self.remove_from_agent(&agent, &id);
        }
        if let Some(agent) = holder {
            self.add_to_agent(&agent, &id);
        }
        id
    }

    fn add_to_agent(&mut self, agent: &str, id: &TicketId) {
        let held = self.by_agent.entry(agent.to_string()).or_default();
        if !held.contains(id) {
            held.push(id.clone());
        }
    }

    fn remove_from_agent(&mut self, agent: &str, id: &TicketId) {
        if let Some(held) = self.by_agent.get_mut(agent) {
            held.retain(|held_id| held_id != id);
            if held.is_empty() {
                self.by_agent.remove(agent);
            }
        }
    }

    fn unknown_ticket(&mut self, id: &TicketId) {
        self.last_error = Some(format!("Unknown ticket {id}"));
    }
}

/// Support actions
#[derive(Clone, Debug, PartialEq)]
pub enum SupportAction {
    /// New ticket, queued when pending
    TicketCreated(Ticket),
    /// A list fetch started
    LoadingStarted,
    /// A list fetch failed
    FetchFailed(String),
    /// Replace the pending queue
    PendingFetched(Vec<Ticket>),
    /// Replace one agent's tickets
    MyTicketsFetched {
        /// Agent concerned
        agent_id: String,
        /// Tickets held
        tickets: Vec<Ticket>,
    },
    /// Server copy of one ticket replaces the local one
    TicketRefreshed(Ticket),
    /// Confirmed claim
    Assigned(events::TicketAssigned),
    /// Refused claim
    AssignFailed(events::TicketAssignFailed),
    /// Confirmed resolution
    Resolved(events::TicketResolved),
    /// Confirmed archive
    Closed(events::TicketClosed),
    /// Confirmed note
    NoteAdded(events::TicketNoteAdded),
    /// Queue statistics
    AnalyticsFetched(TicketAnalytics),
    /// Escalation started or restarted
    EscalationRequested(events::EscalationRequested),
    /// Escalation status change
    EscalationUpdated(EscalationUpdate),
    /// Drop a conversation's escalation
    EscalationCleared(ConversationId),
}

/// Reducer for [`SupportState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SupportReducer;

impl Reducer for SupportReducer {
    type State = SupportState;
    type Action = SupportAction;
    type Environment = ();

    #[allow(clippy::too_many_lines)] // one arm per event
    fn reduce(
        &self,
        state: &mut SupportState,
        action: SupportAction,
        _env: &(),
    ) -> SmallVec<[Effect<SupportAction>; 4]> {
        match action {
            SupportAction::TicketCreated(ticket) => {
                let pending = ticket.status == TicketStatus::Pending;
                let id = state.upsert(ticket);
                if pending && !state.pending.contains(&id) {
                    state.pending.push(id);
                }
            },
            SupportAction::LoadingStarted => state.loading = true,
            SupportAction::FetchFailed(reason) => {
                state.loading = false;
                state.last_error = Some(reason);
            },
            SupportAction::PendingFetched(tickets) => {
                state.loading = false;
                state.last_error = None;
                let mut queue = Vec::new();
                for ticket in tickets {
                    let pending = ticket.status == TicketStatus::Pending;
                    let id = state.refresh(ticket);
                    if pending {
                        queue.push(id);
                    }
                }
                state.pending = queue;
            },
            SupportAction::MyTicketsFetched { agent_id, tickets } => {
                state.loading = false;
                state.last_error = None;
                let held: Vec<TicketId> = tickets
                    .into_iter()
                    .filter(|t| t.status == TicketStatus::Assigned)
                    .map(|t| state.upsert(t))
                    .collect();
                if held.is_empty() {
                    state.by_agent.remove(&agent_id);
                } else {
                    state.by_agent.insert(agent_id, held);
                }
            },
            SupportAction::TicketRefreshed(ticket) => {
                let pending = ticket.status == TicketStatus::Pending;
                let id = state.refresh(ticket);
                if !pending {
                    state.pending.retain(|queued| queued != &id);
                } else if !state.pending.contains(&id) {
                    state.pending.push(id);
                }
            },
            SupportAction::Assigned(assigned) => {
                let outcome = if let Some(ticket) = state.tickets.get_mut(&assigned.ticket_id) {
                    ticket.assign(&assigned.agent_id, assigned.assigned_at)
                } else if let Some(mut confirmed) = assigned.ticket.clone() {
                    // Claimed from outside the local queue
                    let outcome = if confirmed.status == TicketStatus::Pending {
                        confirmed.assign(&assigned.agent_id, assigned.assigned_at)
                    } else {
                        Ok(())
                    };
                    if outcome.is_ok() {
                        state.upsert(confirmed);
                    }
                    outcome
                } else {
                    state.unknown_ticket(&assigned.ticket_id);
                    return SmallVec::new();
                };
                match outcome {
                    Ok(()) => {
                        state.pending.retain(|id| id != &assigned.ticket_id);
                        state.add_to_agent(&assigned.agent_id, &assigned.ticket_id);
                        state.last_error = None;
                    },
                    Err(error) => state.last_error = Some(error.to_string()),
                }
            },
            SupportAction::AssignFailed(failed) => {
                state.last_error = Some(format!(
                    "Ticket {} was already claimed: {}",
                    failed.ticket_id, failed.reason
                ));
            },
            SupportAction::Resolved(resolved) => {
                let Some(ticket) = state.tickets.get_mut(&resolved.ticket_id) else {
                    state.unknown_ticket(&resolved.ticket_id);
                    return SmallVec::new();
                };
                match ticket.resolve(
                    &resolved.agent_id,
                    &resolved.resolution,
                    resolved.resolved_at,
                ) {
                    Ok(()) => {
                        state.remove_from_agent(&resolved.agent_id, &resolved.ticket_id);
                        state.last_error = None;
                    },
                    Err(error) => state.last_error = Some(error.to_string()),
                }
            },
            SupportAction::Closed(closed) => {
                let Some(ticket) = state.tickets.get_mut(&closed.ticket_id) else {
                    state.unknown_ticket(&closed.ticket_id);
                    return SmallVec::new();
                };
                let holder = ticket.assigned_to.clone();
                match ticket.close(closed.closed_at) {
                    Ok(()) => {
                        state.pending.retain(|id| id != &closed.ticket_id);
                        if let Some(agent) = holder {
                            state.remove_from_agent(&agent, &closed.ticket_id);
                        }
                        state.last_error = None;
                    },
                    Err(error) => state.last_error = Some(error.to_string()),
                }
            },
            SupportAction::NoteAdded(added) => {
                let Some(ticket) = state.tickets.get_mut(&added.ticket_id) else {
                    state.unknown_ticket(&added.ticket_id);
                    return SmallVec::new();
                };
                if let Err(error) = ticket.add_note(added.note) {
                    state.last_error = Some(error.to_string());
                }
            },
            SupportAction::AnalyticsFetched(analytics) => state.analytics = Some(analytics),
            SupportAction::EscalationRequested(requested) => {
                match state.escalations.get_mut(&requested.conversation_id) {
                    None => {
                        state.escalations.insert(
                            requested.conversation_id.clone(),
                            Escalation::started(requested.conversation_id, requested.at),
                        );
                    },
                    Some(escalation) => {
                        let restart = EscalationUpdate::status(
                            requested.conversation_id,
                            EscalationStatus::Escalating,
                            requested.at,
                        );
                        if let Err(error) = escalation.apply(&restart) {
                            state.last_error = Some(error.to_string());
                        }
                    },
                }
            },
            SupportAction::EscalationUpdated(update) => {
                match state.escalations.get_mut(&update.conversation_id) {
                    Some(escalation) => {
                        if let Err(error) = escalation.apply(&update) {
                            state.last_error = Some(error.to_string());
                        }
                    },
                    None => {
                        state.last_error = Some(format!(
                            "No escalation in progress for {}",
                            update.conversation_id
                        ));
                    },
                }
            },
            SupportAction::EscalationCleared(conversation_id) => {
                state.escalations.remove(&conversation_id);
            },
        }
        SmallVec::new()
    }
}

fn support(action: SupportAction) -> Result<Option<AppAction>, MappingError> {
    Ok(Some(AppAction::Support(action)))
}

/// Mapping for an escalation status event; the payload status must match
fn escalation_mapping(
    event_type: &'static str,
    expected: EscalationStatus,
    action_type: &'static str,
) -> Mapping<AppState, AppAction> {
    Mapping::new(SERVICE, event_type, action_type, move |_, payload, _| {
        let update: EscalationUpdate = decode(payload)?;
        if update.status != expected {
            return Err(MappingError::Rejected(format!(
                "{event_type} carries status {}",
                update.status
            )));
        }
        support(SupportAction::EscalationUpdated(update))
    })
}

/// `support` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    use events::*;

    vec![
        Mapping::new(SERVICE, TICKET_CREATED, "support/ticketCreated", |_, payload, _| {
            let TicketCreated { ticket } = decode(payload)?;
            support(SupportAction::TicketCreated(ticket))
        }),
        Mapping::new(SERVICE, TICKETS_LOADING, "support/loading", |_, _, _| {
            support(SupportAction::LoadingStarted)
        }),
        Mapping::new(
            SERVICE,
            TICKETS_FETCH_FAILED,
            "support/fetchFailed",
            |_, payload, _| {
                let FetchFailed { reason } = decode(payload)?;
                support(SupportAction::FetchFailed(reason))
            },
        ),
        Mapping::new(
            SERVICE,
            PENDING_TICKETS_FETCHED,
            "support/pendingFetched",
            |_, payload, _| {
                let PendingFetched { tickets } = decode(payload)?;
                support(SupportAction::PendingFetched(tickets))
            },
        ),
        Mapping::new(
            SERVICE,
            MY_TICKETS_FETCHED,
            "support/myTicketsFetched",
            |_, payload, _| {
                let MyTicketsFetched { agent_id, tickets } = decode(payload)?;
                support(SupportAction::MyTicketsFetched { agent_id, tickets })
            },
        ),
        Mapping::new(SERVICE, TICKET_UPDATED, "support/ticketUpdated", |_, payload, _| {
            let TicketUpdated { ticket } = decode(payload)?;
            support(SupportAction::TicketRefreshed(ticket))
        }),
        Mapping::new(SERVICE, TICKET_ASSIGNED, "support/ticketAssigned", |_, payload, _| {
            support(SupportAction::Assigned(decode(payload)?))
        }),
        Mapping::new(
            SERVICE,
            TICKET_ASSIGN_FAILED,
            "support/assignFailed",
            |_, payload, _| support(SupportAction::AssignFailed(decode(payload)?)),
        ),
        Mapping::new(SERVICE, TICKET_RESOLVED, "support/ticketResolved", |_, payload, _| {
            support(SupportAction::Resolved(decode(payload)?))
        }),
        Mapping::new(SERVICE, TICKET_CLOSED, "support/ticketClosed", |_, payload, _| {
            support(SupportAction::Closed(decode(payload)?))
        }),
        Mapping::new(SERVICE, TICKET_NOTE_ADDED, "support/noteAdded", |_, payload, _| {
            support(SupportAction::NoteAdded(decode(payload)?))
        }),
        Mapping::new(
            SERVICE,
            ANALYTICS_FETCHED,
            "support/analyticsFetched",
            |_, payload, _| support(SupportAction::AnalyticsFetched(decode(payload)?)),
        ),
        Mapping::new(
            SERVICE,
            ESCALATION_REQUESTED,
            "support/escalationRequested",
            |_, payload, _| support(SupportAction::EscalationRequested(decode(payload)?)),
        ),
        escalation_mapping(
            ESCALATION_QUEUED,
            EscalationStatus::Pending,
            "support/escalationQueued",
        ),
        escalation_mapping(
            ESCALATION_ASSIGNED,
            EscalationStatus::Assigned,
            "support/escalationAssigned",
        ),
        escalation_mapping(
            ESCALATION_ACTIVE,
            EscalationStatus::ActiveHuman,
            "support/escalationActive",
        ),
        escalation_mapping(
            ESCALATION_RESOLVED,
            EscalationStatus::Resolved,
            "support/escalationResolved",
        ),
        escalation_mapping(
            ESCALATION_FAILED,
            EscalationStatus::Failed,
            "support/escalationFailed",
        ),
        Mapping::new(
            SERVICE,
            ESCALATION_CLEARED,
            "support/escalationCleared",
            |_, payload, _| {
                let EscalationCleared { conversation_id } = decode(payload)?;
                support(SupportAction::EscalationCleared(conversation_id))
            },
        ),
    ]
}
