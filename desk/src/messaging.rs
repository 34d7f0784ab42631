//! Direct messages: optimistic send, reconciliation and realtime intake.
//!
//! [`MessageService::send_message`] publishes a temporary entry right away,
//! hands the message to its [`MessageTransport`] and then publishes exactly
//! one outcome: `MESSAGE_RECONCILED` with the permanent message, or
//! `MESSAGE_SEND_FAILED`. [`RealtimeSync`] forwards what the realtime channel
//! pushes (new messages, status changes, deletions) onto the hub.

use crate::api::MessageApi;
use crate::delivery::{
    FallbackTransport, MessageTransport, OutgoingMessage, RealtimeChannel, RealtimeEvent,
    RealtimeTransport, ReliableTransport,
};
use crate::error::{ApiError, DeskError, ValidationError, Violation};
use crate::slices::messages::{self, events};
use crate::types::{ConversationId, Message, MessageStatus, TemporaryMessage};
use serde::Serialize;
use std::sync::Arc;
use support_sync_core::environment::{Clock, IdGenerator, SystemClock};
use support_sync_core::event_hub::EventHub;
use support_sync_runtime::retry::{retry_if, RetryPolicy};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Temporary ids of the form `temp-<uuid v4>`
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        format!("temp-{}", Uuid::new_v4())
    }
}

fn emit(hub: &EventHub, event_type: &'static str, payload: &impl Serialize) {
    match serde_json::to_value(payload) {
        Ok(payload) => {
            let outcome = hub.emit(messages::SERVICE, event_type, payload);
            tracing::debug!(event_type, invoked = outcome.invoked, "Emitted messages event");
        },
        Err(error) => {
            tracing::error!(event_type, %error, "Failed to encode messages event");
        },
    }
}

/// Message operations
pub struct MessageService {
    hub: EventHub,
    transport: Arc<dyn MessageTransport>,
    api: Arc<dyn MessageApi>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl MessageService {
    /// Service sending through `transport`
    #[must_use]
    pub fn new(
        hub: EventHub,
        transport: Arc<dyn MessageTransport>,
        api: Arc<dyn MessageApi>,
    ) -> Self {
        Self {
            hub,
            transport,
            api,
            ids: Arc::new(UuidIds),
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    /// Realtime first over `channel`, falling back to `api`
    #[must_use]
    pub fn dual(hub: EventHub, channel: Arc<dyn RealtimeChannel>, api: Arc<dyn MessageApi>) -> Self {
        let transport = FallbackTransport::new(
            Arc::new(RealtimeTransport::new(channel)),
            Arc::new(ReliableTransport::new(Arc::clone(&api))),
        );
        Self::new(hub, Arc::new(transport), api)
    }

    /// Temporary id source
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Timestamp source for temporary entries
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Backoff for conversation fetches
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send a text message from `sender` to `recipient`.
    ///
    /// The temporary entry appears in the conversation before delivery starts
    /// and is replaced by the permanent message once a transport confirms it.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] for blank content or a self-conversation
    /// - [`DeskError::Delivery`] when every transport failed; the temporary
    ///   entry is then marked failed
    #[tracing::instrument(skip(self, content))]
    pub async fn send_message(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Result<Message, DeskError> {
        let mut violations = Vec::new();
        if content.trim().is_empty() {
            violations.push(Violation::MessageContentRequired);
        }
        if sender == recipient {
            violations.push(Violation::SelfConversation);
        }
        ValidationError::check(violations)?;

        let conversation_id = ConversationId::between(sender, recipient);
        let temporary = TemporaryMessage {
            temporary_id: self.ids.next_id(),
            conversation_id: conversation_id.clone(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            kind: crate::types::default_message_kind(),
            timestamp: self.clock.now(),
            sending: true,
            error: None,
        };
        let outgoing = OutgoingMessage {
            temporary_id: temporary.temporary_id.clone(),
            conversation_id: conversation_id.clone(),
            sender: temporary.sender.clone(),
            recipient: temporary.recipient.clone(),
            content: temporary.content.clone(),
            kind: temporary.kind.clone(),
        };
        emit(&self.hub, events::MESSAGE_SENDING, &events::Sending { message: temporary });

        match self.transport.deliver(&outgoing).await {
            Ok(delivery) => {
                tracing::debug!(
                    temporary_id = %outgoing.temporary_id,
                    message_id = %delivery.message.id,
                    route = delivery.route.as_str(),
                    "Message reconciled"
                );
                emit(
                    &self.hub,
                    events::MESSAGE_RECONCILED,
                    &events::Reconciled {
                        temporary_id: outgoing.temporary_id,
                        message: delivery.message.clone(),
                    },
                );
                Ok(delivery.message)
            },
            Err(error) => {
                emit(
                    &self.hub,
                    events::MESSAGE_SEND_FAILED,
                    &events::SendFailed {
                        temporary_id: outgoing.temporary_id,
                        conversation_id,
                        error: error.to_string(),
                    },
                );
                Err(DeskError::Delivery(error))
            },
        }
    }

    /// Load a conversation from the backend.
    ///
    /// Temporary entries still in flight are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] once retries are exhausted.
    #[tracing::instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DeskError> {
        let fetched = retry_if(
            &self.retry,
            || self.api.list_messages(conversation_id),
            ApiError::is_transient,
        )
        .await?;

        emit(
            &self.hub,
            events::MESSAGES_FETCHED,
            &events::Fetched {
                conversation_id: conversation_id.clone(),
                messages: fetched.clone(),
            },
        );
        Ok(fetched)
    }

    /// Mark what `reader` received in a conversation as read, then reload it
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] when the backend refuses.
    #[tracing::instrument(skip_all, fields(conversation_id = %conversation_id, reader = %reader))]
    pub async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        reader: &str,
    ) -> Result<Vec<Message>, DeskError> {
        self.api.mark_read(conversation_id, reader).await?;
        self.fetch_conversation(conversation_id).await
    }

    /// Overwrite the delivery status of one message
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] when the backend refuses.
    #[tracing::instrument(skip(self, status))]
    pub async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<Message, DeskError> {
        let message = self.api.update_status(message_id, &status).await?;
        emit(
            &self.hub,
            events::MESSAGE_STATUS_UPDATED,
            &events::StatusUpdated {
                message_id: message.id.clone(),
                conversation_id: message.conversation_id.clone(),
                status: message.status.clone(),
            },
        );
        Ok(message)
    }

    /// Delete a message
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Api`] when the backend refuses.
    #[tracing::instrument(skip(self))]
    pub async fn delete_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
    ) -> Result<(), DeskError> {
        self.api.delete_message(message_id).await?;
        emit(
            &self.hub,
            events::MESSAGE_DELETED,
            &events::Deleted {
                message_id: message_id.to_string(),
                conversation_id: conversation_id.clone(),
            },
        );
        Ok(())
    }
}

/// Forwards inbound realtime events onto the hub until dropped.
///
/// `message_send_failed` is not forwarded: the sender's
/// [`MessageService::send_message`] owns that outcome and falls back to the
/// reliable transport first. Reconciliations are forwarded; applying one
/// twice leaves the conversation unchanged.
pub struct RealtimeSync {
    task: JoinHandle<()>,
}

impl RealtimeSync {
    /// Start forwarding. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(channel: &dyn RealtimeChannel, hub: EventHub) -> Self {
        let mut inbound = channel.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(event) => forward(&hub, event),
                    Err(RecvError::Lagged(skipped)) => {
                        metrics::counter!("realtime.lagged").increment(skipped);
                        tracing::warn!(skipped, "Realtime intake lagged; events dropped");
                    },
                    Err(RecvError::Closed) => {
                        tracing::info!("Realtime channel closed");
                        break;
                    },
                }
            }
        });
        Self { task }
    }

    /// Whether the forwarding task has stopped
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RealtimeSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn forward(hub: &EventHub, event: RealtimeEvent) {
    tracing::trace!(event = event.name(), "Realtime event");
    match event {
        RealtimeEvent::NewMessage(message) => {
            emit(hub, events::NEW_MESSAGE, &events::NewMessage { message });
        },
        RealtimeEvent::ReconcileMessage {
            temporary_id,
            message,
        } => {
            emit(
                hub,
                events::MESSAGE_RECONCILED,
                &events::Reconciled {
                    temporary_id,
                    message,
                },
            );
        },
        RealtimeEvent::MessageStatusUpdate {
            message_id,
            conversation_id,
            status,
        } => {
            emit(
                hub,
                events::MESSAGE_STATUS_UPDATED,
                &events::StatusUpdated {
                    message_id,
                    conversation_id,
                    status,
                },
            );
        },
        RealtimeEvent::MessageDeleted {
            message_id,
            conversation_id,
        } => {
            emit(
                hub,
                events::MESSAGE_DELETED,
                &events::Deleted {
                    message_id,
                    conversation_id,
                },
            );
        },
        RealtimeEvent::MessageSendFailed { temporary_id, .. } => {
            tracing::debug!(%temporary_id, "Send failure left to the sender");
        },
    }
}
