use super::{Delivery, DeliveryError, MessageTransport, OutgoingMessage, Route};
use crate::types::{ConversationId, Message, MessageStatus};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Inbound events of the realtime channel.
///
/// Encoded as `{ "event": "<name>", "data": ... }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// Someone sent a message to this user
    NewMessage(Message),

    /// A message sent over the channel was persisted
    ReconcileMessage {
        /// Local id the message was sent with
        #[serde(rename = "temporaryId")]
        temporary_id: String,
        /// Permanent form
        message: Message,
    },

    /// A message sent over the channel was refused
    MessageSendFailed {
        /// Local id the message was sent with
        #[serde(rename = "temporaryId")]
        temporary_id: String,
        /// Reason given by the peer
        error: String,
    },

    /// Delivery status of a message changed
    MessageStatusUpdate {
        /// Message concerned
        #[serde(rename = "messageId")]
        message_id: String,
        /// Conversation of the message
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
        /// New status
        status: MessageStatus,
    },

    /// A message was deleted
    MessageDeleted {
        /// Message concerned
        #[serde(rename = "messageId")]
        message_id: String,
        /// Conversation of the message
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
    },
}

impl RealtimeEvent {
    /// Wire name of the event
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::ReconcileMessage { .. } => "reconcile_message",
            Self::MessageSendFailed { .. } => "message_send_failed",
            Self::MessageStatusUpdate { .. } => "message_status_update",
            Self::MessageDeleted { .. } => "message_deleted",
        }
    }
}

/// Bidirectional realtime channel.
///
/// Outbound: `join_room`, `send_message`. Inbound: [`RealtimeEvent`] through
/// [`subscribe`](Self::subscribe).
pub trait RealtimeChannel: Send + Sync {
    /// Whether outbound events can currently be sent
    fn is_connected(&self) -> bool;

    /// Join the room of a conversation
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotConnected`] when the channel is down.
    fn join_room(&self, conversation_id: &ConversationId) -> Result<(), DeliveryError>;

    /// Emit `send_message`
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotConnected`] when the channel is down.
    fn send_message(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;

    /// Receive inbound events emitted after this call
    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent>;
}

/// Sends over a [`RealtimeChannel`] and waits for the matching
/// `reconcile_message` or `message_send_failed`.
///
/// This transport has no timeout of its own; wrap it in a
/// [`FallbackTransport`](super::FallbackTransport) to bound the wait.
pub struct RealtimeTransport {
    channel: Arc<dyn RealtimeChannel>,
}

impl RealtimeTransport {
    /// Transport over `channel`
    #[must_use]
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        Self { channel }
    }
}

impl MessageTransport for RealtimeTransport {
    fn name(&self) -> &'static str {
        "realtime"
    }

    fn deliver<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, Result<Delivery, DeliveryError>> {
        Box::pin(async move {
            if !self.channel.is_connected() {
                return Err(DeliveryError::NotConnected);
            }

            // Subscribe before sending so a fast acknowledgement is not missed
            let mut inbound = self.channel.subscribe();
            self.channel.join_room(&message.conversation_id)?;
            self.channel.send_message(message)?;

            loop {
                match inbound.recv().await {
                    Ok(RealtimeEvent::ReconcileMessage {
                        temporary_id,
                        message: permanent,
                    }) if temporary_id == message.temporary_id => {
                        return Ok(Delivery {
                            message: permanent,
                            route: Route::Realtime,
                        });
                    },
                    Ok(RealtimeEvent::MessageSendFailed {
                        temporary_id,
                        error,
                    }) if temporary_id == message.temporary_id => {
                        return Err(DeliveryError::Rejected(error));
                    },
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            temporary_id = %message.temporary_id,
                            skipped,
                            "Realtime receiver lagged while waiting for acknowledgement"
                        );
                    },
                    Err(RecvError::Closed) => return Err(DeliveryError::ChannelClosed),
                }
            }
        })
    }
}

type Responder = Arc<dyn Fn(&OutgoingMessage) -> Option<RealtimeEvent> + Send + Sync>;

struct LocalInner {
    connected: AtomicBool,
    events: broadcast::Sender<RealtimeEvent>,
    rooms: Mutex<Vec<ConversationId>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    responder: Option<Responder>,
}

/// In-process [`RealtimeChannel`].
///
/// Inbound events are injected with [`push`](Self::push), or produced by an
/// optional responder that answers every `send_message`. Used to wire the
/// desk without a socket server.
#[derive(Clone)]
pub struct LocalRealtimeChannel {
    inner: Arc<LocalInner>,
}

impl LocalRealtimeChannel {
    /// A connected channel that never answers by itself
    #[must_use]
    pub fn new() -> Self {
        Self::build(true, None)
    }

    /// A channel that is down; every send fails with `NotConnected`
    #[must_use]
    pub fn disconnected() -> Self {
        Self::build(false, None)
    }

    /// A connected channel answering each `send_message` with `responder`
    #[must_use]
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&OutgoingMessage) -> Option<RealtimeEvent> + Send + Sync + 'static,
    {
        Self::build(true, Some(Arc::new(responder)))
    }

    fn build(connected: bool, responder: Option<Responder>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(LocalInner {
                connected: AtomicBool::new(connected),
                events,
                rooms: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                responder,
            }),
        }
    }

    /// Simulate a connection change
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Inject an inbound event; returns the number of receivers
    pub fn push(&self, event: RealtimeEvent) -> usize {
        self.inner.events.send(event).unwrap_or(0)
    }

    /// Rooms joined so far
    #[must_use]
    pub fn rooms(&self) -> Vec<ConversationId> {
        self.inner
            .rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for LocalRealtimeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel for LocalRealtimeChannel {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn join_room(&self, conversation_id: &ConversationId) -> Result<(), DeliveryError> {
        if !self.is_connected() {
            return Err(DeliveryError::NotConnected);
        }
        let mut rooms = self.inner.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if !rooms.contains(conversation_id) {
            rooms.push(conversation_id.clone());
        }
        Ok(())
    }

    fn send_message(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        if !self.is_connected() {
            return Err(DeliveryError::NotConnected);
        }
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        if let Some(reply) = self.inner.responder.as_ref().and_then(|respond| respond(message)) {
            self.push(reply);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.inner.events.subscribe()
    }
}
