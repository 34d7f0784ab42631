//! Conversations, with optimistic entries.
//!
//! A sent message first appears as a [`MessageEntry::Temporary`] keyed by its
//! temporary id. Reconciliation substitutes the permanent message in the same
//! position, so ordering never changes. Reconciliation is idempotent per
//! temporary id: once the temporary entry is gone, later acknowledgements for
//! it (realtime arriving after the fallback, or the reverse) do nothing.

use crate::app::{AppAction, AppState};
use crate::types::{ConversationId, Message, MessageEntry, MessageStatus, TemporaryMessage};
use std::collections::BTreeMap;
use support_sync_core::mapping::{decode, Mapping};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "messages";

/// Event names and payloads of the `messages` service
pub mod events {
    use crate::types::{ConversationId, Message, MessageStatus, TemporaryMessage};
    use serde::{Deserialize, Serialize};

    /// An optimistic entry was added before the backend answered
    pub const MESSAGE_SENDING: &str = "MESSAGE_SENDING";
    /// The backend acknowledged a temporary message
    pub const MESSAGE_RECONCILED: &str = "MESSAGE_RECONCILED";
    /// A temporary message could not be delivered
    pub const MESSAGE_SEND_FAILED: &str = "MESSAGE_SEND_FAILED";
    /// A permanent message arrived from another participant
    pub const NEW_MESSAGE: &str = "NEW_MESSAGE";
    /// History of a conversation was loaded
    pub const MESSAGES_FETCHED: &str = "MESSAGES_FETCHED";
    /// Delivery status of a permanent message changed
    pub const MESSAGE_STATUS_UPDATED: &str = "MESSAGE_STATUS_UPDATED";
    /// A permanent message was removed
    pub const MESSAGE_DELETED: &str = "MESSAGE_DELETED";

    /// `MESSAGE_SENDING`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Sending {
        /// Optimistic entry shown until reconciliation
        pub message: TemporaryMessage,
    }

    /// `NEW_MESSAGE`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NewMessage {
        /// Incoming message
        pub message: Message,
    }

    /// `MESSAGE_RECONCILED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Reconciled {
        /// Id of the entry being replaced
        pub temporary_id: String,
        /// Permanent message issued by the backend
        pub message: Message,
    }

    /// `MESSAGE_SEND_FAILED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SendFailed {
        /// Id of the failed entry
        pub temporary_id: String,
        /// Conversation holding the entry
        pub conversation_id: ConversationId,
        /// Delivery failure, as displayed
        pub error: String,
    }

    /// `MESSAGES_FETCHED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Fetched {
        /// Conversation the history belongs to
        pub conversation_id: ConversationId,
        /// Permanent messages in display order
        pub messages: Vec<Message>,
    }

    /// `MESSAGE_STATUS_UPDATED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatusUpdated {
        /// Permanent message id
        pub message_id: String,
        /// Conversation holding the message
        pub conversation_id: ConversationId,
        /// New delivery status
        pub status: MessageStatus,
    }

    /// `MESSAGE_DELETED`
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Deleted {
        /// Permanent message id
        pub message_id: String,
        /// Conversation holding the message
        pub conversation_id: ConversationId,
    }
}

/// Messages slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagesState {
    /// Entries per conversation, in display order
    pub conversations: BTreeMap<ConversationId, Vec<MessageEntry>>,
}

impl MessagesState {
    /// Entries of a conversation
    #[must_use]
    pub fn entries(&self, conversation_id: &ConversationId) -> &[MessageEntry] {
        self.conversations
            .get(conversation_id)
            .map_or(&[], Vec::as_slice)
    }

    /// The temporary entry `temporary_id`, if still unreconciled
    #[must_use]
    pub fn temporary(
        &self,
        conversation_id: &ConversationId,
        temporary_id: &str,
    ) -> Option<&TemporaryMessage> {
        self.entries(conversation_id).iter().find_map(|entry| match entry {
            MessageEntry::Temporary(message) if message.temporary_id == temporary_id => {
                Some(message)
            },
            _ => None,
        })
    }

    /// Number of permanent entries with `id`
    #[must_use]
    pub fn permanent_count(&self, conversation_id: &ConversationId, id: &str) -> usize {
        self.entries(conversation_id)
            .iter()
            .filter(|entry| entry.is_permanent(id))
            .count()
    }
}

/// Messages actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagesAction {
    /// Optimistic entry for an outgoing message
    Sending(TemporaryMessage),
    /// Replace a temporary entry with its permanent message
    Reconciled {
        temporary_id: String,
        message: Message,
    },
    /// Delivery gave up on a temporary entry
    SendFailed {
        temporary_id: String,
        conversation_id: ConversationId,
        error: String,
    },
    /// A message from the other participant
    Received(Message),
    /// Authoritative list for one conversation
    Fetched {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },
    StatusUpdated {
        message_id: String,
        conversation_id: ConversationId,
        status: MessageStatus,
    },
    Deleted {
        message_id: String,
        conversation_id: ConversationId,
    },
}

/// Reducer for [`MessagesState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagesReducer;

impl Reducer for MessagesReducer {
    type State = MessagesState;
    type Action = MessagesAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut MessagesState,
        action: MessagesAction,
        _env: &(),
    ) -> SmallVec<[Effect<MessagesAction>; 4]> {
        match action {
            MessagesAction::Sending(message) => {
                let entries = state
                    .conversations
                    .entry(message.conversation_id.clone())
                    .or_default();
                if !entries.iter().any(|e| e.is_temporary(&message.temporary_id)) {
                    entries.push(MessageEntry::Temporary(message));
                }
            },
            MessagesAction::Reconciled {
                temporary_id,
                message,
            } => {
                let Some(entries) = state.conversations.get_mut(&message.conversation_id) else {
                    return SmallVec::new();
                };
                let Some(position) = entries.iter().position(|e| e.is_temporary(&temporary_id))
                else {
                    return SmallVec::new();
                };
                if entries.iter().any(|e| e.is_permanent(&message.id)) {
                    entries.remove(position);
                } else {
                    entries[position] = MessageEntry::Permanent(message);
                }
            },
            MessagesAction::SendFailed {
                temporary_id,
                conversation_id,
                error,
            } => {
                let temporary = state
                    .conversations
                    .get_mut(&conversation_id)
                    .into_iter()
                    .flatten()
                    .find_map(|entry| match entry {
                        MessageEntry::Temporary(m) if m.temporary_id == temporary_id => Some(m),
                        _ => None,
                    });
                if let Some(message) = temporary {
                    message.sending = false;
                    message.error = Some(error);
                }
            },
            MessagesAction::Received(message) => {
                let entries = state
                    .conversations
                    .entry(message.conversation_id.clone())
                    .or_default();
                if !entries.iter().any(|e| e.is_permanent(&message.id)) {
                    entries.push(MessageEntry::Permanent(message));
                }
            },
            MessagesAction::Fetched {
                conversation_id,
                messages,
            } => {
                let in_flight: Vec<MessageEntry> = state
                    .entries(&conversation_id)
                    .iter()
                    .filter(|e| matches!(e, MessageEntry::Temporary(_)))
                    .cloned()
                    .collect();
                let mut entries: Vec<MessageEntry> =
                    messages.into_iter().map(MessageEntry::Permanent).collect();
                entries.extend(in_flight);
                state.conversations.insert(conversation_id, entries);
            },
            MessagesAction::StatusUpdated {
                message_id,
                conversation_id,
                status,
            } => {
                let permanent = state
                    .conversations
                    .get_mut(&conversation_id)
                    .into_iter()
                    .flatten()
                    .find_map(|entry| match entry {
                        MessageEntry::Permanent(m) if m.id == message_id => Some(m),
                        _ => None,
                    });
                if let Some(message) = permanent {
                    message.status = status;
                }
            },
            MessagesAction::Deleted {
                message_id,
                conversation_id,
            } => {
                if let Some(entries) = state.conversations.get_mut(&conversation_id) {
                    entries.retain(|e| !e.is_permanent(&message_id));
                }
            },
        }
        SmallVec::new()
    }
}

fn messages(action: MessagesAction) -> Option<AppAction> {
    Some(AppAction::Messages(action))
}

/// `messages` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    use events::*;

    vec![
        Mapping::new(SERVICE, MESSAGE_SENDING, "messages/sending", |_, payload, _| {
            let Sending { message } = decode(payload)?;
            Ok(messages(MessagesAction::Sending(message)))
        }),
        Mapping::new(
            SERVICE,
            MESSAGE_RECONCILED,
            "messages/reconciled",
            |_, payload, _| {
                let Reconciled {
                    temporary_id,
                    message,
                } = decode(payload)?;
                Ok(messages(MessagesAction::Reconciled {
                    temporary_id,
                    message,
                }))
            },
        ),
        Mapping::new(
            SERVICE,
            MESSAGE_SEND_FAILED,
            "messages/sendFailed",
            |_, payload, _| {
                let SendFailed {
                    temporary_id,
                    conversation_id,
                    error,
                } = decode(payload)?;
                Ok(messages(MessagesAction::SendFailed {
                    temporary_id,
                    conversation_id,
                    error,
                }))
            },
        ),
        Mapping::new(SERVICE, NEW_MESSAGE, "messages/received", |_, payload, _| {
            let NewMessage { message } = decode(payload)?;
            Ok(messages(MessagesAction::Received(message)))
        }),
        Mapping::new(SERVICE, MESSAGES_FETCHED, "messages/fetched", |_, payload, _| {
            let Fetched {
                conversation_id,
                messages: fetched,
            } = decode(payload)?;
            Ok(messages(MessagesAction::Fetched {
                conversation_id,
                messages: fetched,
            }))
        }),
        Mapping::new(
            SERVICE,
            MESSAGE_STATUS_UPDATED,
            "messages/statusUpdated",
            |_, payload, _| {
                let StatusUpdated {
                    message_id,
                    conversation_id,
                    status,
                } = decode(payload)?;
                Ok(messages(MessagesAction::StatusUpdated {
                    message_id,
                    conversation_id,
                    status,
                }))
            },
        ),
        Mapping::new(SERVICE, MESSAGE_DELETED, "messages/deleted", |_, payload, _| {
            let Deleted {
                message_id,
                conversation_id,
            } = decode(payload)?;
            Ok(messages(MessagesAction::Deleted {
                message_id,
                conversation_id,
            }))
        }),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use support_sync_testing::ReducerTest;

    fn conversation() -> ConversationId {
        ConversationId::between("u1", "u2")
    }

    fn temporary(id: &str, content: &str) -> TemporaryMessage {
        TemporaryMessage {
            temporary_id: id.to_string(),
            conversation_id: conversation(),
            sender: "u1".to_string(),
            recipient: "u2".to_string(),
            content: content.to_string(),
            kind: "text".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            sending: true,
            error: None,
        }
    }

    fn permanent(id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation(),
            sender: "u1".to_string(),
            recipient: "u2".to_string(),
            content: content.to_string(),
            kind: "text".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 1).unwrap(),
            status: MessageStatus::default(),
        }
    }

    fn reconciled(temporary_id: &str, id: &str, content: &str) -> MessagesAction {
        MessagesAction::Reconciled {
            temporary_id: temporary_id.to_string(),
            message: permanent(id, content),
        }
    }

    #[test]
    fn reconciliation_substitutes_in_place() {
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Sending(temporary("t1", "first")),
                MessagesAction::Sending(temporary("t2", "second")),
                reconciled("t1", "m1", "first"),
            ])
            .then_state(|state| {
                let entries = state.entries(&conversation());
                assert_eq!(entries.len(), 2);
                assert!(entries[0].is_permanent("m1"));
                assert!(entries[1].is_temporary("t2"));
            })
            .run();
    }

    #[test]
    fn second_reconciliation_is_a_no_op() {
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Sending(temporary("t1", "hi")),
                reconciled("t1", "m1", "hi"),
                reconciled("t1", "m1", "hi"),
                reconciled("t1", "m1-duplicate", "hi"),
            ])
            .then_state(|state| {
                let entries = state.entries(&conversation());
                assert_eq!(entries.len(), 1);
                assert_eq!(state.permanent_count(&conversation(), "m1"), 1);
                assert_eq!(state.permanent_count(&conversation(), "m1-duplicate"), 0);
            })
            .run();
    }

    #[test]
    fn echo_before_acknowledgement_does_not_duplicate() {
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Sending(temporary("t1", "hi")),
                MessagesAction::Received(permanent("m1", "hi")),
                reconciled("t1", "m1", "hi"),
            ])
            .then_state(|state| {
                let entries = state.entries(&conversation());
                assert_eq!(entries.len(), 1);
                assert!(entries[0].is_permanent("m1"));
            })
            .run();
    }

    #[test]
    fn failure_marks_temporary_entry() {
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Sending(temporary("t1", "hi")),
                MessagesAction::SendFailed {
                    temporary_id: "t1".to_string(),
                    conversation_id: conversation(),
                    error: "offline".to_string(),
                },
            ])
            .then_state(|state| {
                let failed = state.temporary(&conversation(), "t1").unwrap();
                assert!(!failed.sending);
                assert_eq!(failed.error.as_deref(), Some("offline"));
            })
            .run();
    }

    #[test]
    fn failure_after_reconciliation_is_ignored() {
        let mut state = MessagesState::default();
        let _ = MessagesReducer.reduce(
            &mut state,
            MessagesAction::Sending(temporary("t1", "hi")),
            &(),
        );
        let _ = MessagesReducer.reduce(&mut state, reconciled("t1", "m1", "hi"), &());

        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(state)
            .when_action(MessagesAction::SendFailed {
                temporary_id: "t1".to_string(),
                conversation_id: conversation(),
                error: "late".to_string(),
            })
            .then_unchanged()
            .run();
    }

    #[test]
    fn fetch_keeps_in_flight_entries() {
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Received(permanent("old", "stale")),
                MessagesAction::Sending(temporary("t9", "pending")),
                MessagesAction::Fetched {
                    conversation_id: conversation(),
                    messages: vec![permanent("m1", "a"), permanent("m2", "b")],
                },
            ])
            .then_state(|state| {
                let keys: Vec<&str> = state
                    .entries(&conversation())
                    .iter()
                    .map(MessageEntry::key)
                    .collect();
                assert_eq!(keys, vec!["m1", "m2", "t9"]);
            })
            .run();
    }

    #[test]
    fn status_update_and_delete() {
        let read = MessageStatus {
            delivered: true,
            read: true,
            read_at: None,
        };
        let expected = read.clone();
        ReducerTest::new(MessagesReducer)
            .with_env(())
            .given_state(MessagesState::default())
            .when_actions([
                MessagesAction::Received(permanent("m1", "a")),
                MessagesAction::Received(permanent("m2", "b")),
                MessagesAction::StatusUpdated {
                    message_id: "m1".to_string(),
                    conversation_id: conversation(),
                    status: read,
                },
                MessagesAction::Deleted {
                    message_id: "m2".to_string(),
                    conversation_id: conversation(),
                },
            ])
            .then_state(move |state| {
                let entries = state.entries(&conversation());
                assert_eq!(entries.len(), 1);
                let MessageEntry::Permanent(m1) = &entries[0] else {
                    unreachable!("m1 is permanent");
                };
                assert_eq!(m1.status, expected);
            })
            .run();
    }

    proptest! {
        /// However acknowledgements interleave, each temporary id ends up as
        /// at most one permanent entry.
        #[test]
        fn repeated_reconciliation_never_duplicates(
            order in proptest::collection::vec(0..3usize, 1..12)
        ) {
            let mut state = MessagesState::default();
            for i in 0..3 {
                let _ = MessagesReducer.reduce(
                    &mut state,
                    MessagesAction::Sending(temporary(&format!("t{i}"), "x")),
                    &(),
                );
            }
            for i in order {
                let _ = MessagesReducer.reduce(
                    &mut state,
                    reconciled(&format!("t{i}"), &format!("m{i}"), "x"),
                    &(),
                );
            }

            let entries = state.entries(&conversation());
            prop_assert_eq!(entries.len(), 3);
            for i in 0..3 {
                let server_id = format!("m{i}");
                prop_assert!(state.permanent_count(&conversation(), &server_id) <= 1);
            }
        }
    }
}
