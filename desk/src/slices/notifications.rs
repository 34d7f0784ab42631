//! In-app notifications.
//!
//! Besides its own service, this slice listens to two `support` events: a
//! resolved ticket always produces a notification, and an assignment produces
//! one only for the agent who received the ticket.

use crate::app::{AppAction, AppState};
use crate::slices::support::{self, events::TicketAssigned, events::TicketResolved};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use support_sync_core::mapping::{decode, decode_field, Mapping};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "notifications";

/// One notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// `support`, `connection`, `caixinha`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notifications slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationsState {
    /// Newest first
    pub items: Vec<Notification>,
    /// Items with `read == false`
    pub unread: usize,
}

impl NotificationsState {
    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.read).count();
    }
}

/// Notifications actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationsAction {
    /// A new notification; ignored if its id is already present
    Received(Notification),
    /// Full refresh
    Fetched(Vec<Notification>),
    Read {
        id: String,
    },
    AllRead,
    Deleted {
        id: String,
    },
}

/// Reducer for [`NotificationsState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct NotificationsReducer;

impl Reducer for NotificationsReducer {
    type State = NotificationsState;
    type Action = NotificationsAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut NotificationsState,
        action: NotificationsAction,
        _env: &(),
    ) -> SmallVec<[Effect<NotificationsAction>; 4]> {
        match action {
            NotificationsAction::Received(notification) => {
                if !state.items.iter().any(|n| n.id == notification.id) {
                    state.items.insert(0, notification);
                }
            },
            NotificationsAction::Fetched(mut items) => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                state.items = items;
            },
            NotificationsAction::Read { id } => {
                if let Some(n) = state.items.iter_mut().find(|n| n.id == id) {
                    n.read = true;
                }
            },
            NotificationsAction::AllRead => state.items.iter_mut().for_each(|n| n.read = true),
            NotificationsAction::Deleted { id } => state.items.retain(|n| n.id != id),
        }
        state.recount();
        SmallVec::new()
    }
}

fn notify(notification: Notification) -> Option<AppAction> {
    Some(AppAction::Notifications(NotificationsAction::Received(
        notification,
    )))
}

/// `notifications` event mappings, plus the `support` fan-out
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(
            SERVICE,
            "NOTIFICATION_RECEIVED",
            "notifications/received",
            |_, payload, _| Ok(notify(decode_field(payload, "notification")?)),
        ),
        Mapping::new(
            SERVICE,
            "NOTIFICATIONS_FETCHED",
            "notifications/fetched",
            |_, payload, _| {
                Ok(Some(AppAction::Notifications(NotificationsAction::Fetched(
                    decode_field(payload, "notifications")?,
                ))))
            },
        ),
        Mapping::new(
            SERVICE,
            "NOTIFICATION_READ",
            "notifications/read",
            |_, payload, _| {
                Ok(Some(AppAction::Notifications(NotificationsAction::Read {
                    id: decode_field(payload, "notificationId")?,
                })))
            },
        ),
        Mapping::new(
            SERVICE,
            "ALL_NOTIFICATIONS_READ",
            "notifications/allRead",
            |_, _, _| Ok(Some(AppAction::Notifications(NotificationsAction::AllRead))),
        ),
        Mapping::new(
            SERVICE,
            "NOTIFICATION_DELETED",
            "notifications/deleted",
            |_, payload, _| {
                Ok(Some(AppAction::Notifications(NotificationsAction::Deleted {
                    id: decode_field(payload, "notificationId")?,
                })))
            },
        ),
        Mapping::new(
            support::SERVICE,
            support::events::TICKET_RESOLVED,
            "notifications/received",
            |_, payload, _| {
                let resolved: TicketResolved = decode(payload)?;
                Ok(notify(Notification {
                    id: format!("ticket-resolved-{}", resolved.ticket_id),
                    kind: "support".to_string(),
                    title: "Ticket resolved".to_string(),
                    body: format!("\"{}\": {}", resolved.title, resolved.resolution),
                    read: false,
                    created_at: resolved.resolved_at,
                }))
            },
        ),
        Mapping::new(
            support::SERVICE,
            support::events::TICKET_ASSIGNED,
            "notifications/received",
            |_, payload, state: &AppState| {
                let assigned: TicketAssigned = decode(payload)?;
                if state.auth.user_id() != Some(assigned.agent_id.as_str()) {
                    return Ok(None);
                }
                Ok(notify(Notification {
                    id: format!("ticket-assigned-{}", assigned.ticket_id),
                    kind: "support".to_string(),
                    title: "Ticket assigned to you".to_string(),
                    body: assigned.title,
                    read: false,
                    created_at: assigned.assigned_at,
                }))
            },
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slices::auth::{AuthState, AuthUser};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use support_sync_testing::ReducerTest;

    fn notification(id: &str, minute: u32, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            kind: "support".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            read,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, minute, 0).unwrap(),
        }
    }

    fn assigned_mapping() -> Mapping<AppState, AppAction> {
        mappings()
            .into_iter()
            .find(|m| m.service() == support::SERVICE && m.event_type() == "TICKET_ASSIGNED")
            .unwrap()
    }

    fn signed_in(uid: &str) -> AppState {
        AppState {
            auth: Arc::new(AuthState {
                user: Some(AuthUser {
                    uid: uid.to_string(),
                    ..AuthUser::default()
                }),
                authenticated: true,
                error: None,
            }),
            ..AppState::default()
        }
    }

    #[test]
    fn received_is_idempotent_and_counts_unread() {
        ReducerTest::new(NotificationsReducer)
            .with_env(())
            .given_state(NotificationsState::default())
            .when_actions([
                NotificationsAction::Received(notification("n1", 0, false)),
                NotificationsAction::Received(notification("n1", 0, false)),
                NotificationsAction::Received(notification("n2", 1, true)),
            ])
            .then_state(|state| {
                assert_eq!(state.items.len(), 2);
                assert_eq!(state.items[0].id, "n2");
                assert_eq!(state.unread, 1);
            })
            .run();
    }

    #[test]
    fn all_read_clears_unread() {
        ReducerTest::new(NotificationsReducer)
            .with_env(())
            .given_state(NotificationsState::default())
            .when_actions([
                NotificationsAction::Fetched(vec![
                    notification("n1", 0, false),
                    notification("n2", 5, false),
                ]),
                NotificationsAction::AllRead,
            ])
            .then_state(|state| {
                assert_eq!(state.items[0].id, "n2");
                assert_eq!(state.unread, 0);
            })
            .run();
    }

    #[test]
    fn assignment_notifies_only_the_assignee() {
        let payload = json!({
            "ticketId": "T1",
            "agentId": "A1",
            "title": "App crashes",
            "assignedAt": "2025-01-01T09:05:00Z",
        });
        let mapping = assigned_mapping();

        let for_assignee = mapping.apply(&payload, &signed_in("A1")).unwrap();
        let for_other = mapping.apply(&payload, &signed_in("A2")).unwrap();
        let signed_out = mapping.apply(&payload, &AppState::default()).unwrap();

        assert!(matches!(
            for_assignee,
            Some(AppAction::Notifications(NotificationsAction::Received(ref n)))
                if n.id == "ticket-assigned-T1"
        ));
        assert_eq!(for_other, None);
        assert_eq!(signed_out, None);
    }
}
