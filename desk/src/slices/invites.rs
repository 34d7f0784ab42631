//! Platform invitations, received and sent.

use crate::app::{AppAction, AppState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use support_sync_core::mapping::{decode_field, ActionType, Mapping, MappingError};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "invites";

const RECEIVED: &str = "invites/receivedFetched";
const SENT: &str = "invites/sentFetched";
const UNKNOWN: &str = "invites/unknown";

/// One invitation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: String,
    /// Inviting user
    pub from: String,
    /// Invited user or email
    pub to: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Invites slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvitesState {
    pub received: Vec<Invite>,
    pub sent: Vec<Invite>,
    pub error: Option<String>,
}

/// Invites actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvitesAction {
    /// Invitations addressed to the user
    ReceivedFetched(Vec<Invite>),
    /// Invitations the user sent
    SentFetched(Vec<Invite>),
    /// The user sent an invitation
    Sent(Invite),
    /// The user withdrew an invitation
    Canceled {
        /// Invitation withdrawn
        invite_id: String,
    },
}

/// Reducer for [`InvitesState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct InvitesReducer;

impl Reducer for InvitesReducer {
    type State = InvitesState;
    type Action = InvitesAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut InvitesState,
        action: InvitesAction,
        _env: &(),
    ) -> SmallVec<[Effect<InvitesAction>; 4]> {
        match action {
            InvitesAction::ReceivedFetched(invites) => state.received = invites,
            InvitesAction::SentFetched(invites) => state.sent = invites,
            InvitesAction::Sent(invite) => {
                state.sent.retain(|i| i.id != invite.id);
                state.sent.push(invite);
            },
            InvitesAction::Canceled { invite_id } => state.sent.retain(|i| i.id != invite_id),
        }
        SmallVec::new()
    }
}

/// `INVITES_FETCHED` carries `type: "received" | "sent"`
fn fetched_route(payload: &Value) -> &'static str {
    match payload.get("type").and_then(Value::as_str) {
        Some("received") => RECEIVED,
        Some("sent") => SENT,
        _ => UNKNOWN,
    }
}

/// `invites` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(
            SERVICE,
            "INVITES_FETCHED",
            ActionType::Dynamic(fetched_route),
            |action_type, payload, _| {
                let invites = decode_field(payload, "invites")?;
                let action = match action_type {
                    RECEIVED => InvitesAction::ReceivedFetched(invites),
                    SENT => InvitesAction::SentFetched(invites),
                    other => return Err(MappingError::UnknownActionType(other.to_string())),
                };
                Ok(Some(AppAction::Invites(action)))
            },
        ),
        Mapping::new(SERVICE, "INVITE_SENT", "invites/sent", |_, payload, _| {
            Ok(Some(AppAction::Invites(InvitesAction::Sent(decode_field(
                payload, "invite",
            )?))))
        }),
        Mapping::new(
            SERVICE,
            "INVITE_CANCELED",
            "invites/canceled",
            |_, payload, _| {
                Ok(Some(AppAction::Invites(InvitesAction::Canceled {
                    invite_id: decode_field(payload, "inviteId")?,
                })))
            },
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use support_sync_testing::ReducerTest;

    fn fetched_mapping() -> Mapping<AppState, AppAction> {
        mappings()
            .into_iter()
            .find(|m| m.event_type() == "INVITES_FETCHED")
            .unwrap()
    }

    fn invite_json(id: &str) -> Value {
        json!({ "id": id, "from": "u1", "to": "u2" })
    }

    #[test]
    fn fetched_routes_on_type_flag() {
        let mapping = fetched_mapping();
        let state = AppState::default();

        let received = mapping
            .apply(&json!({ "type": "received", "invites": [invite_json("i1")] }), &state)
            .unwrap();
        let sent = mapping
            .apply(&json!({ "type": "sent", "invites": [] }), &state)
            .unwrap();

        assert!(matches!(
            received,
            Some(AppAction::Invites(InvitesAction::ReceivedFetched(ref v))) if v.len() == 1
        ));
        assert_eq!(
            sent,
            Some(AppAction::Invites(InvitesAction::SentFetched(vec![])))
        );
    }

    #[test]
    fn unknown_type_is_a_mapping_error() {
        let error = fetched_mapping()
            .apply(&json!({ "type": "archived", "invites": [] }), &AppState::default())
            .unwrap_err();

        assert_eq!(error, MappingError::UnknownActionType(UNKNOWN.to_string()));
    }

    #[test]
    fn cancel_removes_sent_invite() {
        let invite: Invite = serde_json::from_value(invite_json("i1")).unwrap();
        ReducerTest::new(InvitesReducer)
            .with_env(())
            .given_state(InvitesState::default())
            .when_actions([
                InvitesAction::Sent(invite),
                InvitesAction::Canceled {
                    invite_id: "i1".to_string(),
                },
            ])
            .then_unchanged()
            .run();
    }
}
