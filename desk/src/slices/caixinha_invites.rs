//! Invitations to join a caixinha (shared savings group).

use crate::app::{AppAction, AppState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use support_sync_core::mapping::{decode_field, ActionType, Mapping, MappingError};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "caixinhaInvites";

const RECEIVED: &str = "caixinhaInvites/receivedFetched";
const SENT: &str = "caixinhaInvites/sentFetched";
const UNKNOWN: &str = "caixinhaInvites/unknown";

/// One group invitation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaixinhaInvite {
    pub id: String,
    /// Group the invitation is for
    pub caixinha_id: String,
    #[serde(default)]
    pub caixinha_name: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Caixinha invites slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaixinhaInvitesState {
    pub received: Vec<CaixinhaInvite>,
    pub sent: Vec<CaixinhaInvite>,
}

/// Caixinha invites actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaixinhaInvitesAction {
    /// Invitations addressed to the user
    ReceivedFetched(Vec<CaixinhaInvite>),
    /// Invitations the user sent
    SentFetched(Vec<CaixinhaInvite>),
    /// The user joined the group
    Accepted {
        /// Invitation answered
        invite_id: String,
    },
    /// The user declined
    Rejected {
        /// Invitation answered
        invite_id: String,
    },
}

/// Reducer for [`CaixinhaInvitesState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct CaixinhaInvitesReducer;

impl Reducer for CaixinhaInvitesReducer {
    type State = CaixinhaInvitesState;
    type Action = CaixinhaInvitesAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut CaixinhaInvitesState,
        action: CaixinhaInvitesAction,
        _env: &(),
    ) -> SmallVec<[Effect<CaixinhaInvitesAction>; 4]> {
        match action {
            CaixinhaInvitesAction::ReceivedFetched(invites) => state.received = invites,
            CaixinhaInvitesAction::SentFetched(invites) => state.sent = invites,
            CaixinhaInvitesAction::Accepted { invite_id }
            | CaixinhaInvitesAction::Rejected { invite_id } => {
                state.received.retain(|i| i.id != invite_id);
            },
        }
        SmallVec::new()
    }
}

fn fetched_route(payload: &Value) -> &'static str {
    match payload.get("type").and_then(Value::as_str) {
        Some("received") => RECEIVED,
        Some("sent") => SENT,
        _ => UNKNOWN,
    }
}

/// `caixinhaInvites` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(
            SERVICE,
            "CAIXINHA_INVITES_FETCHED",
            ActionType::Dynamic(fetched_route),
            |action_type, payload, _| {
                let invites = decode_field(payload, "invites")?;
                let action = match action_type {
                    RECEIVED => CaixinhaInvitesAction::ReceivedFetched(invites),
                    SENT => CaixinhaInvitesAction::SentFetched(invites),
                    other => return Err(MappingError::UnknownActionType(other.to_string())),
                };
                Ok(Some(AppAction::CaixinhaInvites(action)))
            },
        ),
        Mapping::new(
            SERVICE,
            "CAIXINHA_INVITE_ACCEPTED",
            "caixinhaInvites/accepted",
            |_, payload, _| {
                Ok(Some(AppAction::CaixinhaInvites(
                    CaixinhaInvitesAction::Accepted {
                        invite_id: decode_field(payload, "inviteId")?,
                    },
                )))
            },
        ),
        Mapping::new(
            SERVICE,
            "CAIXINHA_INVITE_REJECTED",
            "caixinhaInvites/rejected",
            |_, payload, _| {
                Ok(Some(AppAction::CaixinhaInvites(
                    CaixinhaInvitesAction::Rejected {
                        invite_id: decode_field(payload, "inviteId")?,
                    },
                )))
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_sync_testing::ReducerTest;

    fn invite(id: &str) -> CaixinhaInvite {
        CaixinhaInvite {
            id: id.to_string(),
            caixinha_id: "cx-1".to_string(),
            caixinha_name: None,
            from: "u1".to_string(),
            to: "u2".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn answering_removes_received_invite() {
        ReducerTest::new(CaixinhaInvitesReducer)
            .with_env(())
            .given_state(CaixinhaInvitesState {
                received: vec![invite("i1"), invite("i2")],
                sent: vec![],
            })
            .when_actions([
                CaixinhaInvitesAction::Accepted {
                    invite_id: "i1".to_string(),
                },
                CaixinhaInvitesAction::Rejected {
                    invite_id: "i2".to_string(),
                },
            ])
            .then_state(|state| assert!(state.received.is_empty()))
            .run();
    }

    #[test]
    fn route_defaults_to_unknown() {
        assert_eq!(fetched_route(&serde_json::json!({})), UNKNOWN);
        assert_eq!(fetched_route(&serde_json::json!({ "type": "sent" })), SENT);
    }
}
