//! Friends and pending connection requests.

use crate::app::{AppAction, AppState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use support_sync_core::mapping::{decode, decode_field, Mapping};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "connections";

/// An established connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// The other user
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// An incoming request waiting for an answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    /// Request id
    pub id: String,
    /// Requesting user
    pub from: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Connections slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionsState {
    /// Established connections
    pub friends: Vec<Connection>,
    /// Incoming requests
    pub requests: Vec<ConnectionRequest>,
    /// Last error
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fetched {
    #[serde(default)]
    friends: Vec<Connection>,
    #[serde(default)]
    requests: Vec<ConnectionRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    request_id: String,
    connection: Connection,
}

/// Connections actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionsAction {
    /// Full refresh
    Fetched {
        /// Established connections
        friends: Vec<Connection>,
        /// Incoming requests
        requests: Vec<ConnectionRequest>,
    },
    /// A new incoming request
    RequestReceived(ConnectionRequest),
    /// A request was accepted
    Accepted {
        /// Request answered
        request_id: String,
        /// Resulting connection
        connection: Connection,
    },
    /// A connection was removed
    Removed {
        /// The other user
        uid: String,
    },
}

/// Reducer for [`ConnectionsState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionsReducer;

impl Reducer for ConnectionsReducer {
    type State = ConnectionsState;
    type Action = ConnectionsAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut ConnectionsState,
        action: ConnectionsAction,
        _env: &(),
    ) -> SmallVec<[Effect<ConnectionsAction>; 4]> {
        match action {
            ConnectionsAction::Fetched { friends, requests } => {
                state.friends = friends;
                state.requests = requests;
                state.error = None;
            },
            ConnectionsAction::RequestReceived(request) => {
                if !state.requests.iter().any(|r| r.id == request.id) {
                    state.requests.push(request);
                }
            },
            ConnectionsAction::Accepted {
                request_id,
                connection,
            } => {
                state.requests.retain(|r| r.id != request_id);
                if !state.friends.iter().any(|f| f.uid == connection.uid) {
                    state.friends.push(connection);
                }
            },
            ConnectionsAction::Removed { uid } => state.friends.retain(|f| f.uid != uid),
        }
        SmallVec::new()
    }
}

/// `connections` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(
            SERVICE,
            "CONNECTIONS_FETCHED",
            "connections/fetched",
            |_, payload, _| {
                let Fetched { friends, requests } = decode(payload)?;
                Ok(Some(AppAction::Connections(ConnectionsAction::Fetched {
                    friends,
                    requests,
                })))
            },
        ),
        Mapping::new(
            SERVICE,
            "CONNECTION_REQUEST_RECEIVED",
            "connections/requestReceived",
            |_, payload, _| {
                Ok(Some(AppAction::Connections(
                    ConnectionsAction::RequestReceived(decode_field(payload, "request")?),
                )))
            },
        ),
        Mapping::new(
            SERVICE,
            "CONNECTION_ACCEPTED",
            "connections/accepted",
            |_, payload, _| {
                let Accepted {
                    request_id,
                    connection,
                } = decode(payload)?;
                Ok(Some(AppAction::Connections(ConnectionsAction::Accepted {
                    request_id,
                    connection,
                })))
            },
        ),
        Mapping::new(
            SERVICE,
            "CONNECTION_REMOVED",
            "connections/removed",
            |_, payload, _| {
                Ok(Some(AppAction::Connections(ConnectionsAction::Removed {
                    uid: decode_field(payload, "uid")?,
                })))
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_sync_testing::ReducerTest;

    fn friend(uid: &str) -> Connection {
        Connection {
            uid: uid.to_string(),
            display_name: None,
            since: None,
        }
    }

    fn request(id: &str, from: &str) -> ConnectionRequest {
        ConnectionRequest {
            id: id.to_string(),
            from: from.to_string(),
            created_at: None,
        }
    }

    #[test]
    fn accepting_moves_request_to_friends() {
        ReducerTest::new(ConnectionsReducer)
            .with_env(())
            .given_state(ConnectionsState {
                requests: vec![request("r1", "u2")],
                ..ConnectionsState::default()
            })
            .when_action(ConnectionsAction::Accepted {
                request_id: "r1".to_string(),
                connection: friend("u2"),
            })
            .then_state(|state| {
                assert!(state.requests.is_empty());
                assert_eq!(state.friends, vec![friend("u2")]);
            })
            .run();
    }

    #[test]
    fn duplicate_request_is_ignored() {
        ReducerTest::new(ConnectionsReducer)
            .with_env(())
            .given_state(ConnectionsState {
                requests: vec![request("r1", "u2")],
                ..ConnectionsState::default()
            })
            .when_action(ConnectionsAction::RequestReceived(request("r1", "u2")))
            .then_unchanged()
            .run();
    }

    #[test]
    fn removal_drops_friend() {
        ReducerTest::new(ConnectionsReducer)
            .with_env(())
            .given_state(ConnectionsState {
                friends: vec![friend("u2"), friend("u3")],
                ..ConnectionsState::default()
            })
            .when_action(ConnectionsAction::Removed {
                uid: "u2".to_string(),
            })
            .then_state(|state| assert_eq!(state.friends, vec![friend("u3")]))
            .run();
    }
}
