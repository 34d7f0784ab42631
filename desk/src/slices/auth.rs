//! Signed-in user.

use crate::app::{AppAction, AppState};
use serde::{Deserialize, Serialize};
use support_sync_core::mapping::{decode, decode_field, Mapping};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "auth";

/// The authenticated user as reported by the identity provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// User id
    pub uid: String,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,
    /// Capability strings
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Auth slice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Current user
    pub user: Option<AuthUser>,
    /// Whether a user is signed in
    pub authenticated: bool,
    /// Last authentication error
    pub error: Option<String>,
}

impl AuthState {
    /// Id of the signed-in user
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.uid.as_str())
    }
}

/// Auth actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthAction {
    /// Sign-in succeeded
    LoggedIn(AuthUser),
    /// The identity provider reported a (possibly empty) session
    StateChanged(Option<AuthUser>),
    /// Signed out
    LoggedOut,
    /// Sign-in or session refresh failed
    Failed(String),
}

/// Reducer for [`AuthState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthReducer;

impl Reducer for AuthReducer {
    type State = AuthState;
    type Action = AuthAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut AuthState,
        action: AuthAction,
        _env: &(),
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        match action {
            AuthAction::LoggedIn(user) => {
                state.user = Some(user);
                state.authenticated = true;
                state.error = None;
            },
            AuthAction::StateChanged(user) => {
                state.authenticated = user.is_some();
                state.user = user;
            },
            AuthAction::LoggedOut => *state = AuthState::default(),
            AuthAction::Failed(error) => state.error = Some(error),
        }
        SmallVec::new()
    }
}

/// `auth` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(SERVICE, "LOGIN_SUCCESS", "auth/loggedIn", |_, payload, _| {
            Ok(Some(AppAction::Auth(AuthAction::LoggedIn(decode_field(
                payload, "user",
            )?))))
        }),
        Mapping::new(
            SERVICE,
            "AUTH_STATE_CHANGED",
            "auth/stateChanged",
            |_, payload, _| {
                let user = payload
                    .get("user")
                    .map(decode::<Option<AuthUser>>)
                    .transpose()?
                    .flatten();
                Ok(Some(AppAction::Auth(AuthAction::StateChanged(user))))
            },
        ),
        Mapping::new(SERVICE, "LOGOUT", "auth/loggedOut", |_, _, _| {
            Ok(Some(AppAction::Auth(AuthAction::LoggedOut)))
        }),
        Mapping::new(SERVICE, "AUTH_ERROR", "auth/failed", |_, payload, _| {
            Ok(Some(AppAction::Auth(AuthAction::Failed(decode_field(
                payload, "error",
            )?))))
        }),
    ]
}
