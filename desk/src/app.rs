//! Application state tree and wiring.
//!
//! [`AppState`] holds one copy-on-write slice per domain. The combined
//! [`AppReducer`] routes each [`AppAction`] variant to its slice; slices that
//! an action does not touch keep their `Arc`, so consumers can detect change
//! with `Arc::ptr_eq`.

use crate::slices::auth::{self, AuthAction, AuthReducer, AuthState};
use crate::slices::caixinha_invites::{
    self, CaixinhaInvitesAction, CaixinhaInvitesReducer, CaixinhaInvitesState,
};
use crate::slices::connections::{self, ConnectionsAction, ConnectionsReducer, ConnectionsState};
use crate::slices::invites::{self, InvitesAction, InvitesReducer, InvitesState};
use crate::slices::messages::{self, MessagesAction, MessagesReducer, MessagesState};
use crate::slices::notifications::{
    self, NotificationsAction, NotificationsReducer, NotificationsState,
};
use crate::slices::preferences::{self, PreferencesAction, PreferencesReducer, PreferencesState};
use crate::slices::support::{self, SupportAction, SupportReducer, SupportState};
use std::sync::Arc;
use support_sync_core::composition::{combine_reducers, slice_reducer, CombinedReducer};
use support_sync_core::event_hub::EventHub;
use support_sync_core::mapping::Mapping;
use support_sync_core::Reducer;
use support_sync_runtime::{ActionBridge, Store, StoreError};

/// The whole client-side state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    pub auth: Arc<AuthState>,
    pub connections: Arc<ConnectionsState>,
    pub invites: Arc<InvitesState>,
    pub notifications: Arc<NotificationsState>,
    pub support: Arc<SupportState>,
    pub preferences: Arc<PreferencesState>,
    pub caixinha_invites: Arc<CaixinhaInvitesState>,
    pub messages: Arc<MessagesState>,
}

/// Every action the store accepts, tagged by slice
#[derive(Clone, Debug, PartialEq)]
pub enum AppAction {
    Auth(AuthAction),
    Connections(ConnectionsAction),
    Invites(InvitesAction),
    Notifications(NotificationsAction),
    Support(SupportAction),
    Preferences(PreferencesAction),
    CaixinhaInvites(CaixinhaInvitesAction),
    Messages(MessagesAction),
}

/// Reducer over [`AppState`]
pub type AppReducer = CombinedReducer<AppState, AppAction, ()>;

/// The application store
pub type DeskStore = Store<AppState, AppAction, (), AppReducer>;

/// Hub → store bridge for the application store
pub type DeskBridge = ActionBridge<AppState, AppAction, (), AppReducer>;

type BoxedReducer = Box<dyn Reducer<State = AppState, Action = AppAction, Environment = ()> + Send + Sync>;

const fn unit(env: &()) -> &() {
    env
}

/// Combine all slice reducers
#[must_use]
pub fn app_reducer() -> AppReducer {
    let reducers: Vec<BoxedReducer> = vec![
        Box::new(slice_reducer(
            AuthReducer,
            |state: &mut AppState| &mut state.auth,
            |action: AppAction| match action {
                AppAction::Auth(action) => Some(action),
                _ => None,
            },
            AppAction::Auth,
            unit,
        )),
        Box::new(slice_reducer(
            ConnectionsReducer,
            |state: &mut AppState| &mut state.connections,
            |action: AppAction| match action {
                AppAction::Connections(action) => Some(action),
                _ => None,
            },
            AppAction::Connections,
            unit,
        )),
        Box::new(slice_reducer(
            InvitesReducer,
            |state: &mut AppState| &mut state.invites,
            |action: AppAction| match action {
                AppAction::Invites(action) => Some(action),
                _ => None,
            },
            AppAction::Invites,
            unit,
        )),
        Box::new(slice_reducer(
            NotificationsReducer,
            |state: &mut AppState| &mut state.notifications,
            |action: AppAction| match action {
                AppAction::Notifications(action) => Some(action),
                _ => None,
            },
            AppAction::Notifications,
            unit,
        )),
        Box::new(slice_reducer(
            SupportReducer,
            |state: &mut AppState| &mut state.support,
            |action: AppAction| match action {
                AppAction::Support(action) => Some(action),
                _ => None,
            },
            AppAction::Support,
            unit,
        )),
        Box::new(slice_reducer(
            PreferencesReducer,
            |state: &mut AppState| &mut state.preferences,
            |action: AppAction| match action {
                AppAction::Preferences(action) => Some(action),
                _ => None,
            },
            AppAction::Preferences,
            unit,
        )),
        Box::new(slice_reducer(
            CaixinhaInvitesReducer,
            |state: &mut AppState| &mut state.caixinha_invites,
            |action: AppAction| match action {
                AppAction::CaixinhaInvites(action) => Some(action),
                _ => None,
            },
            AppAction::CaixinhaInvites,
            unit,
        )),
        Box::new(slice_reducer(
            MessagesReducer,
            |state: &mut AppState| &mut state.messages,
            |action: AppAction| match action {
                AppAction::Messages(action) => Some(action),
                _ => None,
            },
            AppAction::Messages,
            unit,
        )),
    ];
    combine_reducers(reducers)
}

/// Every domain's mapping table
#[must_use]
pub fn default_mappings() -> Vec<Mapping<AppState, AppAction>> {
    [
        auth::mappings(),
        connections::mappings(),
        invites::mappings(),
        notifications::mappings(),
        support::mappings(),
        preferences::mappings(),
        caixinha_invites::mappings(),
        messages::mappings(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Hub, store and an active bridge between them.
///
/// Construct one per application session; [`shutdown`](Self::shutdown)
/// unsubscribes the bridge so no handler outlives the session.
#[derive(Clone)]
pub struct SyncLayer {
    hub: EventHub,
    store: DeskStore,
    bridge: DeskBridge,
}

impl SyncLayer {
    /// Fresh store with every mapping table active on `hub`
    #[must_use]
    pub fn new(hub: EventHub) -> Self {
        let store = Store::new(AppState::default(), app_reducer(), ());
        let bridge = ActionBridge::new(hub.clone(), store.clone());
        bridge.register_mappings(default_mappings());
        let subscribed = bridge.activate();
        tracing::info!(
            mappings = bridge.mapping_count(),
            subscribed,
            "Sync layer active"
        );

        Self { hub, store, bridge }
    }

    /// The event hub services emit on
    #[must_use]
    pub const fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// The application store
    #[must_use]
    pub const fn store(&self) -> &DeskStore {
        &self.store
    }

    /// The bridge
    #[must_use]
    pub const fn bridge(&self) -> &DeskBridge {
        &self.bridge
    }

    /// Snapshot of the whole state
    #[must_use]
    pub fn state(&self) -> AppState {
        self.store.snapshot()
    }

    /// Unsubscribe from the hub and drain the store
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if store effects do not finish.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.bridge.deactivate();
        self.store.shutdown_default().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slices::support::events;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn every_domain_has_mappings() {
        let services: HashSet<String> = default_mappings()
            .iter()
            .map(|m| m.service().to_string())
            .collect();

        for service in [
            auth::SERVICE,
            connections::SERVICE,
            invites::SERVICE,
            notifications::SERVICE,
            support::SERVICE,
            preferences::SERVICE,
            caixinha_invites::SERVICE,
            messages::SERVICE,
        ] {
            assert!(services.contains(service), "no mappings for {service}");
        }
    }

    #[test]
    fn untouched_slices_keep_identity() {
        let layer = SyncLayer::new(EventHub::new());
        let before = layer.state();

        layer.hub().emit(
            preferences::SERVICE,
            "PREFERENCE_CHANGED",
            json!({ "key": "theme", "value": "dark" }),
        );
        let after = layer.state();

        assert_eq!(before.preferences.theme, "light");
        assert_eq!(after.preferences.theme, "dark");
        assert!(!Arc::ptr_eq(&before.preferences, &after.preferences));
        assert!(Arc::ptr_eq(&before.support, &after.support));
        assert!(Arc::ptr_eq(&before.auth, &after.auth));
    }

    #[test]
    fn resolved_ticket_fans_out_to_two_slices() {
        let layer = SyncLayer::new(EventHub::new());

        let outcome = layer.hub().emit(
            support::SERVICE,
            events::TICKET_RESOLVED,
            json!({
                "ticketId": "T1",
                "agentId": "A1",
                "userId": "u1",
                "title": "App crashes",
                "resolution": "Cleared cache",
                "resolvedAt": "2025-01-01T10:00:00Z",
            }),
        );
        let state = layer.state();

        assert_eq!(outcome.invoked, 1);
        assert_eq!(state.notifications.items.len(), 1);
        assert_eq!(state.notifications.items[0].id, "ticket-resolved-T1");
        assert_eq!(
            state.support.last_error.as_deref(),
            Some("Unknown ticket T1")
        );
    }

    #[tokio::test]
    async fn shutdown_unsubscribes_bridge() {
        let layer = SyncLayer::new(EventHub::new());
        assert!(layer.hub().handler_count(support::SERVICE, events::TICKET_CREATED) > 0);

        layer.shutdown().await.unwrap();

        assert_eq!(
            layer.hub().handler_count(support::SERVICE, events::TICKET_CREATED),
            0
        );
    }
}
