//! Who is acting, and whether they may work the support queue.

use crate::app::DeskStore;
use crate::slices::auth::AuthUser;
use std::sync::{Arc, PoisonError, RwLock};

/// Roles allowed to handle tickets
pub const SUPPORT_ROLES: [&str; 3] = ["support", "admin", "agent"];

/// Explicit capability granting the same access
pub const SUPPORT_READ: &str = "support:read";

/// The current actor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Actor {
    /// User id
    pub user_id: String,
    /// Role names
    pub roles: Vec<String>,
    /// Capability strings
    pub permissions: Vec<String>,
}

impl Actor {
    /// Actor with no roles or permissions
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Add a role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a capability
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Whether the actor may assign, resolve and close tickets and read analytics
    #[must_use]
    pub fn can_handle_support(&self) -> bool {
        self.roles
            .iter()
            .any(|role| SUPPORT_ROLES.contains(&role.as_str()))
            || self.permissions.iter().any(|p| p == SUPPORT_READ)
    }
}

impl From<&AuthUser> for Actor {
    fn from(user: &AuthUser) -> Self {
        Self {
            user_id: user.uid.clone(),
            roles: user.roles.clone(),
            permissions: user.permissions.clone(),
        }
    }
}

/// Supplies the current actor
pub trait PermissionSource: Send + Sync {
    /// `None` when nobody is signed in
    fn current_actor(&self) -> Option<Actor>;
}

/// Fixed actor, replaceable at runtime
#[derive(Clone, Debug, Default)]
pub struct StaticPermissions {
    actor: Arc<RwLock<Option<Actor>>>,
}

impl StaticPermissions {
    /// Source reporting `actor`
    #[must_use]
    pub fn new(actor: Option<Actor>) -> Self {
        Self {
            actor: Arc::new(RwLock::new(actor)),
        }
    }

    /// Replace the actor
    pub fn set(&self, actor: Option<Actor>) {
        *self.actor.write().unwrap_or_else(PoisonError::into_inner) = actor;
    }
}

impl PermissionSource for StaticPermissions {
    fn current_actor(&self) -> Option<Actor> {
        self.actor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Reads the signed-in user from the auth slice of the store
#[derive(Clone)]
pub struct StorePermissions {
    store: DeskStore,
}

impl StorePermissions {
    /// Source backed by `store`
    #[must_use]
    pub const fn new(store: DeskStore) -> Self {
        Self { store }
    }
}

impl PermissionSource for StorePermissions {
    fn current_actor(&self) -> Option<Actor> {
        self.store
            .state(|state| state.auth.user.as_ref().map(Actor::from))
    }
}
