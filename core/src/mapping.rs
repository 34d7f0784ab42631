//! Declarative event → action mapping rules.
//!
//! A [`Mapping`] states that an event `(service, event type)` should become an
//! action of the application store. The translation is done by a pure
//! transformer that receives the event payload and a read-only view of the
//! current state:
//!
//! ```text
//! transformer(action_type, payload, &state) -> Ok(Some(action))   dispatch
//!                                           -> Ok(None)           suppress
//!                                           -> Err(MappingError)  log, skip
//! ```
//!
//! Several mappings may share one `(service, event type)`; each event then
//! fans out to one action per mapping, in registration order.
//!
//! # Action types
//!
//! The action type label is either fixed ([`ActionType::Static`]) or resolved
//! from the payload ([`ActionType::Dynamic`]), e.g. routing a "fetched" event to
//! a *received* or *sent* action depending on a payload flag. The resolved
//! label is handed to the transformer so it can pick the matching action
//! variant.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by a transformer.
///
/// The bridge logs these and skips the mapping; they never reach the emitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The payload does not have the expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The resolved action type is not handled by the transformer
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// The payload is well-formed but cannot be applied to the current state
    #[error("Mapping rejected event: {0}")]
    Rejected(String),
}

/// How the action type label of a mapping is determined.
#[derive(Clone, Copy)]
pub enum ActionType {
    /// Fixed label
    Static(&'static str),
    /// Label computed from the event payload
    Dynamic(fn(&Value) -> &'static str),
}

impl ActionType {
    /// Resolve the label for a payload
    #[must_use]
    pub fn resolve(&self, payload: &Value) -> &'static str {
        match self {
            Self::Static(label) => label,
            Self::Dynamic(route) => route(payload),
        }
    }
}

impl std::fmt::Debug for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(label) => f.debug_tuple("ActionType::Static").field(label).finish(),
            Self::Dynamic(_) => write!(f, "ActionType::Dynamic(<fn>)"),
        }
    }
}

impl From<&'static str> for ActionType {
    fn from(label: &'static str) -> Self {
        Self::Static(label)
    }
}

/// Transformer signature: `(resolved action type, payload, state) → action`.
pub type Transformer<S, A> =
    Arc<dyn Fn(&str, &Value, &S) -> Result<Option<A>, MappingError> + Send + Sync>;

/// One event → action rule.
pub struct Mapping<S, A> {
    service: String,
    event_type: String,
    action_type: ActionType,
    transformer: Transformer<S, A>,
}

impl<S, A> Mapping<S, A> {
    /// Create a mapping.
    ///
    /// # Example
    ///
    /// ```
    /// use support_sync_core::mapping::{decode, Mapping};
    ///
    /// #[derive(Debug, PartialEq)]
    /// enum Action {
    ///     Renamed(String),
    /// }
    ///
    /// let mapping: Mapping<(), Action> = Mapping::new(
    ///     "profile",
    ///     "NAME_CHANGED",
    ///     "profile/renamed",
    ///     |_, payload, _| Ok(Some(Action::Renamed(decode(payload)?))),
    /// );
    ///
    /// let action = mapping.apply(&serde_json::json!("Ana"), &()).ok().flatten();
    /// assert_eq!(action, Some(Action::Renamed("Ana".to_string())));
    /// ```
    pub fn new<F>(
        service: impl Into<String>,
        event_type: impl Into<String>,
        action_type: impl Into<ActionType>,
        transformer: F,
    ) -> Self
    where
        F: Fn(&str, &Value, &S) -> Result<Option<A>, MappingError> + Send + Sync + 'static,
    {
        Self {
            service: service.into(),
            event_type: event_type.into(),
            action_type: action_type.into(),
            transformer: Arc::new(transformer),
        }
    }

    /// Emitting service
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Event type within the service
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Action type descriptor
    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Resolve the action type and run the transformer.
    ///
    /// # Errors
    ///
    /// Returns the transformer's [`MappingError`] unchanged.
    pub fn apply(&self, payload: &Value, state: &S) -> Result<Option<A>, MappingError> {
        let label = self.action_type.resolve(payload);
        (self.transformer)(label, payload, state)
    }
}

impl<S, A> std::fmt::Debug for Mapping<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("service", &self.service)
            .field("event_type", &self.event_type)
            .field("action_type", &self.action_type)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of mappings.
pub struct MappingRegistry<S, A> {
    mappings: Vec<Arc<Mapping<S, A>>>,
}

impl<S, A> MappingRegistry<S, A> {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    /// Append mappings, preserving their order
    pub fn register(&mut self, mappings: impl IntoIterator<Item = Mapping<S, A>>) {
        self.mappings.extend(mappings.into_iter().map(Arc::new));
    }

    /// Distinct `(service, event type)` pairs in first-registration order
    #[must_use]
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = Vec::new();
        for mapping in &self.mappings {
            let exists = keys
                .iter()
                .any(|(service, event_type)| *service == mapping.service && *event_type == mapping.event_type);
            if !exists {
                keys.push((mapping.service.clone(), mapping.event_type.clone()));
            }
        }
        keys
    }

    /// Mappings registered for a pair, in registration order
    #[must_use]
    pub fn mappings_for(&self, service: &str, event_type: &str) -> Vec<Arc<Mapping<S, A>>> {
        self.mappings
            .iter()
            .filter(|mapping| mapping.service == service && mapping.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Total number of mappings
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether no mapping is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl<S, A> Default for MappingRegistry<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize a payload into a typed value.
///
/// # Errors
///
/// Returns [`MappingError::InvalidPayload`] if the payload does not match `T`.
pub fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, MappingError> {
    T::deserialize(payload).map_err(|e| MappingError::InvalidPayload(e.to_string()))
}

/// Deserialize one field of an object payload.
///
/// # Errors
///
/// Returns [`MappingError::InvalidPayload`] if the field is missing or malformed.
pub fn decode_field<T: DeserializeOwned>(payload: &Value, field: &str) -> Result<T, MappingError> {
    let value = payload
        .get(field)
        .ok_or_else(|| MappingError::InvalidPayload(format!("missing field `{field}`")))?;
    decode(value)
}
