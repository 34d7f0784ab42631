//! User preferences: interests, language, theme.

use crate::app::{AppAction, AppState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use support_sync_core::mapping::{decode, decode_field, Mapping, MappingError};
use support_sync_core::{Effect, Reducer, SmallVec};

/// Hub service name
pub const SERVICE: &str = "userPreferences";

/// Preferences slice
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesState {
    /// Selected interest ids
    pub interests: Vec<String>,
    /// UI language
    pub language: String,
    /// `light` or `dark`
    pub theme: String,
    /// Whether push notifications are enabled
    pub notifications_enabled: bool,
}

impl Default for PreferencesState {
    fn default() -> Self {
        Self {
            interests: Vec::new(),
            language: "pt-BR".to_string(),
            theme: "light".to_string(),
            notifications_enabled: true,
        }
    }
}

/// A single preference change
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preference {
    Language(String),
    Theme(String),
    NotificationsEnabled(bool),
}

/// Preferences actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreferencesAction {
    /// Stored preferences were loaded
    Loaded(PreferencesState),
    /// The interest selection changed
    InterestsUpdated(Vec<String>),
    /// One preference changed
    Changed(Preference),
}

/// Reducer for [`PreferencesState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferencesReducer;

impl Reducer for PreferencesReducer {
    type State = PreferencesState;
    type Action = PreferencesAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut PreferencesState,
        action: PreferencesAction,
        _env: &(),
    ) -> SmallVec<[Effect<PreferencesAction>; 4]> {
        match action {
            PreferencesAction::Loaded(loaded) => *state = loaded,
            PreferencesAction::InterestsUpdated(mut interests) => {
                interests.dedup();
                state.interests = interests;
            },
            PreferencesAction::Changed(Preference::Language(language)) => {
                state.language = language;
            },
            PreferencesAction::Changed(Preference::Theme(theme)) => state.theme = theme,
            PreferencesAction::Changed(Preference::NotificationsEnabled(enabled)) => {
                state.notifications_enabled = enabled;
            },
        }
        SmallVec::new()
    }
}

/// `{ "key": "theme", "value": "dark" }`
fn preference(payload: &Value) -> Result<Preference, MappingError> {
    let key: String = decode_field(payload, "key")?;
    match key.as_str() {
        "language" => Ok(Preference::Language(decode_field(payload, "value")?)),
        "theme" => Ok(Preference::Theme(decode_field(payload, "value")?)),
        "notificationsEnabled" => Ok(Preference::NotificationsEnabled(decode_field(
            payload, "value",
        )?)),
        other => Err(MappingError::InvalidPayload(format!(
            "unknown preference `{other}`"
        ))),
    }
}

/// `userPreferences` event mappings
#[must_use]
pub fn mappings() -> Vec<Mapping<AppState, AppAction>> {
    vec![
        Mapping::new(
            SERVICE,
            "PREFERENCES_LOADED",
            "userPreferences/loaded",
            |_, payload, _| {
                Ok(Some(AppAction::Preferences(PreferencesAction::Loaded(
                    decode(payload)?,
                ))))
            },
        ),
        Mapping::new(
            SERVICE,
            "INTERESTS_UPDATED",
            "userPreferences/interestsUpdated",
            |_, payload, _| {
                Ok(Some(AppAction::Preferences(
                    PreferencesAction::InterestsUpdated(decode_field(payload, "interests")?),
                )))
            },
        ),
        Mapping::new(
            SERVICE,
            "PREFERENCE_CHANGED",
            "userPreferences/changed",
            |_, payload, _| {
                Ok(Some(AppAction::Preferences(PreferencesAction::Changed(
                    preference(payload)?,
                ))))
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

    #[test]
    fn loaded_payload_fills_missing_fields_with_defaults() {
        let loaded: PreferencesState = decode(&json!({ "theme": "dark" })).unwrap();
        assert_eq!(loaded.theme, "dark");
        assert_eq!(loaded.language, "pt-BR");
        assert!(loaded.notifications_enabled);
    }

    #[test]
    fn preference_change_is_typed() {
        assert_eq!(
            preference(&json!({ "key": "notificationsEnabled", "value": false })).unwrap(),
            Preference::NotificationsEnabled(false)
        );
        assert!(preference(&json!({ "key": "fontSize", "value": 3 })).is_err());
        assert!(preference(&json!({ "key": "theme", "value": 3 })).is_err());
    }

    #[test]
    fn theme_change_leaves_interests() {
        ReducerTest::new(PreferencesReducer)
            .with_env(())
            .given_state(PreferencesState {
                interests: vec!["music".to_string()],
                ..PreferencesState::default()
            })
            .when_action(PreferencesAction::Changed(Preference::Theme(
                "dark".to_string(),
            )))
            .then_state(|state| {
                assert_eq!(state.theme, "dark");
                assert_eq!(state.interests, vec!["music".to_string()]);
            })
            .run();
    }
}
