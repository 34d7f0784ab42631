//! Diagnostic metadata attached to new tickets.
//!
//! The desk never validates or interprets these fields; they are passed to the
//! backend verbatim.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment of the user opening a ticket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Client user agent
    pub user_agent: String,
    /// Operating system / architecture
    pub platform: String,
    /// Screen size, e.g. `1920x1080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    /// Viewport size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    /// Locale, e.g. `pt-BR`
    pub language: String,
    /// IANA time zone
    pub timezone: String,
}

/// Supplies [`DeviceInfo`] for ticket creation
pub trait DeviceInfoCollector: Send + Sync {
    /// Snapshot the current environment
    fn collect(&self) -> DeviceInfo;
}

/// Reads the host process environment.
///
/// Screen and viewport are unknown outside a browser and left empty.
#[derive(Clone, Debug)]
pub struct HostDeviceInfo {
    user_agent: String,
}

impl HostDeviceInfo {
    /// Collector reporting `user_agent`
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl DeviceInfoCollector for HostDeviceInfo {
    fn collect(&self) -> DeviceInfo {
        DeviceInfo {
            user_agent: self.user_agent.clone(),
            platform: format!("{}-{}", env::consts::OS, env::consts::ARCH),
            screen: None,
            viewport: None,
            language: env::var("LANG")
                .ok()
                .and_then(|lang| locale_tag(&lang))
                .unwrap_or_else(|| "en-US".to_string()),
            timezone: env::var("TZ")
                .ok()
                .filter(|tz| !tz.is_empty())
                .unwrap_or_else(|| "UTC".to_string()),
        }
    }
}

/// Fixed metadata, for tests and headless clients
impl DeviceInfoCollector for DeviceInfo {
    fn collect(&self) -> DeviceInfo {
        self.clone()
    }
}

/// `pt_BR.UTF-8` → `pt-BR`
fn locale_tag(lang: &str) -> Option<String> {
    let tag = lang.split('.').next()?.replace('_', "-");
    (!tag.is_empty() && tag != "C" && tag != "POSIX").then_some(tag)
}
