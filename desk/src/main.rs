//! One-shot support desk sync.
//!
//! Loads the pending queue, the agent's tickets and queue analytics into the
//! state tree, logs a summary and exits. The agent is taken from
//! `SUPPORT_AGENT_ID`; without it only the pending queue is loaded.

use std::sync::Arc;
use support_desk::api::HttpBackend;
use support_desk::device::HostDeviceInfo;
use support_desk::permissions::{Actor, StaticPermissions};
use support_desk::telemetry::init_tracing;
use support_desk::{DeskConfig, SyncLayer, TicketService};
use support_sync_core::event_hub::EventHub;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DeskConfig::from_env();
    init_tracing(&config.log_filter);
    info!(api_url = %config.api_url, "Starting support desk sync");

    let hub = EventHub::new();
    let layer = SyncLayer::new(hub.clone());
    let backend = Arc::new(HttpBackend::new(&config)?);

    let agent = std::env::var("SUPPORT_AGENT_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
        .map(|id| Actor::new(id).with_role("support"));
    let is_agent = agent.is_some();
    let permissions = Arc::new(StaticPermissions::new(agent));

    let tickets = TicketService::new(
        hub,
        backend,
        permissions,
        Arc::new(HostDeviceInfo::new(config.user_agent.clone())),
        Arc::new(layer.store().clone()),
    )
    .with_retry_policy(config.fetch_retry_policy());

    if let Err(error) = tickets.fetch_pending().await {
        warn!(%error, "Could not load pending tickets");
    }
    if is_agent {
        if let Err(error) = tickets.fetch_my_tickets().await {
            warn!(%error, "Could not load assigned tickets");
        }
        if let Err(error) = tickets.fetch_analytics().await {
            warn!(%error, "Could not load analytics");
        }
    }

    let state = layer.state();
    info!(
        pending = state.support.pending.len(),
        known = state.support.tickets.len(),
        held = state.support.by_agent.values().map(Vec::len).sum::<usize>(),
        analytics = ?state.support.analytics,
        last_error = ?state.support.last_error,
        "Sync complete"
    );

    layer.shutdown().await?;
    Ok(())
}
