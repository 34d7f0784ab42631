//! End-to-end desk scenarios over the in-memory backends.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use support_desk::api::{NewTicket, SupportApi};
use support_desk::device::DeviceInfo;
use support_desk::error::ApiError;
use support_desk::mocks::MockSupportApi;
use support_desk::permissions::{Actor, StaticPermissions};
use support_desk::slices::support::{self, events, SupportAction};
use support_desk::types::{Category, Priority, TicketStatus};
use support_desk::{
    conversation_id, AppAction, AppState, ConversationId, DeskError, SyncLayer, TicketDraft, TicketService,
    Violation,
};
use support_sync_core::environment::Clock;
use support_sync_core::event_hub::EventHub;
use support_sync_core::mapping::{decode_field, Mapping};
use support_sync_runtime::retry::RetryPolicy;
use support_sync_testing::properties::distinct_user_pair;
use support_sync_testing::test_clock;

fn desk(actor: Actor) -> (SyncLayer, MockSupportApi, StaticPermissions, TicketService) {
    let layer = SyncLayer::new(EventHub::new());
    let api = MockSupportApi::with_clock(Arc::new(test_clock()));
    let permissions = StaticPermissions::new(Some(actor));
    let service = TicketService::new(
        layer.hub().clone(),
        Arc::new(api.clone()),
        Arc::new(permissions.clone()),
        Arc::new(DeviceInfo::default()),
        Arc::new(layer.store().clone()),
    )
    .with_retry_policy(RetryPolicy::none());
    (layer, api, permissions, service)
}

fn draft(title: &str) -> TicketDraft {
    TicketDraft {
        category: Some(Category::Account),
        priority: Priority::Medium,
        title: title.to_string(),
        description: "I cannot reset my password".to_string(),
    }
}

#[test]
fn conversation_id_is_sorted_pair() {
    assert_eq!(conversation_id("u1", "u2"), conversation_id("u2", "u1"));
    assert_eq!(conversation_id("u1", "u2").as_str(), "u1_u2");
}

proptest! {
    #[test]
    fn conversation_id_is_symmetric((a, b) in distinct_user_pair()) {
        prop_assert_eq!(conversation_id(&a, &b), conversation_id(&b, &a));
        prop_assert_eq!(
            ConversationId::between(&a, &b).as_str().matches('_').count(),
            1
        );
    }
}

#[tokio::test]
async fn assigning_moves_ticket_from_queue_to_agent() {
    let (layer, _api, permissions, service) = desk(Actor::new("u1"));
    let ticket = service.create_ticket(draft("Locked out")).await.unwrap();
    assert_eq!(layer.state().support.pending, vec![ticket.id.clone()]);

    permissions.set(Some(Actor::new("A1").with_role("support")));
    service.assign_ticket(&ticket.id).await.unwrap();

    let support = layer.state().support;
    let local = support.ticket(&ticket.id).unwrap();
    assert_eq!(local.status, TicketStatus::Assigned);
    assert!(local.assigned_at.is_some());
    assert!(!support.pending.contains(&ticket.id));
    assert_eq!(
        support.tickets_for("A1").iter().map(|t| &t.id).collect::<Vec<_>>(),
        [&ticket.id]
    );
}

#[tokio::test]
async fn refused_claim_shows_ticket_held_by_other_agent() {
    let (layer, api, permissions, service) = desk(Actor::new("u1"));
    let ticket = service.create_ticket(draft("Locked out")).await.unwrap();
    let mut elsewhere = api.ticket(&ticket.id).unwrap();
    elsewhere.assign("A2", test_clock().now()).unwrap();
    api.seed(elsewhere);
    api.fail_next(
        "assign_ticket",
        ApiError::Rejected("Ticket already assigned".to_string()),
    );

    permissions.set(Some(Actor::new("A1").with_role("support")));
    let error = service.assign_ticket(&ticket.id).await.unwrap_err();

    assert!(matches!(error, DeskError::AlreadyClaimed { .. }));
    let support = layer.state().support;
    let local = support.ticket(&ticket.id).unwrap();
    assert_eq!(local.status, TicketStatus::Assigned);
    assert_eq!(local.assigned_to.as_deref(), Some("A2"));
    assert!(support.pending.is_empty());
    assert!(support.tickets_for("A1").is_empty());
    assert_eq!(support.tickets_for("A2").len(), 1);
    assert!(support.last_error.is_none());
}

#[tokio::test]
async fn claiming_a_ticket_never_listed_locally_adds_it() {
    let (layer, api, _permissions, service) = desk(Actor::new("A1").with_role("support"));
    let unseen = api
        .create_ticket(&NewTicket {
            user_id: "u9".to_string(),
            category: Category::Financial,
            priority: Priority::High,
            title: "Charged twice".to_string(),
            description: "Two charges for one order".to_string(),
            device_info: DeviceInfo::default(),
        })
        .await
        .unwrap();
    assert!(layer.state().support.ticket(&unseen.id).is_none());

    service.assign_ticket(&unseen.id).await.unwrap();

    let support = layer.state().support;
    let local = support.ticket(&unseen.id).unwrap();
    assert_eq!(local.status, TicketStatus::Assigned);
    assert_eq!(local.assigned_to.as_deref(), Some("A1"));
    assert_eq!(support.tickets_for("A1").len(), 1);
    assert!(support.last_error.is_none());
}

#[tokio::test]
async fn short_title_is_rejected_before_network() {
    let (layer, api, _permissions, service) = desk(Actor::new("u1"));

    let error = service.create_ticket(draft("Hi")).await.unwrap_err();

    let DeskError::Validation(validation) = &error else {
        unreachable!("expected a validation error, got {error:?}");
    };
    assert_eq!(validation.violations(), [Violation::TitleTooShort { actual: 2 }]);
    assert!(error.to_string().contains("at least 5 characters"));
    assert_eq!(api.calls("create_ticket"), 0);
    assert!(layer.state().support.tickets.is_empty());
}

#[test]
fn resolved_ticket_reaches_support_and_notifications() {
    let layer = SyncLayer::new(EventHub::new());
    let before = layer.state();

    layer.hub().emit(
        support::SERVICE,
        events::TICKET_RESOLVED,
        json!({
            "ticketId": "T1",
            "agentId": "A1",
            "userId": "u1",
            "title": "Locked out",
            "resolution": "Password reset",
            "resolvedAt": "2025-01-01T10:00:00Z",
        }),
    );
    let after = layer.state();

    assert_eq!(after.notifications.items[0].id, "ticket-resolved-T1");
    assert_eq!(after.support.last_error.as_deref(), Some("Unknown ticket T1"));
    assert!(Arc::ptr_eq(&before.messages, &after.messages));
}

#[test]
fn extra_mappings_run_in_registration_order() {
    let layer = SyncLayer::new(EventHub::new());
    layer.bridge().register_mappings([
        Mapping::<AppState, AppAction>::new(
            support::SERVICE,
            events::ANALYTICS_FETCHED,
            "test/first",
            |_, payload, _| {
                let total: u64 = decode_field(payload, "total")?;
                Ok(Some(AppAction::Support(SupportAction::FetchFailed(format!(
                    "first:{total}"
                )))))
            },
        ),
        Mapping::<AppState, AppAction>::new(
            support::SERVICE,
            events::ANALYTICS_FETCHED,
            "test/second",
            |_, payload, state| {
                let pending: u64 = decode_field(payload, "pending")?;
                let previous = state.support.last_error.clone().unwrap_or_default();
                Ok(Some(AppAction::Support(SupportAction::FetchFailed(format!(
                    "second:{pending} after {previous}"
                )))))
            },
        ),
    ]);

    let outcome = layer.hub().emit(
        support::SERVICE,
        events::ANALYTICS_FETCHED,
        json!({ "total": 7, "pending": 2, "assigned": 3, "resolved": 2 }),
    );
    let support = layer.state().support;

    assert_eq!(outcome.failed, 0);
    assert_eq!(support.analytics.as_ref().map(|a| a.total), Some(7));
    assert_eq!(support.last_error.as_deref(), Some("second:2 after first:7"));
}
