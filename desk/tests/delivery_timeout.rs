//! Realtime acknowledgement timeout and fallback, on a paused clock.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use support_desk::delivery::{LocalRealtimeChannel, RealtimeEvent, REALTIME_ACK_TIMEOUT};
use support_desk::mocks::MockMessageApi;
use support_desk::slices::messages::{self, events};
use support_desk::{conversation_id, ApiError, DeskError, MessageService, RealtimeSync, SyncLayer};
use support_sync_core::event_hub::EventHub;
use support_sync_testing::{EventRecorder, SequentialIds};
use tokio::time::Instant;

struct Fixture {
    layer: SyncLayer,
    channel: LocalRealtimeChannel,
    api: MockMessageApi,
    outcomes: EventRecorder,
    service: MessageService,
}

fn fixture() -> Fixture {
    let layer = SyncLayer::new(EventHub::new());
    let channel = LocalRealtimeChannel::new();
    let api = MockMessageApi::new();
    let outcomes = EventRecorder::attach(
        layer.hub(),
        &[
            (messages::SERVICE, events::MESSAGE_RECONCILED),
            (messages::SERVICE, events::MESSAGE_SEND_FAILED),
        ],
    );
    let service = MessageService::dual(
        layer.hub().clone(),
        Arc::new(channel.clone()),
        Arc::new(api.clone()),
    )
    .with_ids(Arc::new(SequentialIds::new("temp")));
    Fixture {
        layer,
        channel,
        api,
        outcomes,
        service,
    }
}

#[tokio::test(start_paused = true)]
async fn silent_channel_falls_back_after_timeout() {
    let f = fixture();
    let started = Instant::now();

    let message = f.service.send_message("u1", "u2", "anyone there?").await.unwrap();

    let calls = f.api.create_calls();
    assert_eq!(calls.len(), 1);
    let waited = calls[0] - started;
    assert!(waited >= REALTIME_ACK_TIMEOUT, "fell back after {waited:?}");
    assert!(waited < REALTIME_ACK_TIMEOUT + Duration::from_millis(50));

    assert_eq!(f.outcomes.event_types(), [events::MESSAGE_RECONCILED]);
    assert_eq!(f.channel.sent().len(), 1);
    let state = f.layer.state();
    let entries = state.messages.entries(&conversation_id("u1", "u2"));
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_permanent(&message.id));
}

#[tokio::test(start_paused = true)]
async fn silent_channel_and_failing_api_fail_once() {
    let f = fixture();
    f.api
        .fail_next("create_message", ApiError::Transport("offline".to_string()));

    let error = f.service.send_message("u1", "u2", "hello?").await.unwrap_err();

    assert!(matches!(error, DeskError::Delivery(_)));
    assert_eq!(f.api.create_calls().len(), 1);
    assert_eq!(f.outcomes.event_types(), [events::MESSAGE_SEND_FAILED]);
    let state = f.layer.state();
    let temporary = state
        .messages
        .temporary(&conversation_id("u1", "u2"), "temp-1")
        .unwrap();
    assert!(!temporary.sending);
}

#[tokio::test(start_paused = true)]
async fn late_acknowledgement_after_fallback_is_ignored() {
    let f = fixture();
    let _sync = RealtimeSync::spawn(&f.channel, f.layer.hub().clone());

    let message = f.service.send_message("u1", "u2", "late ack").await.unwrap();
    let conversation = conversation_id("u1", "u2");
    let late = support_desk::types::Message {
        id: "srv-late".to_string(),
        ..message.clone()
    };
    f.channel.push(RealtimeEvent::ReconcileMessage {
        temporary_id: "temp-1".to_string(),
        message: late,
    });
    for _ in 0..20 {
        if f.outcomes.events().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(
        f.outcomes.event_types(),
        [events::MESSAGE_RECONCILED, events::MESSAGE_RECONCILED]
    );
    let state = f.layer.state();
    let entries = state.messages.entries(&conversation);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_permanent(&message.id));
}

#[tokio::test(start_paused = true)]
async fn prompt_acknowledgement_skips_reliable_api() {
    let layer = SyncLayer::new(EventHub::new());
    let channel = LocalRealtimeChannel::with_responder(|outgoing| {
        Some(RealtimeEvent::ReconcileMessage {
            temporary_id: outgoing.temporary_id.clone(),
            message: support_desk::types::Message {
                id: "srv-1".to_string(),
                conversation_id: outgoing.conversation_id.clone(),
                sender: outgoing.sender.clone(),
                recipient: outgoing.recipient.clone(),
                content: outgoing.content.clone(),
                kind: outgoing.kind.clone(),
                timestamp: chrono::Utc::now(),
                status: support_desk::types::MessageStatus::default(),
            },
        })
    });
    let api = MockMessageApi::new();
    let service = MessageService::dual(
        layer.hub().clone(),
        Arc::new(channel.clone()),
        Arc::new(api.clone()),
    );
    let started = Instant::now();

    let message = service.send_message("u2", "u1", "fast").await.unwrap();

    assert_eq!(message.id, "srv-1");
    assert!(api.create_calls().is_empty());
    assert!(Instant::now() - started < REALTIME_ACK_TIMEOUT);
    assert_eq!(channel.rooms(), [conversation_id("u1", "u2")]);
}
