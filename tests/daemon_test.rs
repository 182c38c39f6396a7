// tests/daemon_test.rs - Receive loop: ordering, offsets, poll failures

mod common;

use pretty_assertions::assert_eq;
use std::time::Duration;

use common::*;
use deskrelay::infra::daemon::{serve, OffsetStore, ServeOptions};
use deskrelay::infra::errors::BridgeError;
use deskrelay::integrations::{InboundEvent, PollBatch};

fn fast_options() -> ServeOptions {
    ServeOptions {
        poll_timeout: Duration::from_millis(10),
        backoff_initial: Duration::from_millis(1),
        backoff_max: Duration::from_millis(4),
    }
}

fn event(update_id: i64, sender: &str, text: &str) -> InboundEvent {
    InboundEvent {
        update_id,
        ..InboundEvent::text(sender, text)
    }
}

fn transient() -> BridgeError {
    BridgeError::Transport {
        message: "connection reset".into(),
        retriable: true,
    }
}

#[tokio::test]
async fn test_serve_advances_and_persists_offset() {
    let mut h = harness(vec![Ok("Hi".into())]);
    h.transport.polls.lock().unwrap().extend([
        Ok(PollBatch {
            events: vec![event(5, OWNER, "Hello"), event(6, "999", "/status")],
            next_offset: Some(7),
        }),
        Err(transient()),
        Ok(PollBatch {
            events: vec![],
            next_offset: Some(10),
        }),
    ]);

    let offsets = OffsetStore::new(h.dir.path().join("telegram.offset"));
    let drained = h.transport.drained.clone();
    let transport = h.transport.clone();

    tokio::time::timeout(
        Duration::from_secs(5),
        serve(
            &mut h.dispatcher,
            transport.as_ref(),
            &offsets,
            fast_options(),
            async move { drained.notified().await },
        ),
    )
    .await
    .expect("receive loop did not stop")
    .unwrap();

    let polled = transport.poll_offsets.lock().unwrap().clone();
    assert_eq!(&polled[..4], &[0, 7, 7, 10]);
    assert_eq!(offsets.load(), 10);

    // Only the authorized event produced a reply.
    assert_eq!(transport.texts(), vec!["Hi".to_string()]);
    assert_eq!(h.store().current_transcript().len(), 2);
}

#[tokio::test]
async fn test_serve_resumes_from_saved_offset() {
    let mut h = harness(vec![]);
    let offsets = OffsetStore::new(h.dir.path().join("telegram.offset"));
    offsets.save(42).unwrap();

    let drained = h.transport.drained.clone();
    let transport = h.transport.clone();
    serve(
        &mut h.dispatcher,
        transport.as_ref(),
        &offsets,
        fast_options(),
        async move { drained.notified().await },
    )
    .await
    .unwrap();

    assert_eq!(transport.poll_offsets.lock().unwrap()[0], 42);
    assert_eq!(offsets.load(), 42);
}

#[tokio::test]
async fn test_terminal_poll_error_stops_serving() {
    let mut h = harness(vec![]);
    h.transport.polls.lock().unwrap().push_back(Err(BridgeError::Transport {
        message: "Unauthorized".into(),
        retriable: false,
    }));

    let offsets = OffsetStore::new(h.dir.path().join("telegram.offset"));
    let transport = h.transport.clone();
    let result = serve(
        &mut h.dispatcher,
        transport.as_ref(),
        &offsets,
        fast_options(),
        std::future::pending::<()>(),
    )
    .await;

    assert!(matches!(result, Err(BridgeError::Transport { retriable: false, .. })));
    assert_eq!(transport.poll_offsets.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_events_are_handled_in_arrival_order() {
    let mut h = harness(vec![Ok("a1".into()), Ok("a2".into()), Ok("a3".into())]);
    h.transport.polls.lock().unwrap().push_back(Ok(PollBatch {
        events: vec![
            event(1, OWNER, "q1"),
            event(2, OWNER, "q2"),
            event(3, OWNER, "q3"),
        ],
        next_offset: Some(4),
    }));

    let offsets = OffsetStore::new(h.dir.path().join("telegram.offset"));
    let drained = h.transport.drained.clone();
    let transport = h.transport.clone();
    serve(
        &mut h.dispatcher,
        transport.as_ref(),
        &offsets,
        fast_options(),
        async move { drained.notified().await },
    )
    .await
    .unwrap();

    let texts: Vec<String> = h
        .store()
        .current_transcript()
        .turns()
        .iter()
        .map(|t| t.text.clone())
        .collect();
    assert_eq!(texts, vec!["q1", "a1", "q2", "a2", "q3", "a3"]);
}
