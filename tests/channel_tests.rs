#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end channel tests: dialing, dispatch, reconnection, and backoff
//! behavior driven through scripted connectors.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulseboard_client::channel::{spawn_channel, ChannelConfig, ChannelStatus};
use pulseboard_client::protocol::EventKind;
use pulseboard_client::{ClientMessage, Handlers, RealtimeError, RetryPolicy, ServerEvent};
use tokio::sync::watch;

use common::{
    dial_failure, notification_json, pong_json, unread_count_json, MockConnector, ScriptedFrame,
};

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        base_delay: Duration::from_millis(40),
        max_delay: Duration::from_millis(400),
        retry: RetryPolicy::Unbounded,
        keepalive: None,
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<ChannelStatus>,
    mut pred: impl FnMut(ChannelStatus) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if pred(*rx.borrow()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("status condition not reached in time");
}

fn abnormal_drop() -> Vec<ScriptedFrame> {
    vec![Some(Err(RealtimeError::TransportReceive(
        "connection reset".into(),
    )))]
}

// ── Scenario: clean close ───────────────────────────────────────────

#[tokio::test]
async fn server_close_frame_ends_the_channel_without_reconnect() {
    // One successful dial; the transport closes cleanly straight away.
    let connector = MockConnector::new(vec![Ok(vec![None])]);
    let probe = connector.clone();

    let handle = spawn_channel("notifications", connector, Handlers::new(), fast_config());
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Closed).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(probe.dial_count(), 1, "clean close must not redial");
}

// ── Scenario: exponential backoff and reset ─────────────────────────

#[tokio::test]
async fn reconnect_delays_double_until_a_successful_open() {
    // Three failed dials, then stay open.
    let connector = MockConnector::new(vec![
        dial_failure(),
        dial_failure(),
        dial_failure(),
        Ok(vec![]),
    ]);
    let probe = connector.clone();

    let handle = spawn_channel("team_7", connector, Handlers::new(), fast_config());
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Open).await;

    let gaps = probe.dial_gaps();
    assert_eq!(gaps.len(), 3);
    // base, 2*base, 4*base — allow generous scheduling slack but insist on
    // strict growth and a sane first delay.
    assert!(gaps[0] >= Duration::from_millis(35), "{gaps:?}");
    assert!(gaps[1] > gaps[0], "{gaps:?}");
    assert!(gaps[2] > gaps[1], "{gaps:?}");

    handle.shutdown();
}

#[tokio::test]
async fn successful_open_resets_the_backoff() {
    // Two failures, an open that drops abnormally, then one more failure
    // before the final open.
    let connector = MockConnector::new(vec![
        dial_failure(),
        dial_failure(),
        Ok(abnormal_drop()),
        dial_failure(),
        Ok(vec![]),
    ]);
    let probe = connector.clone();

    let handle = spawn_channel("team_7", connector, Handlers::new(), fast_config());

    // Wait for the final open: the fifth dial succeeds and stays up. Watch
    // values coalesce, so poll the dial count instead of status transitions.
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if probe.dial_count() == 5 && handle.status() == ChannelStatus::Open {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let gaps = probe.dial_gaps();
    // Gaps: [base, 2*base, (immediate redial scheduling), base]. The delay
    // after the successful open must be back near base, well under the
    // pre-open 2*base gap.
    let after_reset = *gaps.last().unwrap();
    assert!(after_reset < gaps[1], "{gaps:?}");

    handle.shutdown();
}

// ── Scenario: limited retries ───────────────────────────────────────

#[tokio::test]
async fn limited_retry_budget_ends_in_failed() {
    // `vec![x; n]` needs `Clone`, which dial outcomes don't have.
    let connector = MockConnector::new((0..5).map(|_| dial_failure()).collect());
    let probe = connector.clone();
    let config = ChannelConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        retry: RetryPolicy::Limited(3),
        keepalive: None,
    };

    let handle = spawn_channel("chat", connector, Handlers::new(), config);
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Failed).await;

    // Initial dial plus exactly three retries.
    assert_eq!(probe.dial_count(), 4);
}

#[tokio::test]
async fn every_dial_replays_the_scripted_frames() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let handlers = Handlers::new().on_event(move |event: &ServerEvent, _| {
        seen_in.lock().unwrap().push(event.kind());
    });

    // Each open delivers one frame and then drops abnormally, forcing a
    // redial that must replay the same script, errored frame included.
    let connector = MockConnector::always(vec![
        Some(Ok(pong_json())),
        Some(Err(RealtimeError::TransportReceive("reset".into()))),
    ]);
    let probe = connector.clone();
    let config = ChannelConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        retry: RetryPolicy::Unbounded,
        keepalive: None,
    };

    let handle = spawn_channel("notifications", connector, handlers, config);
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if probe.dial_count() >= 3 && seen.lock().unwrap().len() >= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.shutdown();
}

// ── Dispatch through a live channel ─────────────────────────────────

#[tokio::test]
async fn generic_and_typed_handlers_fire_in_order_for_each_frame() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let generic_calls = Arc::clone(&calls);
    let typed_calls = Arc::clone(&calls);

    let handlers = Handlers::new()
        .on_event(move |event, _| {
            generic_calls
                .lock()
                .unwrap()
                .push(("generic", event.kind()));
        })
        .on(EventKind::UnreadCount, move |event, _| {
            typed_calls.lock().unwrap().push(("typed", event.kind()));
        });

    let connector = MockConnector::new(vec![Ok(vec![
        Some(Ok(unread_count_json(3))),
        Some(Ok(pong_json())),
    ])]);

    let handle = spawn_channel("notifications", connector, handlers, fast_config());
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Open).await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("generic", EventKind::UnreadCount),
            ("typed", EventKind::UnreadCount),
            // No typed handler for pong; only the generic one fires.
            ("generic", EventKind::Pong),
        ]
    );

    handle.shutdown();
}

#[tokio::test]
async fn malformed_frames_are_dropped_and_the_channel_lives_on() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let handlers = Handlers::new().on_event(move |event: &ServerEvent, _| {
        seen_in.lock().unwrap().push(event.kind());
    });

    let connector = MockConnector::new(vec![Ok(vec![
        Some(Ok("not json".into())),
        Some(Ok(r#"{"count":5}"#.into())),
        Some(Ok(r#"{"type":"mystery"}"#.into())),
        Some(Ok(notification_json("timesheet", "submitted"))),
    ])]);

    let handle = spawn_channel("notifications", connector, handlers, fast_config());
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Open).await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Only the well-formed frame reached a handler, and the channel is
    // still open.
    assert_eq!(seen.lock().unwrap().clone(), vec![EventKind::Notification]);
    assert_eq!(handle.status(), ChannelStatus::Open);

    handle.shutdown();
}

// ── Outbound traffic ────────────────────────────────────────────────

#[tokio::test]
async fn open_handler_runs_on_every_open_including_reconnects() {
    let handlers = Handlers::new().on_open(|sender| {
        sender.send(ClientMessage::FetchUnreadCount);
    });

    // First open drops abnormally; second stays up.
    let connector = MockConnector::new(vec![Ok(abnormal_drop()), Ok(vec![])]);
    let probe = connector.clone();
    let config = ChannelConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        retry: RetryPolicy::Unbounded,
        keepalive: None,
    };

    let handle = spawn_channel("notifications", connector, handlers, config);
    let mut status = handle.watch_status();
    tokio::time::timeout(Duration::from_secs(3), async {
        // Reach the second open.
        loop {
            if probe.dial_count() >= 2 && *status.borrow() == ChannelStatus::Open {
                return;
            }
            status.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fetches = probe
        .sent_frames()
        .iter()
        .filter(|f| f.as_str() == r#"{"type":"fetch_unread_count"}"#)
        .count();
    assert_eq!(fetches, 2, "one fetch per open");

    handle.shutdown();
}

#[tokio::test]
async fn keepalive_pings_flow_while_open() {
    let connector = MockConnector::new(vec![Ok(vec![])]);
    let probe = connector.clone();
    let config = ChannelConfig {
        keepalive: Some(Duration::from_millis(25)),
        ..fast_config()
    };

    let handle = spawn_channel("chat", connector, Handlers::new(), config);
    let mut status = handle.watch_status();
    wait_for(&mut status, |s| s == ChannelStatus::Open).await;
    tokio::time::sleep(Duration::from_millis(110)).await;

    let pings = probe
        .sent_frames()
        .iter()
        .filter(|f| f.as_str() == r#"{"type":"ping"}"#)
        .count();
    assert!(pings >= 3, "expected at least 3 pings, got {pings}");

    handle.shutdown();
}

#[tokio::test]
async fn send_returns_false_until_the_channel_opens() {
    // The only scripted outcome is a far-future dial: script one failure
    // then exhaustion (which hangs), keeping the channel non-open.
    let connector = MockConnector::new(vec![dial_failure()]);
    let handle = spawn_channel("notifications", connector, Handlers::new(), fast_config());

    assert!(!handle.send(ClientMessage::Ping));

    handle.shutdown();
}
