//! Contract Test: Edge-Triggered Emission
//!
//! This test verifies that outage events are produced only on state
//! transitions and that probe cadence follows the fixed timing rules.
//!
//! Constraints verified:
//! - A healthy target produces no outage events
//! - N consecutive timeouts produce exactly one "outage detected"
//! - A timeout resends immediately with the same sequence
//! - The first reply after an outage produces exactly one "outage cleared"
//! - A reply advances the sequence and the next send waits the probe interval
//!
//! If this test fails, someone has added:
//! - Level-triggered reporting (one event per timeout)
//! - A sleep after a timeout
//! - Sequence advance on timeout

mod common;

use common::*;
use outage_core::MonitorEvent;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn healthy_target_emits_nothing_and_keeps_cadence() {
    let transport = LoopbackTransport::new(Duration::from_millis(500));
    transport.set_reachable(HOST_A, true);
    let sink = outage_core::MemorySink::new();

    let harness = spawn_engine(&transport, sink.clone(), minimal_config(&[HOST_A]));
    let started = harness.started;
    advance_ms(5000).await;
    harness.stop().await.unwrap();

    assert_eq!(sink.count_containing("outage").await, 0);

    // Reply after 500ms, then 900ms interval: one request every 1400ms.
    let sent = transport.sent_to(HOST_A);
    assert_eq!(sent.len(), 4);
    for (i, request) in sent.iter().enumerate() {
        assert_eq!(request.request.sequence, i as u16 + 1);
        assert_at(started, request.at, 1400 * i as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn consecutive_timeouts_emit_one_detection() {
    let transport = LoopbackTransport::new(Duration::ZERO);
    let sink = outage_core::MemorySink::new();

    let harness = spawn_engine(&transport, sink.clone(), minimal_config(&[HOST_A]));
    let started = harness.started;
    advance_ms(6000).await;
    harness.stop().await.unwrap();

    assert_eq!(
        sink.count_containing("Connectivity outage detected for: 10.0.0.1")
            .await,
        1
    );

    // Resent at every timeout boundary, never advancing the sequence.
    let sent = transport.sent_to(HOST_A);
    assert_eq!(sent.len(), 4);
    for (i, request) in sent.iter().enumerate() {
        assert_eq!(request.request.sequence, 1);
        assert_at(started, request.at, 1900 * i as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn recovery_emits_one_clear_then_resumes_interval() {
    let transport = LoopbackTransport::new(Duration::from_millis(500));
    let sink = outage_core::MemorySink::new();

    let harness = spawn_engine(&transport, sink.clone(), minimal_config(&[HOST_A]));
    let started = harness.started;

    // Timeouts at 1900 and 3800; the host comes back in between.
    advance_ms(2500).await;
    transport.set_reachable(HOST_A, true);
    advance_ms(3000).await;
    harness.stop().await.unwrap();

    assert_eq!(sink.count_containing("outage detected").await, 1);
    assert_eq!(
        sink.count_containing("Connectivity outage cleared for: 10.0.0.1")
            .await,
        1
    );

    let messages = sink.messages().await;
    let detected = messages.iter().position(|m| m.contains("detected"));
    let cleared = messages.iter().position(|m| m.contains("cleared"));
    assert!(detected < cleared);

    // seq 1 at 0, 1900, 3800 (answered at 4300), then seq 2 at 5200
    let sent = transport.sent_to(HOST_A);
    let sequences: Vec<u16> = sent.iter().map(|s| s.request.sequence).collect();
    assert_eq!(sequences, vec![1, 1, 1, 2]);
    assert_at(started, sent[2].at, 3800);
    assert_at(started, sent[3].at, 5200);
}

#[tokio::test(start_paused = true)]
async fn late_reply_resolves_the_resent_request() {
    // Replies take longer than the timeout, but the resend keeps the same
    // sequence, so the late reply still matches.
    let transport = LoopbackTransport::new(Duration::from_millis(2500));
    transport.set_reachable(HOST_A, true);
    let sink = outage_core::MemorySink::new();

    let harness = spawn_engine(&transport, sink.clone(), minimal_config(&[HOST_A]));
    advance_ms(3000).await;
    harness.stop().await.unwrap();

    let messages = sink.messages().await;
    assert_eq!(sink.count_containing("outage detected").await, 1);
    assert_eq!(sink.count_containing("outage cleared").await, 1);
    assert!(messages[1].contains("detected"));
    assert!(messages[2].contains("cleared"));

    let sent = transport.sent_to(HOST_A);
    assert_eq!(sent[0].request.sequence, 1);
    assert_eq!(sent[1].request.sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn event_channel_mirrors_transitions() {
    let transport = LoopbackTransport::new(Duration::ZERO);
    let sink = outage_core::MemorySink::new();

    let mut harness = spawn_engine(&transport, sink, minimal_config(&[HOST_A]));
    advance_ms(2000).await;

    assert_eq!(
        harness.events.recv().await,
        Some(MonitorEvent::Started { probes: 1 })
    );
    assert_eq!(
        harness.events.recv().await,
        Some(MonitorEvent::OutageDetected {
            target: HOST_A,
            identifier: 1,
        })
    );
    assert!(harness.events.try_recv().is_err());

    harness.stop().await.unwrap();
}
