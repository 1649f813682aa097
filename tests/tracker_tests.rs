mod common;

use chrono::Duration;
use dedup_registry::tracker::{BlockReason, InboundMessage, MessageTracker, TrackerConfig};
use std::sync::Arc;
use std::thread;

fn message(id: &str, content: &str) -> InboundMessage {
    InboundMessage::new(id, "support-bot", "5511999990000@s.whatsapp.net", content)
}

#[test]
fn test_first_delivery_can_be_processed() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    let decision = tracker.check(&message("m1", "Olá"));

    assert!(decision.can_process);
    assert_eq!(decision.reason, None);
    assert_eq!(decision.processing_count, 1);
}

#[test]
fn test_redelivery_is_duplicate() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    tracker.check(&message("m1", "Olá"));
    let decision = tracker.check(&message("m1", "Olá"));

    assert!(!decision.can_process);
    assert_eq!(decision.reason, Some(BlockReason::Duplicate));
    assert_eq!(decision.processing_count, 2);
}

#[test]
fn test_repeated_redelivery_becomes_loop() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    let msg = message("m1", "Olá");

    for _ in 0..5 {
        tracker.track(&msg);
    }
    let outcome = tracker.track(&msg);
    assert!(outcome.is_loop_detected);
    assert_eq!(outcome.processing_count, 6);

    let decision = tracker.check(&msg);
    assert_eq!(decision.reason, Some(BlockReason::LoopDetected));
}

#[test]
fn test_same_content_under_new_ids_is_loop() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());

    for i in 0..5 {
        let decision = tracker.check(&message(&format!("m{}", i), "Auto-reply: we are closed"));
        assert!(decision.can_process, "message {} should pass", i);
    }

    let decision = tracker.check(&message("m5", "  AUTO-REPLY:   we are closed "));
    assert!(!decision.can_process);
    assert_eq!(decision.reason, Some(BlockReason::LoopDetected));
}

#[test]
fn test_different_content_is_not_loop() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    for i in 0..20 {
        let decision = tracker.check(&message(&format!("m{}", i), &format!("question number {}", i)));
        assert!(decision.can_process);
    }
}

#[test]
fn test_instances_are_scoped() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    let a = InboundMessage::new("m1", "instance-a", "jid", "hello");
    let b = InboundMessage::new("m1", "instance-b", "jid", "hello");

    assert!(tracker.check(&a).can_process);
    assert!(tracker.check(&b).can_process);
    assert!(!tracker.check(&a).can_process);
}

#[test]
fn test_idle_messages_expire() {
    let (tracker, clock) = common::tracker_with_clock(TrackerConfig::default());
    tracker.check(&message("m1", "Olá"));

    clock.advance(Duration::minutes(31));
    let decision = tracker.check(&message("m1", "Olá"));
    assert!(decision.can_process);
    assert_eq!(decision.processing_count, 1);
}

#[test]
fn test_duplicate_refreshes_idle_timer() {
    let (tracker, clock) = common::tracker_with_clock(TrackerConfig::default());
    tracker.check(&message("m1", "Olá"));

    clock.advance(Duration::minutes(20));
    assert!(!tracker.check(&message("m1", "Olá")).can_process);

    clock.advance(Duration::minutes(20));
    assert!(!tracker.check(&message("m1", "Olá")).can_process);
}

#[test]
fn test_cleanup_expired() {
    let (tracker, clock) = common::tracker_with_clock(TrackerConfig::default());
    tracker.track(&message("m1", "one"));
    tracker.track(&message("m2", "two"));
    clock.advance(Duration::minutes(10));
    tracker.track(&message("m3", "three"));

    clock.advance(Duration::minutes(25));
    assert_eq!(tracker.cleanup_expired(), 2);
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_stats_report_potential_loops() {
    let (tracker, _clock) = common::tracker_with_clock(TrackerConfig::default());
    for i in 0..4 {
        tracker.track(&InboundMessage::new(format!("a{}", i), "sales", "noisy", "ping"));
    }
    tracker.track(&InboundMessage::new("b0", "sales", "quiet", "hello"));
    tracker.track(&InboundMessage::new("c0", "support", "someone", "hi"));

    let stats = tracker.stats();
    assert_eq!(stats.total_tracked, 6);
    assert_eq!(stats.instance_counts.get("sales"), Some(&5));
    assert_eq!(stats.instance_counts.get("support"), Some(&1));
    assert_eq!(stats.potential_loops.len(), 1);
    assert_eq!(stats.potential_loops[0].remote_jid, "noisy");
    assert_eq!(stats.potential_loops[0].count, 4);
}

#[test]
fn test_sender_counts_bounded_by_cache_size() {
    let (tracker, clock) = common::tracker_with_clock(TrackerConfig {
        max_cache_size: 2,
        ..TrackerConfig::default()
    });

    for i in 0..5000 {
        clock.advance(Duration::milliseconds(1));
        tracker.track(&InboundMessage::new(
            format!("m{}", i),
            "inst",
            format!("jid-{}", i),
            "hello",
        ));
    }

    let stats = tracker.stats();
    assert_eq!(stats.total_tracked, 2);
    assert_eq!(stats.instance_counts.get("inst"), Some(&2));
    assert!(stats.potential_loops.is_empty());
}

#[test]
fn test_eviction_releases_sender_counter() {
    let (tracker, clock) = common::tracker_with_clock(TrackerConfig {
        max_cache_size: 1,
        ..TrackerConfig::default()
    });

    tracker.track(&InboundMessage::new("m1", "sales", "old-sender", "hi"));
    clock.advance(Duration::seconds(1));
    tracker.track(&InboundMessage::new("m2", "support", "new-sender", "hi"));

    let stats = tracker.stats();
    assert_eq!(stats.instance_counts.get("sales"), None);
    assert_eq!(stats.instance_counts.get("support"), Some(&1));
}

#[test]
fn test_concurrent_redelivery_single_processing() {
    let tracker = Arc::new(MessageTracker::default());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.check(&message("m1", "Olá")).can_process)
        })
        .collect();

    let processed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(processed, 1);
}
