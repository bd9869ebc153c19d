//! Integration tests for the probe-history pipeline
//!
//! These tests verify append/evict/snapshot behavior and cross-address
//! independence without requiring actual network access.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use pingmon::config::Settings;
use pingmon::monitor::Coordinator;
use pingmon::state::{History, ProbeError, ProbeOutcome};

/// Successful outcome stamped `offset_secs` after `base`
fn success_at(base: DateTime<Utc>, offset_secs: i64, rtt_ms: u64) -> ProbeOutcome {
    ProbeOutcome::success(
        base + TimeDelta::seconds(offset_secs),
        Duration::from_millis(rtt_ms),
    )
}

#[test]
fn test_entries_stay_time_ordered() {
    let base = Utc::now();
    let mut history = History::new();

    for offset in [0, 5, 10, 15, 20] {
        history.append(success_at(base, offset, 10));
    }
    history.append(ProbeOutcome::dropped(
        base + TimeDelta::seconds(25),
        ProbeError::Timeout,
    ));

    let stamps: Vec<_> = history.entries().map(|e| e.sent_at).collect();
    assert_eq!(stamps.len(), 6);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_eviction_window_boundary() {
    // Retention 300s, entries at t=0,100,200,300,400; evicting at now=410
    // keeps exactly t=200,300,400 (age of t=100 is 310 > 300)
    let base = Utc::now();
    let mut history = History::new();
    for offset in [0, 100, 200, 300, 400] {
        history.append(success_at(base, offset, 10));
    }

    let now = base + TimeDelta::seconds(410);
    history.evict_expired(now, Duration::from_secs(300));

    let stamps: Vec<_> = history.entries().map(|e| e.sent_at).collect();
    assert_eq!(
        stamps,
        vec![
            base + TimeDelta::seconds(200),
            base + TimeDelta::seconds(300),
            base + TimeDelta::seconds(400),
        ]
    );
}

#[test]
fn test_eviction_keeps_exact_boundary_age() {
    // An entry exactly retention old (sent_at == now - retention) survives
    let base = Utc::now();
    let mut history = History::new();
    history.append(success_at(base, 0, 10));
    history.append(success_at(base, 10, 10));

    history.evict_expired(base + TimeDelta::seconds(300), Duration::from_secs(300));
    assert_eq!(history.len(), 2);

    history.evict_expired(base + TimeDelta::seconds(301), Duration::from_secs(300));
    assert_eq!(history.len(), 1);
}

#[test]
fn test_retention_zero_disables_eviction() {
    let base = Utc::now();
    let mut history = History::new();
    for offset in [-100_000, -50_000, 0] {
        history.append(success_at(base, offset, 10));
    }

    history.evict_expired(base, Duration::ZERO);
    assert_eq!(history.len(), 3);
}

#[test]
fn test_eviction_can_empty_history() {
    let base = Utc::now();
    let mut history = History::new();
    for offset in [0, 1, 2] {
        history.append(success_at(base, offset, 10));
    }

    history.evict_expired(base + TimeDelta::seconds(1000), Duration::from_secs(60));
    assert!(history.is_empty());
    assert!(history.latest().is_none());
}

#[test]
fn test_counters_survive_eviction() {
    let base = Utc::now();
    let mut history = History::new();

    let mut last_attempted = 0;
    let mut last_dropped = 0;
    for cycle in 0..50 {
        if cycle % 3 == 0 {
            history.append(ProbeOutcome::dropped(
                base + TimeDelta::seconds(cycle),
                ProbeError::Timeout,
            ));
        } else {
            history.append(success_at(base, cycle, 10));
        }
        history.evict_expired(base + TimeDelta::seconds(cycle), Duration::from_secs(10));

        // Monotonic across every append/evict interleaving
        assert!(history.attempted() >= last_attempted);
        assert!(history.dropped() >= last_dropped);
        last_attempted = history.attempted();
        last_dropped = history.dropped();
    }

    // Lifetime totals reflect every completed attempt, not the window
    assert_eq!(history.attempted(), 50);
    assert_eq!(history.dropped(), 17);
    assert!(history.len() < 50);
}

#[test]
fn test_loss_rate_uses_lifetime_counters() {
    let base = Utc::now();
    let mut history = History::new();

    for cycle in 0..10 {
        history.append(ProbeOutcome::dropped(
            base + TimeDelta::seconds(cycle),
            ProbeError::Timeout,
        ));
    }
    // Evict everything; the loss rate must not change
    history.evict_expired(base + TimeDelta::seconds(1000), Duration::from_secs(60));

    assert!(history.is_empty());
    assert_eq!(history.loss_pct(), Some(100.0));

    let snap = history.snapshot();
    assert_eq!(snap.attempted, 10);
    assert_eq!(snap.dropped, 10);
    assert_eq!(snap.status_line("10.9.9.9"), "10.9.9.9: latency=- loss=100.0%");
}

#[test]
fn test_concurrent_writers_are_independent() {
    const WRITERS: usize = 8;
    const APPENDS: u64 = 500;

    let addresses: Vec<String> = (0..WRITERS).map(|i| format!("10.0.0.{}", i)).collect();
    let coordinator = Coordinator::new(Settings::default(), &addresses);

    let mut threads = Vec::new();
    for address in &addresses {
        let handle = coordinator.history(address).expect("history exists");
        threads.push(std::thread::spawn(move || {
            for k in 0..APPENDS {
                let mut history = handle.lock();
                if k % 5 == 0 {
                    history.append(ProbeOutcome::dropped(Utc::now(), ProbeError::Timeout));
                } else {
                    history.append(ProbeOutcome::success(
                        Utc::now(),
                        Duration::from_millis(k % 40),
                    ));
                }
                history.evict_expired(Utc::now(), Duration::from_secs(300));
            }
        }));
    }
    for thread in threads {
        thread.join().expect("writer thread panicked");
    }

    // Each history holds exactly its own writer's appends
    for address in &addresses {
        let handle = coordinator.history(address).expect("history exists");
        let history = handle.lock();
        assert_eq!(history.len(), APPENDS as usize);
        assert_eq!(history.attempted(), APPENDS);
        assert_eq!(history.dropped(), APPENDS / 5);
    }
}

#[test]
fn test_snapshot_consistency_under_writes() {
    let base = Utc::now();
    let mut history = History::new();

    history.append(success_at(base, 0, 12));
    history.append(ProbeOutcome::dropped(
        base + TimeDelta::seconds(5),
        ProbeError::Timeout,
    ));

    let snap = history.snapshot();
    // Counters and latest entry come from the same locked read
    assert_eq!(snap.attempted, 2);
    assert_eq!(snap.dropped, 1);
    let latest = snap.latest.expect("has entries");
    assert!(latest.dropped);
    assert_eq!(latest.error, Some(ProbeError::Timeout));
    assert_eq!(snap.last_latency_ms, Some(12.0));
    assert_eq!(snap.loss_pct, Some(50.0));
}

#[test]
fn test_failed_probe_is_recorded_but_not_counted() {
    // A resolution failure shows up in the window without skewing the
    // loss rate
    let base = Utc::now();
    let mut history = History::new();

    history.append(ProbeOutcome::failed(
        base,
        ProbeError::Resolve("name lookup failed".into()),
    ));
    history.append(success_at(base, 5, 20));

    assert_eq!(history.len(), 2);
    assert_eq!(history.attempted(), 1);
    assert_eq!(history.dropped(), 0);
    assert_eq!(history.loss_pct(), Some(0.0));
}

#[test]
fn test_settings_serialization_roundtrip() {
    let settings = Settings {
        refresh_interval: Duration::from_secs(1),
        retention: Duration::from_secs(300),
        probe_interval: Duration::from_secs(5),
        probe_timeout: Duration::from_millis(2500),
        count: Some(10),
    };

    let json = serde_json::to_string(&settings).expect("serialize");
    let restored: Settings = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(restored.refresh_interval, settings.refresh_interval);
    assert_eq!(restored.retention, settings.retention);
    assert_eq!(restored.probe_interval, settings.probe_interval);
    assert_eq!(restored.probe_timeout, settings.probe_timeout);
    assert_eq!(restored.count, settings.count);
}
