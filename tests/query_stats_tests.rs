//! Collector aggregation tests
//!
//! Drives the public collector API the way a host debug hook would.

use querystat::clock::ManualClock;
use querystat::{Collector, CollectorConfig, ParamKey, ParamValue};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn collector_with_clock() -> (Collector, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let collector = Collector::new(CollectorConfig::without_callers()).with_clock(clock.clone());
    (collector, clock)
}

#[test]
#[serial]
fn test_select_one_twice_with_real_sleep() {
    // Real wall clock: two 10ms queries
    let collector = Collector::new(CollectorConfig::without_callers());
    for _ in 0..2 {
        let token = collector.record_start("SELECT 1", &[]);
        thread::sleep(Duration::from_millis(10));
        collector.record_end(token, "SELECT 1", &[]);
    }

    assert_eq!(collector.query_count(), 2);

    let report = collector.report(false);
    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert_eq!(entry.count, 2);
    assert!(
        entry.total_time_secs >= 0.02 && entry.total_time_secs < 0.2,
        "unexpected total {}",
        entry.total_time_secs
    );
    assert!(entry.average_secs >= 0.01 && entry.average_secs < 0.1);
}

#[test]
fn test_query_count_equals_starts() {
    let (collector, clock) = collector_with_clock();
    let queries = ["SELECT a", "SELECT b", "SELECT a", "UPDATE c SET d = ?", "SELECT a"];
    for q in queries {
        let token = collector.record_start(q, &[]);
        clock.advance(Duration::from_millis(1));
        collector.record_end(token, q, &[]);
    }
    assert_eq!(collector.query_count(), queries.len() as u64);
    assert_eq!(collector.snapshot().queries.len(), 3);
}

#[test]
fn test_same_tuple_twice_is_one_entry() {
    let (collector, _) = collector_with_clock();
    let q = "SELECT * FROM orders WHERE user_id = ? AND status = ?";
    let params: Vec<ParamValue> = vec![42.into(), "open".into()];
    for _ in 0..2 {
        let token = collector.record_start(q, &params);
        collector.record_end(token, q, &params);
    }

    let state = collector.snapshot();
    let stats = state.get(q).unwrap();
    assert_eq!(stats.param_occurrences.len(), 1);
    assert_eq!(stats.param_occurrences[&ParamKey::from_params(&params)], 2);
}

#[test]
fn test_two_tuples_are_two_entries() {
    let (collector, _) = collector_with_clock();
    let q = "SELECT * FROM orders WHERE user_id = ?";
    for id in [1, 2] {
        let params = [ParamValue::from(id)];
        let token = collector.record_start(q, &params);
        collector.record_end(token, q, &params);
    }

    let state = collector.snapshot();
    let stats = state.get(q).unwrap();
    assert_eq!(stats.param_occurrences.len(), 2);
    assert!(stats.param_occurrences.values().all(|&n| n == 1));
}

#[test]
fn test_separator_in_value_is_not_ambiguous() {
    let (collector, _) = collector_with_clock();
    let q = "INSERT INTO t VALUES (?, ?)";
    for params in [vec![ParamValue::from("a, b")], vec!["a".into(), "b".into()]] {
        let token = collector.record_start(q, &params);
        collector.record_end(token, q, &params);
    }
    assert_eq!(collector.snapshot().get(q).unwrap().distinct_params(), 2);
}

#[test]
fn test_interleaved_queries_from_threads() {
    let clock = Arc::new(ManualClock::new());
    let collector = Arc::new(
        Collector::new(CollectorConfig::without_callers()).with_clock(clock.clone()),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let collector = Arc::clone(&collector);
            thread::spawn(move || {
                for _ in 0..25 {
                    let q = format!("SELECT {}", i % 2);
                    let token = collector.record_start(&q, &[]);
                    collector.record_end(token, &q, &[]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(collector.query_count(), 100);
    assert_eq!(collector.in_flight(), 0);
    let state = collector.snapshot();
    assert_eq!(state.get("SELECT 0").unwrap().count, 50);
    assert_eq!(state.get("SELECT 1").unwrap().count, 50);
}

#[test]
fn test_reset_starts_new_session() -> anyhow::Result<()> {
    let (collector, clock) = collector_with_clock();
    collector.time_query("SELECT 1", &[], || clock.advance(Duration::from_millis(5)));
    assert_eq!(collector.query_count(), 1);

    collector.reset();
    assert_eq!(collector.query_count(), 0);

    collector.time_query("SELECT 2", &[], || ());
    let state = collector.snapshot();
    anyhow::ensure!(state.get("SELECT 1").is_none(), "old shape survived reset");
    anyhow::ensure!(state.get("SELECT 2").is_some(), "new shape missing");
    Ok(())
}
