//! Statistics tests

use crate::runtime::node::SERVER_SLOT;
use crate::runtime::scheduler::NodeStats;

#[test]
fn test_counts_per_slot() {
    let stats = NodeStats::new();
    stats.record_created(0);
    stats.record_created(1);
    stats.record_executed(1);
    stats.record_executed(1);
    stats.record_executed(SERVER_SLOT);

    let snapshot = stats.snapshot(0, 2);
    assert_eq!(snapshot.created, 2);
    assert_eq!(snapshot.executed, 3);
    // the server slot is counted in the total, not in the per-worker list
    assert_eq!(snapshot.executed_per_worker, vec![0, 2]);
}

#[test]
fn test_out_of_range_slot_is_ignored() {
    let stats = NodeStats::new();
    stats.record_created(SERVER_SLOT + 10);
    assert_eq!(stats.snapshot(0, 1).created, 0);
}

#[test]
fn test_reset_keeps_steal_counters() {
    let stats = NodeStats::new();
    stats.record_created(0);
    stats.record_executed(0);
    stats.record_steal_attempt();
    stats.record_steal_served();
    stats.record_steal_hit();

    stats.reset();
    let snapshot = stats.snapshot(3, 1);
    assert_eq!(snapshot.created, 0);
    assert_eq!(snapshot.executed, 0);
    assert_eq!(snapshot.steal_attempts, 1);
    assert_eq!(snapshot.steal_served, 1);
    assert_eq!(snapshot.steal_hits, 1);
}

#[test]
fn test_snapshot_display() {
    let stats = NodeStats::new();
    stats.record_created(0);
    stats.record_executed(0);
    stats.record_executed(1);
    stats.record_steal_attempt();

    let line = stats.snapshot(1, 2).to_string();
    assert_eq!(
        line,
        "[ 1] steals served/attempts/hits = 0/1/0 created = 1, executed = 2:(1,1)"
    );
}
