//! Host database metrics

use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Gauge, IntCounter, IntCounterVec, IntGaugeVec,
};
use lazy_static::lazy_static;

lazy_static! {
    /// Known hosts by kind
    pub static ref HOSTS: IntGaugeVec = register_int_gauge_vec!(
        "hostdb_hosts",
        "Number of hosts in the database",
        &["kind"]
    ).unwrap();

    /// Sum of selection weights
    pub static ref TOTAL_WEIGHT: Gauge = register_gauge!(
        "hostdb_total_weight",
        "Total selection weight of active hosts"
    ).unwrap();

    /// Blocks processed
    pub static ref BLOCKS: IntCounterVec = register_int_counter_vec!(
        "hostdb_blocks_total",
        "Total number of blocks processed",
        &["direction"]
    ).unwrap();

    /// Announcement outcomes
    pub static ref ANNOUNCEMENTS: IntCounterVec = register_int_counter_vec!(
        "hostdb_announcements_total",
        "Total number of announcements seen",
        &["result"]
    ).unwrap();

    /// Batches refused for not linking to the cursor
    pub static ref DESYNCS: IntCounter = register_int_counter!(
        "hostdb_desync_total",
        "Total number of change batches rejected as desynchronized"
    ).unwrap();
}

/// Record an announcement outcome
pub fn record_announcement(result: &str) {
    ANNOUNCEMENTS.with_label_values(&[result]).inc();
}

/// Record a processed block
pub fn record_block(direction: &str) {
    BLOCKS.with_label_values(&[direction]).inc();
}

/// Record a rejected batch
pub fn record_desync() {
    DESYNCS.inc();
}

/// Update catalog size metrics
pub fn update_catalog(total: usize, active: usize, total_weight: u64) {
    HOSTS.with_label_values(&["total"]).set(total as i64);
    HOSTS.with_label_values(&["active"]).set(active as i64);
    TOTAL_WEIGHT.set(total_weight as f64);
}
