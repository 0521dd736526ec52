//! Prometheus metrics for the settlement bridge

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Total notices delivered
    pub static ref NOTICE_DELIVERY_TOTAL: CounterVec = register_counter_vec!(
        "settlement_bridge_delivery_total",
        "Total settlement notices delivered",
        &["status"]
    )
    .unwrap();

    /// Notice delivery duration
    pub static ref NOTICE_DELIVERY_DURATION: HistogramVec = register_histogram_vec!(
        "settlement_bridge_delivery_duration_seconds",
        "Settlement notice delivery duration in seconds",
        &["status"]
    )
    .unwrap();

    /// Feed receive outcomes (ok / lagged)
    pub static ref FEED_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "settlement_bridge_feed_receive_total",
        "Distribution feed receive outcomes",
        &["outcome"]
    )
    .unwrap();
}
