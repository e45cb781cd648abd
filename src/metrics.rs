use lazy_static::lazy_static;
use prometheus::{
    Gauge, Histogram, IntCounter, IntCounterVec, register_gauge, register_histogram,
    register_int_counter, register_int_counter_vec,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: IntCounter =
        register_int_counter!("gateway_requests_total", "Total number of guarded requests").unwrap();
    pub static ref ADMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gateway_admissions_total",
        "Admission decisions by policy class and outcome",
        &["policy", "outcome"]
    )
    .unwrap();
    pub static ref TRACKED_KEYS: Gauge =
        register_gauge!("gateway_quota_tracked_keys", "Current number of quota records").unwrap();
    pub static ref SWEEPS_TOTAL: IntCounter =
        register_int_counter!("gateway_quota_sweeps_total", "Total quota cleanup sweeps").unwrap();
    pub static ref SWEPT_RECORDS_TOTAL: IntCounter = register_int_counter!(
        "gateway_quota_swept_records_total",
        "Total expired quota records removed by sweeps"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Upstream request latency in seconds"
    )
    .unwrap();
}
