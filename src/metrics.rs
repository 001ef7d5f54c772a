//metrics.rs
use lazy_static::lazy_static;
use prometheus::{register_counter, Counter, Opts};

lazy_static! {
    pub static ref NOTIFICATIONS_ADDED: Counter = register_counter!(Opts::new(
        "notifications_added_total",
        "Total number of notifications added to the local store"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_EVICTED: Counter = register_counter!(Opts::new(
        "notifications_evicted_total",
        "Total number of notifications evicted by the global storage cap"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_EXPIRED: Counter = register_counter!(Opts::new(
        "notifications_expired_total",
        "Total number of notifications dropped after their expiry"
    ))
    .unwrap();

    pub static ref MAINTENANCE_RUNS: Counter = register_counter!(Opts::new(
        "maintenance_runs_total",
        "Total number of maintenance passes over the store"
    ))
    .unwrap();

    pub static ref PUSH_SYNC_FAILURES: Counter = register_counter!(Opts::new(
        "push_sync_failures_total",
        "Total number of failed push subscription sync calls to the server"
    ))
    .unwrap();
}

// Render all registered metrics in the prometheus text format
pub fn metrics_snapshot() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
