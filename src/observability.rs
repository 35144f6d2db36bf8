use std::net::SocketAddr;

// ── Scheduling metrics ──────────────────────────────────────────

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "slotwise_availability_queries_total";

/// Histogram: slots produced per generation.
pub const SLOTS_GENERATED: &str = "slotwise_slots_generated";

/// Counter: bookings committed.
pub const BOOKINGS_PLACED_TOTAL: &str = "slotwise_bookings_placed_total";

/// Counter: booking rule violations. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "slotwise_bookings_rejected_total";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotwise_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
