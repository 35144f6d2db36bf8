use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::observability;

/// Compact the engine's WAL once more than `threshold` entries could be folded.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends <= threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

/// Background task that checks the WAL every `period` and compacts past `threshold`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}
