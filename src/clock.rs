use chrono::{FixedOffset, Offset, Utc};

use crate::model::Timestamp;

/// Source of "now" in the configured local zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Offset in minutes east of UTC. Out-of-range offsets fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = minutes.checked_mul(60).and_then(FixedOffset::east_opt).unwrap_or_else(|| {
            tracing::warn!("utc offset {minutes}m out of range, using UTC");
            Utc.fix()
        });
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::with_offset_minutes(0)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
