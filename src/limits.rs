// Hard caps on engine inputs. Anything above these is rejected with
// `EngineError::LimitExceeded` before touching the WAL.

pub const MAX_OFFICES: usize = 10_000;
pub const MAX_BOOKINGS_PER_OFFICE: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 1024;
pub const MAX_BREAKS_PER_DAY: usize = 48;

/// Slot duration bounds, in minutes.
pub const MIN_SLOT_MINUTES: i64 = 1;
pub const MAX_SLOT_MINUTES: i64 = 24 * 60;

/// Widest booking accepted, in minutes (one week).
pub const MAX_BOOKING_MINUTES: i64 = 7 * 24 * 60;
