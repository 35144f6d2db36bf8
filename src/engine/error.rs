use std::fmt;

use ulid::Ulid;

use crate::plan::DayName;

/// A working plan that cannot be expanded into slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    BadTime {
        day: DayName,
        field: &'static str,
        value: String,
    },
    EmptyWindow {
        day: DayName,
    },
    BadBreak {
        day: DayName,
        index: usize,
    },
    BadSlotDuration(i64),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::BadTime { day, field, value } => {
                write!(f, "{day}: unparseable {field} time {value:?}")
            }
            PlanError::EmptyWindow { day } => write!(f, "{day}: start must be before end"),
            PlanError::BadBreak { day, index } => {
                write!(f, "{day}: break #{index} start must be before end")
            }
            PlanError::BadSlotDuration(m) => write!(f, "slot duration out of range: {m} minutes"),
        }
    }
}

/// One broken booking rule. Each rule has its own variant and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    EndNotAfterStart,
    BookedAfterStart,
    StartNotInFuture,
    ProviderOverlap(Ulid),
    CustomerOverlap(Ulid),
    OfficeOverlap(Ulid),
}

impl Violation {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Violation::EndNotAfterStart => "end_after_start",
            Violation::BookedAfterStart => "book_before_start",
            Violation::StartNotInFuture => "future_start",
            Violation::ProviderOverlap(_) => "provider_overlap",
            Violation::CustomerOverlap(_) => "customer_overlap",
            Violation::OfficeOverlap(_) => "office_overlap",
        }
    }

    pub fn is_overlap(&self) -> bool {
        matches!(
            self,
            Violation::ProviderOverlap(_) | Violation::CustomerOverlap(_) | Violation::OfficeOverlap(_)
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::EndNotAfterStart => f.write_str("end must be after start"),
            Violation::BookedAfterStart => f.write_str("booked-at must be before or at start"),
            Violation::StartNotInFuture => f.write_str("start must be in the future"),
            Violation::ProviderOverlap(id) => write!(f, "provider already booked: {id}"),
            Violation::CustomerOverlap(id) => write!(f, "customer already booked: {id}"),
            Violation::OfficeOverlap(id) => write!(f, "office already booked: {id}"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    HasActiveBookings(Ulid),
    InvalidPlan(PlanError),
    Invalid(Vec<Violation>),
    Malformed(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Violations carried by an `Invalid` error; empty otherwise.
    pub fn violations(&self) -> &[Violation] {
        match self {
            EngineError::Invalid(v) => v,
            _ => &[],
        }
    }
}

impl From<PlanError> for EngineError {
    fn from(e: PlanError) -> Self {
        EngineError::InvalidPlan(e)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete office {id}: has active bookings")
            }
            EngineError::InvalidPlan(e) => write!(f, "invalid working plan: {e}"),
            EngineError::Invalid(violations) => {
                f.write_str("booking rejected: ")?;
                for (i, v) in violations.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            EngineError::Malformed(msg) => write!(f, "malformed input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
