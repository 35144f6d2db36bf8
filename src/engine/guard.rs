use ulid::Ulid;

use crate::lookup::{BookingLookup, OverlapQuery};
use crate::model::*;

use super::error::Violation;
use super::EngineError;

/// Whether the candidate is a new booking or an edit of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Check `candidate` against every booking rule and report all that fail.
///
/// Structural rules (end after start, booked-at not after start, future start
/// on create) and the three overlap rules are evaluated independently. The
/// overlap rules only run when the candidate has a real interval, and ignore
/// the candidate's own id so an update never collides with itself.
///
/// This is the friendly pre-check. The commit path repeats the overlap
/// rules under the commit lock, which is what actually prevents double-booking.
pub async fn validate_booking<L>(
    lookup: &L,
    candidate: &NewBooking,
    now: Timestamp,
    mode: WriteMode,
) -> Result<(), EngineError>
where
    L: BookingLookup + ?Sized,
{
    let mut violations = structural_violations(candidate, now, mode);

    if let Some(span) = candidate.span()
        && candidate.status.is_active()
    {
        let base = OverlapQuery::new(span).excluding(candidate.id);
        let checks: [(OverlapQuery, fn(Ulid) -> Violation); 3] = [
            (base.provider(candidate.provider_id), Violation::ProviderOverlap),
            (base.customer(candidate.customer_id), Violation::CustomerOverlap),
            (base.office(candidate.office_id), Violation::OfficeOverlap),
        ];
        for (query, violation) in checks {
            if let Some(hit) = lookup.active_overlapping(&query).await?.first() {
                violations.push(violation(hit.id));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Invalid(violations))
    }
}

/// Rules that need no storage access.
pub fn structural_violations(candidate: &NewBooking, now: Timestamp, mode: WriteMode) -> Vec<Violation> {
    let mut violations = Vec::new();
    if candidate.end <= candidate.start {
        violations.push(Violation::EndNotAfterStart);
    }
    if candidate.booked_at > candidate.start {
        violations.push(Violation::BookedAfterStart);
    }
    if mode == WriteMode::Create && candidate.start <= now {
        violations.push(Violation::StartNotInFuture);
    }
    violations
}
