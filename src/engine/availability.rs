use chrono::NaiveDate;
use ulid::Ulid;

use crate::lookup::BookingLookup;
use crate::model::*;

use super::overlap::find_conflict;
use super::slots::generate;
use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Annotate every slot of `date` with whether it can still be booked.
///
/// Bookings are fetched once for the whole day (narrowed to `provider_id`
/// when given, office-wide otherwise) and never when the day has no slots.
/// A slot is available iff it starts strictly after `now` and no active
/// booking overlaps it.
pub async fn compute_availability<L>(
    lookup: &L,
    office: &Office,
    date: NaiveDate,
    provider_id: Option<Ulid>,
    now: Timestamp,
) -> Result<Vec<SlotAvailability>, EngineError>
where
    L: BookingLookup + ?Sized,
{
    let slots = generate(&office.working_plan, date)?;
    if slots.is_empty() {
        return Ok(Vec::new());
    }

    let mut bookings = lookup.office_bookings_on(office.id, date, provider_id).await?;
    bookings.retain(Booking::is_active);

    Ok(annotate(slots, &bookings, now))
}

/// Pure step of [`compute_availability`]: reconcile slots against bookings.
pub fn annotate(slots: Vec<Slot>, bookings: &[Booking], now: Timestamp) -> Vec<SlotAvailability> {
    slots
        .into_iter()
        .map(|slot| {
            let conflict = find_conflict(&slot, bookings).cloned();
            let reason = if conflict.is_some() {
                Some(UnavailableReason::Conflict)
            } else if slot.start <= now {
                Some(UnavailableReason::Past)
            } else {
                None
            };
            SlotAvailability {
                slot,
                available: reason.is_none(),
                conflict,
                reason,
            }
        })
        .collect()
}
