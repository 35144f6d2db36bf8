use crate::model::{Booking, Span};

/// Half-open overlap: `a.start < b.end && a.end > b.start`.
/// Intervals that merely touch do not overlap.
pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.start < b.end && a.end > b.start
}

/// First booking, in iteration order, whose span overlaps `slot`.
pub fn find_conflict<'a, I>(slot: &Span, bookings: I) -> Option<&'a Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings.into_iter().find(|b| overlaps(slot, &b.span))
}
