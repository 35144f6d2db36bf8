use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::plan::WorkingPlan;

/// Wall-clock time in the configured local zone; the only time type.
pub type Timestamp = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The whole calendar day `[date 00:00, date+1 00:00)`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN);
        Self::new(start, start + Duration::days(1))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }
}

/// A bookable candidate interval produced by slot generation.
pub type Slot = Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Whether a booking in this status occupies its interval.
    /// Exhaustive on purpose: a new status must decide here.
    pub fn is_active(self) -> bool {
        match self {
            BookingStatus::Pending
            | BookingStatus::Confirmed
            | BookingStatus::Completed
            | BookingStatus::NoShow => true,
            BookingStatus::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "no_show" | "noshow" => Ok(BookingStatus::NoShow),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A committed booking of `provider` by `customer` at `office`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub office_id: Ulid,
    pub provider_id: Ulid,
    pub customer_id: Ulid,
    pub span: Span,
    pub booked_at: Timestamp,
    pub status: BookingStatus,
    pub location: Option<String>,
    pub color: Option<String>,
    /// Provider-blocked time rather than a customer appointment.
    pub unavailability: bool,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A booking request before validation. `start`/`end` are kept apart
/// (not a `Span`) so an inverted range can be reported instead of panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: Ulid,
    pub office_id: Ulid,
    pub provider_id: Ulid,
    pub customer_id: Ulid,
    pub start: Timestamp,
    pub end: Timestamp,
    pub booked_at: Timestamp,
    pub status: BookingStatus,
    pub location: Option<String>,
    pub color: Option<String>,
    pub unavailability: bool,
}

impl NewBooking {
    pub fn new(
        office_id: Ulid,
        provider_id: Ulid,
        customer_id: Ulid,
        start: Timestamp,
        end: Timestamp,
        booked_at: Timestamp,
    ) -> Self {
        Self {
            id: Ulid::new(),
            office_id,
            provider_id,
            customer_id,
            start,
            end,
            booked_at,
            status: BookingStatus::Pending,
            location: None,
            color: None,
            unavailability: false,
        }
    }

    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = status;
        self
    }

    /// `None` when `end <= start`.
    pub fn span(&self) -> Option<Span> {
        (self.start < self.end).then(|| Span::new(self.start, self.end))
    }

    pub(crate) fn into_booking(self, span: Span) -> Booking {
        Booking {
            id: self.id,
            office_id: self.office_id,
            provider_id: self.provider_id,
            customer_id: self.customer_id,
            span,
            booked_at: self.booked_at,
            status: self.status,
            location: self.location,
            color: self.color,
            unavailability: self.unavailability,
        }
    }
}

impl From<&Booking> for NewBooking {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            office_id: b.office_id,
            provider_id: b.provider_id,
            customer_id: b.customer_id,
            start: b.span.start,
            end: b.span.end,
            booked_at: b.booked_at,
            status: b.status,
            location: b.location.clone(),
            color: b.color.clone(),
            unavailability: b.unavailability,
        }
    }
}

/// Why a slot cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Starts at or before now.
    Past,
    /// Overlaps an active booking (takes precedence over `Past`).
    Conflict,
}

/// A generated slot annotated against the bookings of its day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub slot: Slot,
    pub available: bool,
    pub conflict: Option<Booking>,
    pub reason: Option<UnavailableReason>,
}

/// An office and its recurring weekly plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: Ulid,
    pub name: String,
    pub working_plan: WorkingPlan,
}

#[derive(Debug, Clone)]
pub struct OfficeState {
    pub id: Ulid,
    pub name: String,
    pub working_plan: WorkingPlan,
    /// All bookings (any status), sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl OfficeState {
    pub fn new(id: Ulid, name: String, working_plan: WorkingPlan) -> Self {
        Self {
            id,
            name,
            working_plan,
            bookings: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Office {
        Office {
            id: self.id,
            name: self.name.clone(),
            working_plan: self.working_plan.clone(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get_booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings (any status) whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn has_active_after(&self, now: Timestamp) -> bool {
        self.bookings
            .iter()
            .any(|b| b.is_active() && b.span.end > now)
    }
}

/// The event types: flat, no nesting beyond the payloads. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OfficeCreated {
        id: Ulid,
        name: String,
        working_plan: WorkingPlan,
    },
    OfficeRenamed {
        id: Ulid,
        name: String,
    },
    OfficeDeleted {
        id: Ulid,
    },
    WorkingPlanReplaced {
        office_id: Ulid,
        working_plan: WorkingPlan,
    },
    BookingPlaced {
        booking: Booking,
    },
    BookingRescheduled {
        id: Ulid,
        office_id: Ulid,
        span: Span,
    },
    BookingStatusChanged {
        id: Ulid,
        office_id: Ulid,
        status: BookingStatus,
    },
}

impl Event {
    /// The office an event belongs to.
    pub fn office_id(&self) -> Ulid {
        match self {
            Event::OfficeCreated { id, .. }
            | Event::OfficeRenamed { id, .. }
            | Event::OfficeDeleted { id } => *id,
            Event::WorkingPlanReplaced { office_id, .. }
            | Event::BookingRescheduled { office_id, .. }
            | Event::BookingStatusChanged { office_id, .. } => *office_id,
            Event::BookingPlaced { booking } => booking.office_id,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const DAY: (i32, u32, u32) = (2030, 1, 7);

    fn span(from: (u32, u32), to: (u32, u32)) -> Span {
        Span::new(at(DAY, from), at(DAY, to))
    }

    #[test]
    fn span_basics() {
        let s = span((9, 0), (9, 30));
        assert_eq!(s.duration(), Duration::minutes(30));
        assert!(s.contains_instant(at(DAY, (9, 0))));
        assert!(s.contains_instant(at(DAY, (9, 29))));
        assert!(!s.contains_instant(at(DAY, (9, 30)))); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = span((9, 0), (10, 0));
        let b = span((9, 30), (10, 30));
        let c = span((10, 0), (11, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_day_covers_midnight_to_midnight() {
        let d = Span::day(NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        assert_eq!(d.start, at(DAY, (0, 0)));
        assert_eq!(d.end, at((2030, 1, 8), (0, 0)));
    }

    #[test]
    fn only_cancelled_is_inactive() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::Completed.is_active());
        assert!(BookingStatus::NoShow.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn status_parse() {
        assert_eq!("no-show".parse::<BookingStatus>().unwrap(), BookingStatus::NoShow);
        assert_eq!("Canceled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("booked".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn new_booking_inverted_range_has_no_span() {
        let b = NewBooking::new(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            at(DAY, (10, 0)),
            at(DAY, (9, 30)),
            at(DAY, (8, 0)),
        );
        assert!(b.span().is_none());
    }

    #[test]
    fn booking_ordering() {
        let office = Ulid::new();
        let mut os = OfficeState::new(office, "Main".into(), WorkingPlan::default());
        os.insert_booking(booking(office, Ulid::new(), span((11, 0), (11, 30)), BookingStatus::Confirmed));
        os.insert_booking(booking(office, Ulid::new(), span((9, 0), (9, 30)), BookingStatus::Pending));
        os.insert_booking(booking(office, Ulid::new(), span((10, 0), (10, 30)), BookingStatus::Cancelled));
        assert_eq!(os.bookings[0].span.start, at(DAY, (9, 0)));
        assert_eq!(os.bookings[1].span.start, at(DAY, (10, 0)));
        assert_eq!(os.bookings[2].span.start, at(DAY, (11, 0)));
    }

    #[test]
    fn overlapping_skips_outside_window() {
        let office = Ulid::new();
        let mut os = OfficeState::new(office, "Main".into(), WorkingPlan::default());
        os.insert_booking(booking(office, Ulid::new(), span((8, 0), (9, 0)), BookingStatus::Confirmed));
        os.insert_booking(booking(office, Ulid::new(), span((9, 45), (10, 15)), BookingStatus::Confirmed));
        os.insert_booking(booking(office, Ulid::new(), span((12, 0), (13, 0)), BookingStatus::Confirmed));

        let query = span((9, 0), (11, 0));
        let hits: Vec<_> = os.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, span((9, 45), (10, 15)));
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let office = Ulid::new();
        let mut os = OfficeState::new(office, "Main".into(), WorkingPlan::default());
        os.insert_booking(booking(office, Ulid::new(), span((0, 0), (23, 0)), BookingStatus::Confirmed));
        let hits: Vec<_> = os.overlapping(&span((12, 0), (12, 30))).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn remove_booking_by_id() {
        let office = Ulid::new();
        let mut os = OfficeState::new(office, "Main".into(), WorkingPlan::default());
        let b = booking(office, Ulid::new(), span((9, 0), (9, 30)), BookingStatus::Confirmed);
        let id = b.id;
        os.insert_booking(b);
        assert!(os.remove_booking(Ulid::new()).is_none());
        assert_eq!(os.remove_booking(id).map(|b| b.id), Some(id));
        assert!(os.bookings.is_empty());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let office = Ulid::new();
        let event = Event::BookingPlaced {
            booking: booking(office, Ulid::new(), span((9, 0), (9, 30)), BookingStatus::Confirmed),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.office_id(), office);
    }
}
