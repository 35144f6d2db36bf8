use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{Booking, Span};

/// Filter for the overlap guard: active bookings overlapping `span` that
/// match every given key, minus `exclude`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapQuery {
    pub span: Span,
    pub provider_id: Option<Ulid>,
    pub customer_id: Option<Ulid>,
    pub office_id: Option<Ulid>,
    pub exclude: Option<Ulid>,
}

impl OverlapQuery {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            provider_id: None,
            customer_id: None,
            office_id: None,
            exclude: None,
        }
    }

    pub fn provider(mut self, id: Ulid) -> Self {
        self.provider_id = Some(id);
        self
    }

    pub fn customer(mut self, id: Ulid) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn office(mut self, id: Ulid) -> Self {
        self.office_id = Some(id);
        self
    }

    pub fn excluding(mut self, id: Ulid) -> Self {
        self.exclude = Some(id);
        self
    }

    /// Whether `booking` satisfies this query.
    pub fn matches(&self, booking: &Booking) -> bool {
        booking.is_active()
            && Some(booking.id) != self.exclude
            && self.provider_id.is_none_or(|p| booking.provider_id == p)
            && self.customer_id.is_none_or(|c| booking.customer_id == c)
            && self.office_id.is_none_or(|o| booking.office_id == o)
            && booking.span.overlaps(&self.span)
    }
}

/// Read side of booking storage, as seen by the scheduling core.
/// Every method returns only active (non-cancelled) bookings.
#[async_trait]
pub trait BookingLookup: Send + Sync {
    /// All active bookings at `office` overlapping the calendar day `date`,
    /// optionally narrowed to one provider. One bulk read.
    async fn office_bookings_on(
        &self,
        office_id: Ulid,
        date: NaiveDate,
        provider_id: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError>;

    async fn active_overlapping(&self, query: &OverlapQuery) -> Result<Vec<Booking>, EngineError>;
}
