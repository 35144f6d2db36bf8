use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::lookup::{BookingLookup, OverlapQuery};
use crate::model::*;
use crate::observability;

use super::availability;
use super::slots::generate;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_office(&self, id: Ulid) -> Option<Office> {
        let os = self.get_office_state(&id)?;
        let guard = os.read().await;
        Some(guard.snapshot())
    }

    /// All offices, ordered by id.
    pub async fn list_offices(&self) -> Vec<Office> {
        let mut offices = Vec::with_capacity(self.state.len());
        for os in self.office_handles() {
            offices.push(os.read().await.snapshot());
        }
        offices.sort_by_key(|o| o.id);
        offices
    }

    /// Bookable slots of `date` under the office's current plan.
    pub async fn generate_slots(&self, office_id: Ulid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        let office = self.get_office(office_id).await.ok_or(EngineError::NotFound(office_id))?;
        let slots = generate(&office.working_plan, date)?;
        metrics::histogram!(observability::SLOTS_GENERATED).record(slots.len() as f64);
        tracing::debug!(office = %office_id, %date, "generated {} slots", slots.len());
        Ok(slots)
    }

    /// Every slot of `date`, annotated with whether it can still be booked,
    /// for one provider or the whole office.
    pub async fn compute_availability(
        &self,
        office_id: Ulid,
        date: NaiveDate,
        provider_id: Option<Ulid>,
    ) -> Result<Vec<SlotAvailability>, EngineError> {
        let office = self.get_office(office_id).await.ok_or(EngineError::NotFound(office_id))?;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let slots =
            availability::compute_availability(self, &office, date, provider_id, self.now()).await?;
        metrics::histogram!(observability::SLOTS_GENERATED).record(slots.len() as f64);
        tracing::debug!(
            office = %office_id,
            %date,
            "{} of {} slots available",
            slots.iter().filter(|s| s.available).count(),
            slots.len()
        );
        Ok(slots)
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let office_id = self.office_for_booking(&id)?;
        let os = self.get_office_state(&office_id)?;
        let guard = os.read().await;
        guard.get_booking(id).cloned()
    }

    /// Bookings of any status overlapping the calendar day `date`.
    pub async fn bookings_on(&self, office_id: Ulid, date: NaiveDate) -> Result<Vec<Booking>, EngineError> {
        let os = self
            .get_office_state(&office_id)
            .ok_or(EngineError::NotFound(office_id))?;
        let guard = os.read().await;
        Ok(guard.overlapping(&Span::day(date)).cloned().collect())
    }

    /// Active bookings starting strictly after `now`, soonest first.
    pub async fn upcoming(&self, office_id: Ulid, now: Timestamp) -> Result<Vec<Booking>, EngineError> {
        self.office_bookings_where(office_id, |b| b.is_active() && b.span.start > now)
            .await
    }

    /// Bookings of any status that started at or before `now`, oldest first.
    pub async fn past(&self, office_id: Ulid, now: Timestamp) -> Result<Vec<Booking>, EngineError> {
        self.office_bookings_where(office_id, |b| b.span.start <= now).await
    }

    /// Every booking of `provider_id` across all offices, by start.
    pub async fn provider_bookings(&self, provider_id: Ulid) -> Vec<Booking> {
        let mut out = Vec::new();
        for os in self.office_handles() {
            let guard = os.read().await;
            out.extend(guard.bookings.iter().filter(|b| b.provider_id == provider_id).cloned());
        }
        out.sort_by_key(|b| b.span.start);
        out
    }

    async fn office_bookings_where(
        &self,
        office_id: Ulid,
        keep: impl Fn(&Booking) -> bool,
    ) -> Result<Vec<Booking>, EngineError> {
        let os = self
            .get_office_state(&office_id)
            .ok_or(EngineError::NotFound(office_id))?;
        let guard = os.read().await;
        Ok(guard.bookings.iter().filter(|b| keep(b)).cloned().collect())
    }
}

#[async_trait]
impl BookingLookup for Engine {
    async fn office_bookings_on(
        &self,
        office_id: Ulid,
        date: NaiveDate,
        provider_id: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        let Some(os) = self.get_office_state(&office_id) else {
            return Ok(Vec::new());
        };
        let guard = os.read().await;
        Ok(guard
            .overlapping(&Span::day(date))
            .filter(|b| b.is_active() && provider_id.is_none_or(|p| b.provider_id == p))
            .cloned()
            .collect())
    }

    async fn active_overlapping(&self, query: &OverlapQuery) -> Result<Vec<Booking>, EngineError> {
        let handles: Vec<_> = match query.office_id {
            Some(id) => self.get_office_state(&id).into_iter().collect(),
            None => self.office_handles(),
        };
        let mut hits = Vec::new();
        for os in handles {
            let guard = os.read().await;
            hits.extend(guard.overlapping(&query.span).filter(|b| query.matches(b)).cloned());
        }
        Ok(hits)
    }
}
