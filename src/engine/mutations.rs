use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::plan::WorkingPlan;

use super::conflict::{validate_span, ExclusionScan};
use super::guard::{structural_violations, validate_booking, WriteMode};
use super::transform::transform;
use super::{Engine, EngineError, WalCommand};

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("office name too long"));
    }
    if name.trim().is_empty() {
        return Err(EngineError::Malformed("office name must not be blank".into()));
    }
    Ok(())
}

fn check_labels(candidate: &NewBooking) -> Result<(), EngineError> {
    for label in [&candidate.location, &candidate.color].into_iter().flatten() {
        if label.len() > MAX_LABEL_LEN {
            return Err(EngineError::LimitExceeded("label too long"));
        }
    }
    Ok(())
}

fn record_rejection(err: &EngineError) {
    for v in err.violations() {
        metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => v.label()).increment(1);
    }
}

impl Engine {
    // ── Offices ──────────────────────────────────────────────

    /// Create an office with the default working plan.
    pub async fn create_office(&self, id: Ulid, name: String) -> Result<Office, EngineError> {
        check_name(&name)?;
        let _commit = self.commit_lock.lock().await;
        if self.state.len() >= MAX_OFFICES {
            return Err(EngineError::LimitExceeded("too many offices"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let working_plan = WorkingPlan::default();
        let event = Event::OfficeCreated {
            id,
            name: name.clone(),
            working_plan: working_plan.clone(),
        };
        self.wal_append(&event).await?;
        let os = OfficeState::new(id, name, working_plan);
        let office = os.snapshot();
        self.state.insert(id, Arc::new(RwLock::new(os)));
        self.notify.send(id, &event);
        tracing::info!(office = %id, "office created");
        Ok(office)
    }

    pub async fn rename_office(&self, id: Ulid, name: String) -> Result<Office, EngineError> {
        check_name(&name)?;
        let _commit = self.commit_lock.lock().await;
        let os = self.get_office_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = os.write().await;
        let event = Event::OfficeRenamed { id, name };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.snapshot())
    }

    /// Delete an office. Refused while it still has active bookings that
    /// have not ended yet.
    pub async fn delete_office(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.commit_lock.lock().await;
        let os = self.get_office_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = os.write().await;
        if guard.has_active_after(self.now()) {
            return Err(EngineError::HasActiveBookings(id));
        }

        let event = Event::OfficeDeleted { id };
        self.wal_append(&event).await?;
        for b in &guard.bookings {
            self.booking_to_office.remove(&b.id);
        }
        drop(guard);
        self.state.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        tracing::info!(office = %id, "office deleted");
        Ok(())
    }

    // ── Working plans ────────────────────────────────────────

    /// Replace the office's plan wholesale. Time values are not checked here;
    /// a malformed plan surfaces when slots are generated.
    pub async fn replace_working_plan(
        &self,
        office_id: Ulid,
        working_plan: WorkingPlan,
    ) -> Result<Office, EngineError> {
        let _commit = self.commit_lock.lock().await;
        let os = self
            .get_office_state(&office_id)
            .ok_or(EngineError::NotFound(office_id))?;
        let mut guard = os.write().await;
        let event = Event::WorkingPlanReplaced { office_id, working_plan };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(office = %office_id, "working plan replaced");
        Ok(guard.snapshot())
    }

    /// Normalize a raw plan document (either break shape) and store it.
    pub async fn configure_working_plan(&self, office_id: Ulid, raw: &Value) -> Result<Office, EngineError> {
        let working_plan = transform(raw)?;
        self.replace_working_plan(office_id, working_plan).await
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Validate a new booking against every rule, then commit it.
    pub async fn place_booking(&self, candidate: NewBooking) -> Result<Booking, EngineError> {
        check_labels(&candidate)?;
        if !self.state.contains_key(&candidate.office_id) {
            return Err(EngineError::NotFound(candidate.office_id));
        }
        if let Err(e) = validate_booking(self, &candidate, self.now(), WriteMode::Create).await {
            record_rejection(&e);
            tracing::warn!(booking = %candidate.id, "booking rejected: {e}");
            return Err(e);
        }
        self.commit_booking(candidate).await
    }

    /// Commit path. Applies the structural rules, then re-checks the overlap
    /// rules against committed state while holding the commit lock, so two
    /// concurrent callers can never both land overlapping active bookings,
    /// even if neither ran the guard first.
    pub async fn commit_booking(&self, candidate: NewBooking) -> Result<Booking, EngineError> {
        let violations = structural_violations(&candidate, self.now(), WriteMode::Create);
        if !violations.is_empty() {
            let e = EngineError::Invalid(violations);
            record_rejection(&e);
            return Err(e);
        }
        let span = candidate
            .span()
            .ok_or_else(|| EngineError::Invalid(vec![super::Violation::EndNotAfterStart]))?;
        validate_span(&span)?;
        check_labels(&candidate)?;
        let office_id = candidate.office_id;
        let booking = candidate.into_booking(span);

        let _commit = self.commit_lock.lock().await;
        if self.booking_to_office.contains_key(&booking.id) {
            return Err(EngineError::AlreadyExists(booking.id));
        }
        if booking.is_active()
            && let Err(e) = self.enforce_exclusion(&booking).await
        {
            record_rejection(&e);
            tracing::warn!(booking = %booking.id, "commit refused: {e}");
            return Err(e);
        }

        let os = self
            .get_office_state(&office_id)
            .ok_or(EngineError::NotFound(office_id))?;
        let mut guard = os.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_OFFICE {
            return Err(EngineError::LimitExceeded("too many bookings on office"));
        }
        let event = Event::BookingPlaced {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_PLACED_TOTAL).increment(1);
        tracing::info!(booking = %booking.id, office = %office_id, "booking placed");
        Ok(booking)
    }

    /// Move an existing booking to a new interval. Past starts are allowed
    /// (update mode) but every other rule still applies.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Booking, EngineError> {
        let _commit = self.commit_lock.lock().await;
        let existing = self.get_booking(id).await.ok_or(EngineError::NotFound(id))?;
        let mut candidate = NewBooking::from(&existing);
        candidate.start = start;
        candidate.end = end;
        if let Err(e) = validate_booking(self, &candidate, self.now(), WriteMode::Update).await {
            record_rejection(&e);
            return Err(e);
        }
        let span = candidate
            .span()
            .ok_or_else(|| EngineError::Invalid(vec![super::Violation::EndNotAfterStart]))?;
        validate_span(&span)?;
        let moved = Booking { span, ..existing };

        if moved.is_active() {
            self.enforce_exclusion(&moved).await.inspect_err(record_rejection)?;
        }
        let mut guard = self.resolve_booking_write(&id).await?;
        let event = Event::BookingRescheduled {
            id,
            office_id: moved.office_id,
            span,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(booking = %id, "booking rescheduled");
        Ok(moved)
    }

    /// Change a booking's status. Reactivating a cancelled booking re-runs
    /// the overlap rules, since its interval may have been taken meanwhile.
    pub async fn set_status(&self, id: Ulid, status: BookingStatus) -> Result<Booking, EngineError> {
        let _commit = self.commit_lock.lock().await;
        let existing = self.get_booking(id).await.ok_or(EngineError::NotFound(id))?;
        if existing.status == status {
            return Ok(existing);
        }
        let was_active = existing.is_active();
        let updated = Booking { status, ..existing };
        if !was_active && updated.is_active() {
            self.enforce_exclusion(&updated).await.inspect_err(record_rejection)?;
        }

        let mut guard = self.resolve_booking_write(&id).await?;
        let event = Event::BookingStatusChanged {
            id,
            office_id: updated.office_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(booking = %id, status = status.as_str(), "booking status changed");
        Ok(updated)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.set_status(id, BookingStatus::Cancelled).await
    }

    /// Scan every office for active bookings that overlap `candidate` on a
    /// shared provider, customer or office. Caller holds the commit lock.
    async fn enforce_exclusion(&self, candidate: &Booking) -> Result<(), EngineError> {
        let mut scan = ExclusionScan::default();
        for os in self.office_handles() {
            let guard = os.read().await;
            scan.visit(&guard, candidate);
        }
        scan.into_result()
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No write can land between snapshot and swap.
        let _commit = self.commit_lock.lock().await;
        let mut events = Vec::new();
        for os in self.office_handles() {
            let guard = os.read().await;
            events.push(Event::OfficeCreated {
                id: guard.id,
                name: guard.name.clone(),
                working_plan: guard.working_plan.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingPlaced {
                    booking: booking.clone(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
