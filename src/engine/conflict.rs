use ulid::Ulid;

use crate::limits::MAX_BOOKING_MINUTES;
use crate::model::*;

use super::error::Violation;
use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.duration() > chrono::Duration::minutes(MAX_BOOKING_MINUTES) {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    Ok(())
}

/// First active booking found per overlap class while scanning committed
/// state. Fed one office at a time so the caller can hold a single read lock.
#[derive(Debug, Default)]
pub(crate) struct ExclusionScan {
    provider: Option<Ulid>,
    customer: Option<Ulid>,
    office: Option<Ulid>,
}

impl ExclusionScan {
    pub(crate) fn visit(&mut self, os: &OfficeState, candidate: &Booking) {
        for existing in os.overlapping(&candidate.span) {
            if !existing.is_active() || existing.id == candidate.id {
                continue;
            }
            if self.provider.is_none() && existing.provider_id == candidate.provider_id {
                self.provider = Some(existing.id);
            }
            if self.customer.is_none() && existing.customer_id == candidate.customer_id {
                self.customer = Some(existing.id);
            }
            if self.office.is_none() && existing.office_id == candidate.office_id {
                self.office = Some(existing.id);
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<(), EngineError> {
        let violations: Vec<Violation> = [
            self.provider.map(Violation::ProviderOverlap),
            self.customer.map(Violation::CustomerOverlap),
            self.office.map(Violation::OfficeOverlap),
        ]
        .into_iter()
        .flatten()
        .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Invalid(violations))
        }
    }
}
