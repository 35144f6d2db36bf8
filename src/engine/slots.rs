use chrono::{Duration, NaiveDate, NaiveTime};

use crate::limits::{MAX_SLOT_MINUTES, MIN_SLOT_MINUTES};
use crate::model::*;
use crate::plan::{parse_clock, DayName, WorkingPlan};

use super::error::PlanError;
use super::overlap::overlaps;

// ── Slot generation ───────────────────────────────────────────────

/// Expand `plan` into the bookable slots of `date`, in chronological order.
///
/// Closed or missing days yield no slots. Slots tile the day's window from
/// its start; a trailing remainder shorter than one slot is dropped. Any slot
/// overlapping a break of that weekday is suppressed (touching is fine).
pub fn generate(plan: &WorkingPlan, date: NaiveDate) -> Result<Vec<Slot>, PlanError> {
    let day = DayName::of(date);
    let Some(schedule) = plan.open_day(day) else {
        return Ok(Vec::new());
    };

    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&plan.slot_duration) {
        return Err(PlanError::BadSlotDuration(plan.slot_duration));
    }
    let step = Duration::minutes(plan.slot_duration);

    let open = local_time(date, day, "start", &schedule.start)?;
    let close = local_time(date, day, "end", &schedule.end)?;
    if open >= close {
        return Err(PlanError::EmptyWindow { day });
    }
    let breaks = break_spans(plan, date, day)?;

    let mut slots = Vec::new();
    let mut current = open;
    while current + step <= close {
        let slot = Span::new(current, current + step);
        if !breaks.iter().any(|b| overlaps(&slot, b)) {
            slots.push(slot);
        }
        current = slot.end;
    }
    Ok(slots)
}

fn local_time(
    date: NaiveDate,
    day: DayName,
    field: &'static str,
    raw: &str,
) -> Result<Timestamp, PlanError> {
    let offset = parse_clock(raw).ok_or_else(|| PlanError::BadTime {
        day,
        field,
        value: raw.to_string(),
    })?;
    Ok(date.and_time(NaiveTime::MIN) + offset)
}

fn break_spans(plan: &WorkingPlan, date: NaiveDate, day: DayName) -> Result<Vec<Span>, PlanError> {
    plan.breaks_for(day)
        .iter()
        .enumerate()
        .map(|(index, b)| {
            let start = local_time(date, day, "break start", &b.start)?;
            let end = local_time(date, day, "break end", &b.end)?;
            if start >= end {
                return Err(PlanError::BadBreak { day, index });
            }
            Ok(Span::new(start, end))
        })
        .collect()
}
