use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::limits::MAX_BREAKS_PER_DAY;
use crate::plan::{BreakPeriod, DayName, DaySchedule, WorkingPlan};

use super::EngineError;

/// Value of a day's `enabled` field that means "open".
pub const ENABLED_MARKER: &str = "1";

/// Breaks for one day as submitted: a list of pairs, or a keyed collection
/// of pairs (form fields like `breaks[monday][0][start]`).
#[derive(Debug, Clone, Copy)]
enum BreakInput<'a> {
    List(&'a [Value]),
    Keyed(&'a Map<String, Value>),
    Absent,
}

impl<'a> From<Option<&'a Value>> for BreakInput<'a> {
    fn from(v: Option<&'a Value>) -> Self {
        match v {
            Some(Value::Array(items)) => BreakInput::List(items),
            Some(Value::Object(map)) => BreakInput::Keyed(map),
            _ => BreakInput::Absent,
        }
    }
}

impl BreakInput<'_> {
    /// Canonical ordered list. Keyed input keeps the map's key order.
    fn into_periods(self, day: DayName) -> Result<Vec<BreakPeriod>, EngineError> {
        let entries: Vec<&Value> = match self {
            BreakInput::List(items) => items.iter().collect(),
            BreakInput::Keyed(map) => map.values().collect(),
            BreakInput::Absent => return Ok(Vec::new()),
        };
        if entries.len() > MAX_BREAKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many breaks in one day"));
        }
        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let pair = entry
                    .as_object()
                    .ok_or_else(|| EngineError::Malformed(format!("{day} break #{i} is not an object")))?;
                Ok(BreakPeriod {
                    start: text(pair.get("start")),
                    end: text(pair.get("end")),
                })
            })
            .collect()
    }
}

/// Normalize loosely-typed working plan input (e.g. decoded form params)
/// into a [`WorkingPlan`].
///
/// Only the shape is normalized. Times are copied through untouched and are
/// checked when slots are generated.
pub fn transform(raw: &Value) -> Result<WorkingPlan, EngineError> {
    let root = raw
        .get("working_plan")
        .filter(|v| v.is_object())
        .unwrap_or(raw)
        .as_object()
        .ok_or_else(|| EngineError::Malformed("working plan must be an object".into()))?;

    let slot_duration = coerce_int(root.get("time_slot_duration").or_else(|| root.get("slot_duration")));
    let raw_days = root.get("days").and_then(Value::as_object);
    let raw_breaks = root.get("breaks").and_then(Value::as_object);

    let mut days = BTreeMap::new();
    let mut breaks = BTreeMap::new();
    for day in DayName::ALL {
        if let Some(entry) = raw_days
            .and_then(|m| day_entry(m, day))
            .filter(|v| !v.is_null())
        {
            let fields = entry
                .as_object()
                .ok_or_else(|| EngineError::Malformed(format!("{day} is not an object")))?;
            days.insert(
                day,
                DaySchedule {
                    enabled: is_enabled(fields.get("enabled")),
                    start: text(fields.get("start")),
                    end: text(fields.get("end")),
                },
            );
        }
        let input = BreakInput::from(raw_breaks.and_then(|m| day_entry(m, day)));
        breaks.insert(day, input.into_periods(day)?);
    }

    Ok(WorkingPlan {
        slot_duration,
        days,
        breaks,
    })
}

fn day_entry(map: &Map<String, Value>, day: DayName) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(day.as_str()))
        .map(|(_, v)| v)
}

fn is_enabled(v: Option<&Value>) -> bool {
    match v {
        Some(Value::String(s)) => s == ENABLED_MARKER,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Leading-integer coercion: `"45"`, `" 45min"` and `45.9` become 45;
/// anything without leading digits becomes 0.
fn coerce_int(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(duration: Value, days: Value, breaks: Value) -> Value {
        json!({
            "working_plan": {
                "time_slot_duration": duration,
                "days": days,
                "breaks": breaks,
            }
        })
    }

    #[test]
    fn basic_days_and_duration() {
        let plan = transform(&params(
            json!("30"),
            json!({
                "monday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "tuesday": { "enabled": "1", "start": "10:00", "end": "18:00" },
                "wednesday": { "enabled": "0", "start": "09:00", "end": "17:00" },
            }),
            json!({ "monday": [], "tuesday": [], "wednesday": [] }),
        ))
        .unwrap();

        assert_eq!(plan.slot_duration, 30);
        assert_eq!(plan.days[&DayName::Monday], DaySchedule::open("09:00", "17:00"));
        assert_eq!(plan.days[&DayName::Tuesday], DaySchedule::open("10:00", "18:00"));
        assert!(!plan.days[&DayName::Wednesday].enabled);
        assert_eq!(plan.days.len(), 3);
    }

    #[test]
    fn absent_days_are_omitted_but_every_day_has_breaks() {
        let plan = transform(&params(
            json!("30"),
            json!({ "monday": { "enabled": "1", "start": "09:00", "end": "17:00" } }),
            json!({ "monday": null }),
        ))
        .unwrap();
        assert_eq!(plan.days.keys().copied().collect::<Vec<_>>(), vec![DayName::Monday]);
        assert_eq!(plan.breaks.len(), 7);
        assert!(plan.breaks.values().all(Vec::is_empty));
    }

    #[test]
    fn breaks_as_list() {
        let plan = transform(&params(
            json!("30"),
            json!({ "monday": { "enabled": "1", "start": "09:00", "end": "17:00" } }),
            json!({ "monday": [
                { "start": "12:00", "end": "13:00" },
                { "start": "15:00", "end": "15:30" },
            ] }),
        ))
        .unwrap();
        assert_eq!(
            plan.breaks_for(DayName::Monday),
            &[BreakPeriod::new("12:00", "13:00"), BreakPeriod::new("15:00", "15:30")]
        );
    }

    #[test]
    fn list_and_keyed_breaks_normalize_identically() {
        let days = json!({ "monday": { "enabled": "1", "start": "09:00", "end": "17:00" } });
        let as_list = transform(&params(
            json!("30"),
            days.clone(),
            json!({ "monday": [
                { "start": "12:00", "end": "13:00" },
                { "start": "15:00", "end": "15:30" },
            ] }),
        ))
        .unwrap();
        let as_keyed = transform(&params(
            json!("30"),
            days,
            json!({ "monday": {
                "0": { "start": "12:00", "end": "13:00" },
                "1": { "start": "15:00", "end": "15:30" },
            } }),
        ))
        .unwrap();
        assert_eq!(as_list, as_keyed);
    }

    #[test]
    fn keyed_breaks_keep_submission_order() {
        let plan = transform(&params(
            json!(30),
            json!({}),
            json!({ "friday": {
                "2": { "start": "08:00", "end": "08:15" },
                "10": { "start": "11:00", "end": "11:15" },
                "1": { "start": "14:00", "end": "14:15" },
            } }),
        ))
        .unwrap();
        let starts: Vec<_> = plan.breaks_for(DayName::Friday).iter().map(|b| b.start.as_str()).collect();
        assert_eq!(starts, vec!["08:00", "11:00", "14:00"]);
    }

    #[test]
    fn all_seven_days() {
        let plan = transform(&params(
            json!("45"),
            json!({
                "sunday": { "enabled": "1", "start": "10:00", "end": "14:00" },
                "monday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "tuesday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "wednesday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "thursday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "friday": { "enabled": "1", "start": "09:00", "end": "17:00" },
                "saturday": { "enabled": "0", "start": "00:00", "end": "00:00" },
            }),
            json!({}),
        ))
        .unwrap();
        assert_eq!(plan.slot_duration, 45);
        assert_eq!(plan.days.len(), 7);
        assert!(plan.days[&DayName::Sunday].enabled);
        assert!(!plan.days[&DayName::Saturday].enabled);
    }

    #[test]
    fn mixed_break_shapes_across_days() {
        let plan = transform(&params(
            json!("30"),
            json!({
                "monday": { "enabled": "1", "start": "09:00", "end": "18:00" },
                "wednesday": { "enabled": "1", "start": "08:00", "end": "16:00" },
                "friday": { "enabled": "0", "start": "00:00", "end": "00:00" },
            }),
            json!({
                "monday": [
                    { "start": "12:00", "end": "13:00" },
                    { "start": "15:00", "end": "15:15" },
                ],
                "wednesday": { "0": { "start": "10:00", "end": "10:30" } },
                "friday": [],
            }),
        ))
        .unwrap();
        assert_eq!(plan.breaks_for(DayName::Monday).len(), 2);
        assert_eq!(plan.breaks_for(DayName::Wednesday), &[BreakPeriod::new("10:00", "10:30")]);
        assert!(plan.breaks_for(DayName::Friday).is_empty());
        assert!(!plan.days[&DayName::Friday].enabled);
    }

    #[test]
    fn enabled_flag_variants() {
        let plan = transform(&json!({
            "time_slot_duration": 30,
            "days": {
                "monday": { "enabled": true, "start": "09:00", "end": "12:00" },
                "tuesday": { "enabled": "true", "start": "09:00", "end": "12:00" },
                "wednesday": { "enabled": 1, "start": "09:00", "end": "12:00" },
                "thursday": { "start": "09:00", "end": "12:00" },
            }
        }))
        .unwrap();
        assert!(plan.days[&DayName::Monday].enabled);
        assert!(!plan.days[&DayName::Tuesday].enabled);
        assert!(plan.days[&DayName::Wednesday].enabled);
        assert!(!plan.days[&DayName::Thursday].enabled);
    }

    #[test]
    fn day_keys_are_case_insensitive() {
        let plan = transform(&json!({
            "time_slot_duration": "15",
            "days": { "Monday": { "enabled": "1", "start": "09:00", "end": "10:00" } },
            "breaks": { "MONDAY": [{ "start": "09:15", "end": "09:30" }] }
        }))
        .unwrap();
        assert!(plan.open_day(DayName::Monday).is_some());
        assert_eq!(plan.breaks_for(DayName::Monday).len(), 1);
    }

    #[test]
    fn duration_coercion() {
        assert_eq!(coerce_int(Some(&json!("60"))), 60);
        assert_eq!(coerce_int(Some(&json!(" 45min"))), 45);
        assert_eq!(coerce_int(Some(&json!("-5"))), -5);
        assert_eq!(coerce_int(Some(&json!(20.7))), 20);
        assert_eq!(coerce_int(Some(&json!("abc"))), 0);
        assert_eq!(coerce_int(Some(&Value::Null)), 0);
        assert_eq!(coerce_int(None), 0);
    }

    #[test]
    fn times_are_not_validated() {
        let plan = transform(&json!({
            "time_slot_duration": "30",
            "days": { "monday": { "enabled": "1", "start": "whenever" } }
        }))
        .unwrap();
        let monday = &plan.days[&DayName::Monday];
        assert_eq!(monday.start, "whenever");
        assert_eq!(monday.end, "");
    }

    #[test]
    fn null_day_is_treated_as_absent() {
        let plan = transform(&json!({
            "time_slot_duration": 30,
            "days": {
                "monday": null,
                "tuesday": { "enabled": "1", "start": "09:00", "end": "12:00" }
            }
        }))
        .unwrap();
        assert!(!plan.days.contains_key(&DayName::Monday));
        assert!(plan.days[&DayName::Tuesday].enabled);
        assert!(plan.breaks[&DayName::Monday].is_empty());
    }

    #[test]
    fn non_object_inputs_are_malformed() {
        assert!(matches!(transform(&json!([1, 2])), Err(EngineError::Malformed(_))));
        assert!(matches!(
            transform(&json!({ "days": { "monday": "open" } })),
            Err(EngineError::Malformed(_))
        ));
        assert!(matches!(
            transform(&json!({ "breaks": { "monday": ["12:00-13:00"] } })),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn too_many_breaks_hit_the_limit() {
        let many: Vec<Value> = (0..=MAX_BREAKS_PER_DAY)
            .map(|_| json!({ "start": "10:00", "end": "10:05" }))
            .collect();
        let result = transform(&json!({ "breaks": { "monday": many } }));
        assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    }
}
