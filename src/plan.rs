use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Weekday key of a working plan. Serialized as the lowercase English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayName {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayName {
    pub const ALL: [DayName; 7] = [
        DayName::Sunday,
        DayName::Monday,
        DayName::Tuesday,
        DayName::Wednesday,
        DayName::Thursday,
        DayName::Friday,
        DayName::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayName::Sunday => "sunday",
            DayName::Monday => "monday",
            DayName::Tuesday => "tuesday",
            DayName::Wednesday => "wednesday",
            DayName::Thursday => "thursday",
            DayName::Friday => "friday",
            DayName::Saturday => "saturday",
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }
}

impl From<Weekday> for DayName {
    fn from(w: Weekday) -> Self {
        match w {
            Weekday::Sun => DayName::Sunday,
            Weekday::Mon => DayName::Monday,
            Weekday::Tue => DayName::Tuesday,
            Weekday::Wed => DayName::Wednesday,
            Weekday::Thu => DayName::Thursday,
            Weekday::Fri => DayName::Friday,
            Weekday::Sat => DayName::Saturday,
        }
    }
}

impl fmt::Display for DayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DayName::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown weekday: {s}"))
    }
}

// Hand-written so map keys stay readable names in JSON and plain strings in bincode.
impl Serialize for DayName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DayName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Opening window for one weekday. Times are raw `"HH:MM"` strings and
/// are only parsed when slots are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl DaySchedule {
    pub fn open(start: &str, end: &str) -> Self {
        Self {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPeriod {
    pub start: String,
    pub end: String,
}

impl BreakPeriod {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

/// Recurring weekly template an office's slots are derived from.
///
/// A day missing from `days` is closed; a day missing from `breaks`
/// has no breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingPlan {
    /// Slot length in minutes.
    #[serde(alias = "time_slot_duration")]
    pub slot_duration: i64,
    #[serde(default)]
    pub days: BTreeMap<DayName, DaySchedule>,
    #[serde(default)]
    pub breaks: BTreeMap<DayName, Vec<BreakPeriod>>,
}

pub const DEFAULT_SLOT_MINUTES: i64 = 30;
pub const DEFAULT_OPEN: &str = "09:00";
pub const DEFAULT_CLOSE: &str = "18:00";
pub const DEFAULT_BREAK: (&str, &str) = ("15:00", "15:30");

impl Default for WorkingPlan {
    /// Every day open 09:00–18:00 with a 15:00–15:30 break, 30-minute slots.
    fn default() -> Self {
        let days = DayName::ALL
            .into_iter()
            .map(|d| (d, DaySchedule::open(DEFAULT_OPEN, DEFAULT_CLOSE)))
            .collect();
        let breaks = DayName::ALL
            .into_iter()
            .map(|d| (d, vec![BreakPeriod::new(DEFAULT_BREAK.0, DEFAULT_BREAK.1)]))
            .collect();
        Self {
            slot_duration: DEFAULT_SLOT_MINUTES,
            days,
            breaks,
        }
    }
}

impl WorkingPlan {
    /// A plan with no open days.
    pub fn closed(slot_duration: i64) -> Self {
        Self {
            slot_duration,
            days: BTreeMap::new(),
            breaks: BTreeMap::new(),
        }
    }

    pub fn with_day(mut self, day: DayName, schedule: DaySchedule) -> Self {
        self.days.insert(day, schedule);
        self
    }

    pub fn with_break(mut self, day: DayName, period: BreakPeriod) -> Self {
        self.breaks.entry(day).or_default().push(period);
        self
    }

    /// The enabled schedule for a weekday, if any.
    pub fn open_day(&self, day: DayName) -> Option<&DaySchedule> {
        self.days.get(&day).filter(|d| d.enabled)
    }

    pub fn breaks_for(&self, day: DayName) -> &[BreakPeriod] {
        self.breaks.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse a wall-clock `"HH:MM"` (or `"HH:MM:SS"`) into an offset from midnight.
/// `"24:00"` is accepted as the end of the day.
pub fn parse_clock(s: &str) -> Option<Duration> {
    let s = s.trim();
    if matches!(s, "24:00" | "24:00:00") {
        return Some(Duration::hours(24));
    }
    ["%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(|t| t - NaiveTime::MIN)
}
