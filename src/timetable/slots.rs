//! Day keys and the slot-number → clock-time table.
//!
//! Upstream addresses a lesson by a day key (weekday number for term
//! schedules, ISO date for session schedules) and a slot number. Both are
//! mapped onto explicit types here so nothing downstream has to reason about
//! raw strings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ScheduleMode;

/// Default slot table used by the upstream site (seven slots per day).
pub const DEFAULT_SLOT_TIMES: &str =
    "09:00-10:30,10:40-12:10,12:20-13:50,14:30-16:00,16:10-17:40,17:50-19:20,19:30-21:00";

const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Highest weekday number a term schedule may use (Saturday).
pub const MAX_TERM_WEEKDAY: u8 = 6;

/// The day component of a cell key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayKey {
    /// Recurring weekday, 1 = Monday .. 6 = Saturday.
    Weekday(u8),
    /// A specific calendar date (session schedules).
    Date(NaiveDate),
}

impl DayKey {
    /// Build a term weekday key, rejecting numbers outside `1..=6`.
    pub fn weekday(number: u8) -> Option<Self> {
        (1..=MAX_TERM_WEEKDAY)
            .contains(&number)
            .then_some(Self::Weekday(number))
    }

    /// Parse a day key as it appears in the upstream grid.
    ///
    /// Term grids use `"1"`..`"6"`, session grids use `"YYYY-MM-DD"`.
    pub fn from_grid_key(raw: &str, mode: ScheduleMode) -> Option<Self> {
        let raw = raw.trim();
        match mode {
            ScheduleMode::Term => raw.parse::<u8>().ok().and_then(Self::weekday),
            ScheduleMode::Session => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(Self::Date),
        }
    }

    /// Parse a projection key (`"monday"` or `"2025-06-10"`).
    pub fn from_projection_key(raw: &str) -> Option<Self> {
        if let Some(pos) = WEEKDAY_NAMES.iter().position(|name| *name == raw) {
            return Some(Self::Weekday(pos as u8 + 1));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(Self::Date)
    }

    /// Weekday number stored on the schedule row (1 = Monday).
    pub fn weekday_number(&self) -> i16 {
        match self {
            Self::Weekday(n) => i16::from(*n),
            Self::Date(date) => date.weekday().number_from_monday() as i16,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekday(n) => {
                // Stored rows may number Sunday as either 0 or 7.
                let index = if *n == 0 { 6 } else { usize::from(*n) - 1 };
                f.write_str(WEEKDAY_NAMES.get(index).copied().unwrap_or("unknown"))
            }
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_projection_key(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid day key: {raw:?}")))
    }
}

/// One diffable unit: a (day, slot) pair within a group's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub day: DayKey,
    pub slot: u8,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.day, self.slot)
    }
}

/// Clock times of a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTimes {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotTableError {
    #[error("slot table is empty")]
    Empty,
    #[error("slot {index} is malformed: {value:?}")]
    Malformed { index: usize, value: String },
    #[error("slot {index} ends before it starts")]
    Inverted { index: usize },
}

/// Mapping from upstream slot numbers (1-based) to clock times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    slots: BTreeMap<u8, SlotTimes>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::parse(DEFAULT_SLOT_TIMES).expect("default slot table is valid")
    }
}

impl SlotTable {
    /// Parse a comma separated list of `HH:MM-HH:MM` ranges, numbered from 1.
    pub fn parse(spec: &str) -> Result<Self, SlotTableError> {
        let mut slots = BTreeMap::new();
        for (i, part) in spec
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
        {
            let index = i + 1;
            let malformed = || SlotTableError::Malformed {
                index,
                value: part.to_string(),
            };
            let (start, end) = part.split_once('-').ok_or_else(malformed)?;
            let start = parse_clock(start).ok_or_else(malformed)?;
            let end = parse_clock(end).ok_or_else(malformed)?;
            if end <= start {
                return Err(SlotTableError::Inverted { index });
            }
            let number = u8::try_from(index).map_err(|_| malformed())?;
            slots.insert(number, SlotTimes { start, end });
        }

        if slots.is_empty() {
            return Err(SlotTableError::Empty);
        }
        Ok(Self { slots })
    }

    pub fn get(&self, slot: u8) -> Option<SlotTimes> {
        self.slots.get(&slot).copied()
    }

    /// Reverse lookup used when projecting persisted rows back into slots.
    pub fn slot_starting_at(&self, start: NaiveTime) -> Option<u8> {
        self.slots
            .iter()
            .find(|(_, times)| times.start == start)
            .map(|(number, _)| *number)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub(crate) fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn default_table_has_seven_slots() {
        let table = SlotTable::default();
        assert_eq!(table.len(), 7);
        assert_eq!(
            table.get(1),
            Some(SlotTimes {
                start: t(9, 0),
                end: t(10, 30)
            })
        );
        assert_eq!(table.get(7).unwrap().end, t(21, 0));
        assert_eq!(table.get(8), None);
        assert_eq!(table.get(0), None);
    }

    #[test]
    fn reverse_lookup_by_start() {
        let table = SlotTable::default();
        assert_eq!(table.slot_starting_at(t(14, 30)), Some(4));
        assert_eq!(table.slot_starting_at(t(14, 31)), None);
    }

    #[test]
    fn custom_table_with_evening_slot() {
        let table = SlotTable::parse("09:00-10:30, 21:10-22:40").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(2).unwrap().start, t(21, 10));
    }

    #[test]
    fn rejects_bad_tables() {
        assert_eq!(SlotTable::parse(""), Err(SlotTableError::Empty));
        assert!(matches!(
            SlotTable::parse("09:00"),
            Err(SlotTableError::Malformed { index: 1, .. })
        ));
        assert_eq!(
            SlotTable::parse("09:00-10:30,12:00-11:00"),
            Err(SlotTableError::Inverted { index: 2 })
        );
    }

    #[test]
    fn term_day_keys() {
        assert_eq!(
            DayKey::from_grid_key("1", ScheduleMode::Term),
            Some(DayKey::Weekday(1))
        );
        assert_eq!(DayKey::from_grid_key("7", ScheduleMode::Term), None);
        assert_eq!(DayKey::from_grid_key("0", ScheduleMode::Term), None);
        assert_eq!(
            DayKey::from_grid_key("2025-06-10", ScheduleMode::Term),
            None
        );
    }

    #[test]
    fn session_day_keys_keep_the_literal_date() {
        let key = DayKey::from_grid_key("2025-06-10", ScheduleMode::Session).unwrap();
        assert_eq!(
            key,
            DayKey::Date(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
        );
        assert_eq!(key.to_string(), "2025-06-10");
        // 2025-06-10 is a Tuesday
        assert_eq!(key.weekday_number(), 2);
        assert!(key.is_session());
    }

    #[test]
    fn projection_keys_round_trip_through_display() {
        for key in [
            DayKey::Weekday(1),
            DayKey::Weekday(6),
            DayKey::Date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()),
        ] {
            assert_eq!(DayKey::from_projection_key(&key.to_string()), Some(key));
        }
        assert_eq!(DayKey::Weekday(3).to_string(), "wednesday");
    }

    #[test]
    fn sunday_renders_from_either_numbering() {
        assert_eq!(DayKey::Weekday(0).to_string(), "sunday");
        assert_eq!(DayKey::Weekday(7).to_string(), "sunday");
        assert_eq!(DayKey::Weekday(1).to_string(), "monday");
        assert_eq!(DayKey::Weekday(9).to_string(), "unknown");
    }
}
