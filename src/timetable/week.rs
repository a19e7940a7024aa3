//! The per-group projection served to readers and compared by the diff.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::normalize::Lesson;
use super::slots::{CellKey, DayKey, MAX_TERM_WEEKDAY, SlotTable};
use super::ScheduleMode;
use crate::data::models::ScheduleData;
use crate::utils::sort_case_insensitive;

/// Summary of one lesson as shown to readers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub subject: String,
    pub teachers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rooms: Vec<String>,
    pub location: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl From<&Lesson> for Pair {
    fn from(lesson: &Lesson) -> Self {
        Self {
            subject: lesson.subject.clone(),
            teachers: lesson.teachers.clone(),
            start_date: lesson.start_date,
            end_date: lesson.end_date,
            rooms: lesson.rooms.clone(),
            location: lesson.location.clone(),
            kind: lesson.kind.clone(),
            link: lesson.link.clone(),
        }
    }
}

impl From<&ScheduleData> for Pair {
    fn from(row: &ScheduleData) -> Self {
        let mut teachers = row.teachers.clone();
        let mut rooms = row.rooms.clone();
        sort_case_insensitive(&mut teachers);
        sort_case_insensitive(&mut rooms);
        Self {
            subject: row.subject.clone(),
            teachers,
            start_date: row.start_date,
            end_date: row.end_date,
            rooms,
            location: row.location.clone(),
            kind: row.kind.clone(),
            link: row.link.clone(),
        }
    }
}

/// Lessons of one day, bucketed by slot number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Day {
    pub slots: BTreeMap<u8, Vec<Pair>>,
}

/// A group's schedule for one mode, keyed by weekday name or ISO date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Week {
    pub days: BTreeMap<DayKey, Day>,
}

impl Week {
    /// An empty week; term weeks list monday..saturday even when empty.
    pub fn empty(mode: ScheduleMode) -> Self {
        let mut week = Self::default();
        if mode == ScheduleMode::Term {
            for n in 1..=MAX_TERM_WEEKDAY {
                week.days.insert(DayKey::Weekday(n), Day::default());
            }
        }
        week
    }

    /// Bucket persisted rows by day key and slot.
    ///
    /// Rows whose start time matches no slot, or whose weekday is out of
    /// range for a term schedule, are left out.
    pub fn from_rows(rows: &[ScheduleData], mode: ScheduleMode, slots: &SlotTable) -> Self {
        let mut week = Self::empty(mode);
        for row in rows.iter().filter(|r| r.is_session == mode.is_session()) {
            let day = match mode {
                ScheduleMode::Term => u8::try_from(row.weekday).ok().and_then(DayKey::weekday),
                ScheduleMode::Session => Some(DayKey::Date(row.start_date)),
            };
            let Some(day) = day else {
                trace!(id = %row.id, weekday = row.weekday, "Row weekday outside term range");
                continue;
            };
            let Some(slot) = slots.slot_starting_at(row.start_time) else {
                trace!(id = %row.id, start = %row.start_time, "Row start matches no slot");
                continue;
            };
            week.days
                .entry(day)
                .or_default()
                .slots
                .entry(slot)
                .or_default()
                .push(Pair::from(row));
        }
        week
    }

    /// Pairs of one cell; empty if the cell is absent.
    pub fn pairs(&self, cell: CellKey) -> &[Pair] {
        self.days
            .get(&cell.day)
            .and_then(|day| day.slots.get(&cell.slot))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every non-empty cell.
    pub fn cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.days.iter().flat_map(|(day, d)| {
            d.slots
                .iter()
                .filter(|(_, pairs)| !pairs.is_empty())
                .map(move |(slot, _)| CellKey {
                    day: *day,
                    slot: *slot,
                })
        })
    }

    pub fn pair_count(&self) -> usize {
        self.days
            .values()
            .flat_map(|d| d.slots.values())
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use uuid::Uuid;

    use super::*;

    fn row(weekday: i16, start: (u32, u32), is_session: bool, date: NaiveDate) -> ScheduleData {
        let start_time = NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap();
        ScheduleData {
            id: Uuid::new_v4(),
            group: "221-352".into(),
            subject: "Физика".into(),
            kind: "Лекция".into(),
            location: "Автозаводская".into(),
            start_time,
            end_time: start_time + chrono::TimeDelta::minutes(90),
            start_date: date,
            end_date: date,
            weekday,
            link: None,
            is_session,
            teachers: vec!["b b".into(), "A A".into()],
            rooms: vec!["101".into()],
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn term_week_lists_all_six_days() {
        let week = Week::from_rows(&[], ScheduleMode::Term, &SlotTable::default());
        assert_eq!(week.days.len(), 6);
        assert_eq!(week.pair_count(), 0);
        assert_eq!(week.cells().count(), 0);
        assert!(Week::empty(ScheduleMode::Session).days.is_empty());
    }

    #[test]
    fn rows_land_in_their_cells() {
        let rows = vec![
            row(1, (10, 40), false, d(2025, 2, 1)),
            row(1, (11, 11), false, d(2025, 2, 1)),
            row(3, (9, 0), true, d(2025, 6, 11)),
        ];
        let week = Week::from_rows(&rows, ScheduleMode::Term, &SlotTable::default());
        let cell = CellKey {
            day: DayKey::Weekday(1),
            slot: 2,
        };
        assert_eq!(week.pairs(cell).len(), 1);
        assert_eq!(week.pairs(cell)[0].teachers, vec!["A A", "b b"]);
        // unmapped start time and session row are both excluded
        assert_eq!(week.pair_count(), 1);
    }

    #[test]
    fn session_rows_key_by_date() {
        let rows = vec![row(2, (9, 0), true, d(2025, 6, 10))];
        let week = Week::from_rows(&rows, ScheduleMode::Session, &SlotTable::default());
        let keys: Vec<_> = week.cells().collect();
        assert_eq!(
            keys,
            vec![CellKey {
                day: DayKey::Date(d(2025, 6, 10)),
                slot: 1
            }]
        );
    }

    #[test]
    fn serializes_with_named_days_and_slot_numbers() {
        let rows = vec![row(1, (9, 0), false, d(2025, 2, 1))];
        let week = Week::from_rows(&rows, ScheduleMode::Term, &SlotTable::default());
        let json = serde_json::to_value(&week).unwrap();
        assert_eq!(json["monday"]["1"][0]["subject"], "Физика");
        assert_eq!(json["monday"]["1"][0]["type"], "Лекция");
        assert_eq!(json["monday"]["1"][0]["startDate"], "2025-02-01");
        assert!(json["saturday"].as_object().unwrap().is_empty());

        let back: Week = serde_json::from_value(json).unwrap();
        assert_eq!(back, week);
    }
}
