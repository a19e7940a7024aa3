//! Turns the loosely typed upstream grid into canonical [`Lesson`]s.
//!
//! Normalization never fails as a whole: anything that cannot be mapped is
//! reported as a [`NormalizeIssue`] and the rest of the grid is kept.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use html_scraper::{Html, Selector};
use regex::Regex;

use super::slots::{CellKey, DayKey, SlotTable};
use super::ScheduleMode;
use crate::upstream::{RawAuditory, RawGrid, RawLesson};
use crate::utils::{collapse_whitespace, sort_case_insensitive};

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{1F300}-\x{1F5FF}\x{1F600}-\x{1F64F}\x{1F680}-\x{1F6FF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]")
        .expect("emoji pattern is valid")
});

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector is valid"));

const MONTHS: [&str; 12] = [
    "янв", "фев", "мар", "апр", "май", "июн", "июл", "авг", "сен", "окт", "ноя", "дек",
];

/// One lesson in canonical form, ready to be diffed and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub subject: String,
    /// Full teacher names, sorted case-insensitively.
    pub teachers: Vec<String>,
    /// Room labels, sorted case-insensitively.
    pub rooms: Vec<String>,
    pub location: String,
    pub kind: String,
    pub link: Option<String>,
    pub slot: u8,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub day: DayKey,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Lesson {
    pub fn cell(&self) -> CellKey {
        CellKey {
            day: self.day,
            slot: self.slot,
        }
    }

    pub fn is_session(&self) -> bool {
        self.day.is_session()
    }
}

/// Something in the grid that could not be mapped onto a lesson.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeIssue {
    #[error("unknown day key {day:?}")]
    UnknownDay { day: String },
    #[error("unknown slot {slot:?} on {day}")]
    UnknownSlot { day: DayKey, slot: String },
    #[error("unparseable date {value:?} in {cell}")]
    BadDate { cell: CellKey, value: String },
    #[error("unparseable teacher name {name:?} in {cell}")]
    UnparseableTeacher { cell: CellKey, name: String },
}

impl NormalizeIssue {
    /// Cell that must not be reconciled this pass, if any.
    ///
    /// A bad date drops the lesson (term) or moves it to the column date
    /// (session). A dropped teacher name is never stored, so it does not count.
    pub fn unsettled_cell(&self) -> Option<CellKey> {
        match self {
            Self::BadDate { cell, .. } => Some(*cell),
            Self::UnknownDay { .. } | Self::UnknownSlot { .. } | Self::UnparseableTeacher { .. } => {
                None
            }
        }
    }
}

/// A normalized grid: lessons bucketed by cell, plus everything skipped.
#[derive(Debug, Default)]
pub struct NormalizedGrid {
    pub cells: BTreeMap<CellKey, Vec<Lesson>>,
    pub issues: Vec<NormalizeIssue>,
}

impl NormalizedGrid {
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.cells.values().flatten()
    }

    pub fn lesson_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Cells that must be left alone this pass, see
    /// [`NormalizeIssue::unsettled_cell`].
    pub fn unsettled_cells(&self) -> BTreeSet<CellKey> {
        self.issues
            .iter()
            .filter_map(NormalizeIssue::unsettled_cell)
            .collect()
    }
}

/// Normalize a whole upstream grid.
///
/// `year` is used for session dates that carry only a day and month.
pub fn normalize(grid: &RawGrid, mode: ScheduleMode, slots: &SlotTable, year: i32) -> NormalizedGrid {
    let mut out = NormalizedGrid::default();

    for (raw_day, day_slots) in grid {
        let Some(day) = DayKey::from_grid_key(raw_day, mode) else {
            if day_slots.values().any(|lessons| !lessons.is_empty()) {
                out.issues.push(NormalizeIssue::UnknownDay {
                    day: raw_day.clone(),
                });
            }
            continue;
        };

        for (raw_slot, lessons) in day_slots {
            if lessons.is_empty() {
                continue;
            }
            let Some((slot, times)) = raw_slot
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(|n| slots.get(n).map(|t| (n, t)))
            else {
                out.issues.push(NormalizeIssue::UnknownSlot {
                    day,
                    slot: raw_slot.clone(),
                });
                continue;
            };

            let cell = CellKey { day, slot };
            for raw in lessons {
                let Some((start_date, end_date)) = lesson_dates(raw, day, year, cell, &mut out.issues)
                else {
                    continue;
                };
                // Stored session rows are read back by their date, so key by it too.
                let day = match day {
                    DayKey::Date(_) => DayKey::Date(start_date),
                    weekday => weekday,
                };
                let cell = CellKey { day, slot };

                let lesson = Lesson {
                    subject: collapse_whitespace(&raw.sbj),
                    teachers: teacher_names(&raw.teacher, cell, &mut out.issues),
                    rooms: room_labels(&raw.auditories),
                    location: collapse_whitespace(&raw.location),
                    kind: collapse_whitespace(&raw.kind),
                    link: lesson_link(raw),
                    slot,
                    start_time: times.start,
                    end_time: times.end,
                    day,
                    start_date,
                    end_date,
                };
                out.cells.entry(cell).or_default().push(lesson);
            }
        }
    }

    out
}

fn lesson_dates(
    raw: &RawLesson,
    day: DayKey,
    year: i32,
    cell: CellKey,
    issues: &mut Vec<NormalizeIssue>,
) -> Option<(NaiveDate, NaiveDate)> {
    match day {
        DayKey::Weekday(_) => {
            let parse = |value: &str| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok();
            match (parse(&raw.df), parse(&raw.dt)) {
                (Some(from), Some(to)) => Some((from, to)),
                (None, _) => {
                    issues.push(NormalizeIssue::BadDate {
                        cell,
                        value: raw.df.clone(),
                    });
                    None
                }
                (_, None) => {
                    issues.push(NormalizeIssue::BadDate {
                        cell,
                        value: raw.dt.clone(),
                    });
                    None
                }
            }
        }
        DayKey::Date(date) => {
            let parsed = if raw.dts.trim().is_empty() {
                date
            } else {
                parse_session_date(&raw.dts, year).unwrap_or_else(|| {
                    issues.push(NormalizeIssue::BadDate {
                        cell,
                        value: raw.dts.clone(),
                    });
                    date
                })
            };
            Some((parsed, parsed))
        }
    }
}

/// Parse session date text such as `"10 Июн"` or `"10 Июн 2025"`.
///
/// Month names are matched on their first three letters, so both the
/// abbreviated and the full genitive form (`"10 июня"`) are accepted.
pub fn parse_session_date(text: &str, year: i32) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }

    let mut parts = text.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month_text = parts.next()?.to_lowercase();
    let prefix: String = month_text.chars().take(3).collect();
    let month = MONTHS.iter().position(|m| *m == prefix)? as u32 + 1;
    let year = match parts.next() {
        Some(y) => y.trim_end_matches('.').parse().ok()?,
        None => year,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn teacher_names(raw: &str, cell: CellKey, issues: &mut Vec<NormalizeIssue>) -> Vec<String> {
    let unescaped = htmlize::unescape(raw);
    let mut names: Vec<String> = Vec::new();
    for part in unescaped.split(',') {
        let name = collapse_whitespace(part);
        if name.is_empty() {
            continue;
        }
        if name.split(' ').count() < 2 {
            issues.push(NormalizeIssue::UnparseableTeacher { cell, name });
            continue;
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    sort_case_insensitive(&mut names);
    names
}

/// Visible text of a room title with markup and emoji removed.
pub fn room_label(title: &str) -> String {
    let stripped = EMOJI.replace_all(title, "");
    let fragment = Html::parse_fragment(&stripped);
    let text: String = fragment.root_element().text().collect();
    collapse_whitespace(&text)
}

fn room_labels(auditories: &[RawAuditory]) -> Vec<String> {
    let mut rooms: Vec<String> = auditories
        .iter()
        .map(|a| room_label(&a.title))
        .filter(|label| !label.is_empty())
        .collect();
    sort_case_insensitive(&mut rooms);
    rooms.dedup();
    rooms
}

/// Online-lesson link: an `http` anchor in the first room title, else `e_link`.
fn lesson_link(raw: &RawLesson) -> Option<String> {
    let from_title = raw.auditories.first().and_then(|a| {
        let fragment = Html::parse_fragment(&a.title);
        fragment
            .select(&LINK_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .find(|href| href.starts_with("http"))
            .map(str::to_string)
    });

    from_title.or_else(|| {
        raw.e_link
            .as_str()
            .map(str::trim)
            .filter(|link| link.starts_with("http"))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveTime;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn term_lesson() -> RawLesson {
        RawLesson {
            sbj: " Физика ".into(),
            teacher: "Петров  Пётр Петрович, Иванов Иван Иванович".into(),
            df: "2025-02-01".into(),
            dt: "2025-06-01".into(),
            auditories: vec![
                RawAuditory {
                    title: "ав4805".into(),
                    color: String::new(),
                },
                RawAuditory {
                    title: "ав2301 📚".into(),
                    color: String::new(),
                },
            ],
            location: "Автозаводская".into(),
            kind: "Лекция".into(),
            ..Default::default()
        }
    }

    fn grid(day: &str, slot: &str, lessons: Vec<RawLesson>) -> RawGrid {
        let mut slots = HashMap::new();
        slots.insert(slot.to_string(), lessons);
        let mut grid = RawGrid::new();
        grid.insert(day.to_string(), slots);
        grid
    }

    #[test]
    fn term_lesson_is_keyed_by_weekday() {
        let grid = grid("1", "2", vec![term_lesson()]);
        let out = normalize(&grid, ScheduleMode::Term, &SlotTable::default(), 2025);
        assert!(out.issues.is_empty());

        let cell = CellKey {
            day: DayKey::Weekday(1),
            slot: 2,
        };
        let lesson = &out.cells[&cell][0];
        assert_eq!(lesson.subject, "Физика");
        assert_eq!(
            lesson.teachers,
            vec!["Иванов Иван Иванович", "Петров Пётр Петрович"]
        );
        assert_eq!(lesson.rooms, vec!["ав2301", "ав4805"]);
        assert_eq!(lesson.start_time, NaiveTime::from_hms_opt(10, 40, 0).unwrap());
        assert_eq!(lesson.start_date, date(2025, 2, 1));
        assert_eq!(lesson.end_date, date(2025, 6, 1));
        assert!(!lesson.is_session());
    }

    #[test]
    fn session_lesson_is_keyed_by_literal_date() {
        let raw = RawLesson {
            sbj: "Экзамен".into(),
            dts: "10 Июн".into(),
            ..term_lesson()
        };
        let grid = grid("2025-06-10", "1", vec![raw]);
        let out = normalize(&grid, ScheduleMode::Session, &SlotTable::default(), 2025);

        let cell = CellKey {
            day: DayKey::Date(date(2025, 6, 10)),
            slot: 1,
        };
        let lesson = &out.cells[&cell][0];
        assert_eq!(lesson.start_date, date(2025, 6, 10));
        assert_eq!(lesson.end_date, date(2025, 6, 10));
        assert_eq!(lesson.day.weekday_number(), 2);
    }

    #[test]
    fn session_cell_follows_the_lesson_date() {
        let raw = RawLesson {
            dts: "11 Июн 2025".into(),
            ..term_lesson()
        };
        let grid = grid("2025-06-10", "1", vec![raw]);
        let out = normalize(&grid, ScheduleMode::Session, &SlotTable::default(), 2025);

        let lesson = out.lessons().next().unwrap();
        assert_eq!(lesson.start_date, date(2025, 6, 11));
        assert_eq!(lesson.cell().day, DayKey::Date(date(2025, 6, 11)));
        assert!(out.cells.contains_key(&lesson.cell()));
    }

    #[test]
    fn unknown_slot_is_reported_not_dropped_silently() {
        let grid = grid("1", "9", vec![term_lesson()]);
        let out = normalize(&grid, ScheduleMode::Term, &SlotTable::default(), 2025);
        assert!(out.cells.is_empty());
        assert_eq!(
            out.issues,
            vec![NormalizeIssue::UnknownSlot {
                day: DayKey::Weekday(1),
                slot: "9".into()
            }]
        );
    }

    #[test]
    fn configured_slot_table_maps_extra_slots() {
        let slots = SlotTable::parse(&format!(
            "{},21:10-22:40",
            crate::timetable::slots::DEFAULT_SLOT_TIMES
        ))
        .unwrap();
        let grid = grid("1", "8", vec![term_lesson()]);
        let out = normalize(&grid, ScheduleMode::Term, &slots, 2025);
        assert_eq!(out.lesson_count(), 1);
    }

    #[test]
    fn unknown_day_and_bad_dates_are_reported() {
        let mut raw = term_lesson();
        raw.df = "soon".into();
        let mut g = grid("1", "1", vec![raw]);
        g.extend(grid("8", "1", vec![term_lesson()]));
        let out = normalize(&g, ScheduleMode::Term, &SlotTable::default(), 2025);
        assert!(out.cells.is_empty());
        assert_eq!(out.issues.len(), 2);
    }

    #[test]
    fn empty_cells_produce_nothing() {
        let g = grid("1", "1", vec![]);
        let out = normalize(&g, ScheduleMode::Term, &SlotTable::default(), 2025);
        assert!(out.cells.is_empty());
        assert!(out.issues.is_empty());
    }

    #[test]
    fn single_token_teacher_is_dropped() {
        let raw = RawLesson {
            teacher: "Вакансия, Иванов Иван".into(),
            ..term_lesson()
        };
        let out = normalize(
            &grid("3", "1", vec![raw]),
            ScheduleMode::Term,
            &SlotTable::default(),
            2025,
        );
        assert_eq!(out.lessons().next().unwrap().teachers, vec!["Иванов Иван"]);
        assert!(matches!(
            out.issues[0],
            NormalizeIssue::UnparseableTeacher { ref name, .. } if name == "Вакансия"
        ));
    }

    #[test]
    fn link_comes_from_room_markup_then_e_link() {
        let mut raw = term_lesson();
        raw.auditories = vec![RawAuditory {
            title: r#"<a href="https://meet.example.org/abc" target="_blank">Вебинар</a> 💻"#.into(),
            color: String::new(),
        }];
        assert_eq!(lesson_link(&raw).as_deref(), Some("https://meet.example.org/abc"));
        assert_eq!(room_labels(&raw.auditories), vec!["Вебинар"]);

        raw.auditories.clear();
        raw.e_link = serde_json::json!("https://lms.example.org/x");
        assert_eq!(lesson_link(&raw).as_deref(), Some("https://lms.example.org/x"));

        raw.e_link = serde_json::json!(false);
        assert_eq!(lesson_link(&raw), None);
    }

    #[test]
    fn session_dates() {
        assert_eq!(parse_session_date("10 Июн", 2025), Some(date(2025, 6, 10)));
        assert_eq!(parse_session_date("3 января", 2026), Some(date(2026, 1, 3)));
        assert_eq!(parse_session_date("10 Июн 2024", 2025), Some(date(2024, 6, 10)));
        assert_eq!(parse_session_date("2025-06-11", 2020), Some(date(2025, 6, 11)));
        assert_eq!(parse_session_date("31 Фев", 2025), None);
        assert_eq!(parse_session_date("Июн", 2025), None);
    }

    #[test]
    fn normalizing_is_idempotent_on_teacher_strings() {
        let once = teacher_names(
            "Иванов Иван Иванович, Петров Пётр",
            CellKey {
                day: DayKey::Weekday(1),
                slot: 1,
            },
            &mut Vec::new(),
        );
        let twice = teacher_names(
            &once.join(", "),
            CellKey {
                day: DayKey::Weekday(1),
                slot: 1,
            },
            &mut Vec::new(),
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn repeated_rooms_collapse_regardless_of_position() {
        let titles = ["101", "A1", "a1", "101", "A1"];
        let auditories: Vec<RawAuditory> = titles
            .iter()
            .map(|t| RawAuditory {
                title: t.to_string(),
                color: String::new(),
            })
            .collect();
        assert_eq!(room_labels(&auditories), vec!["101", "A1", "a1"]);
    }

    #[test]
    fn bad_term_date_marks_the_cell_unsettled() {
        let bad = RawLesson {
            df: "скоро".into(),
            ..term_lesson()
        };
        let grid = grid("2", "3", vec![term_lesson(), bad]);
        let out = normalize(&grid, ScheduleMode::Term, &SlotTable::default(), 2025);

        let cell = CellKey {
            day: DayKey::Weekday(2),
            slot: 3,
        };
        assert_eq!(out.cells[&cell].len(), 1);
        assert_eq!(out.unsettled_cells().into_iter().collect::<Vec<_>>(), vec![cell]);
    }

    #[test]
    fn bad_session_date_marks_the_column_cell_unsettled() {
        let raw = RawLesson {
            dts: "когда-нибудь".into(),
            ..term_lesson()
        };
        let grid = grid("2025-06-10", "1", vec![raw]);
        let out = normalize(&grid, ScheduleMode::Session, &SlotTable::default(), 2025);

        let cell = CellKey {
            day: DayKey::Date(date(2025, 6, 10)),
            slot: 1,
        };
        assert!(out.unsettled_cells().contains(&cell));
    }

    #[test]
    fn dropped_teacher_name_does_not_unsettle() {
        let raw = RawLesson {
            teacher: "Вакансия".into(),
            ..term_lesson()
        };
        let out = normalize(&grid("1", "1", vec![raw]), ScheduleMode::Term, &SlotTable::default(), 2025);
        assert_eq!(out.issues.len(), 1);
        assert!(out.unsettled_cells().is_empty());
    }
}
