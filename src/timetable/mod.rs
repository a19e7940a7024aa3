//! Timetable domain: day/slot keys, upstream normalization, the Week
//! projection served to readers and the per-cell diff.

pub mod diff;
pub mod groups;
pub mod normalize;
pub mod query;
pub mod slots;
pub mod week;

use serde::{Deserialize, Serialize};

pub use slots::{CellKey, DayKey, SlotTable, SlotTimes};

/// Which of the two upstream schedules a request or row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Recurring weekly lessons valid over a date range.
    Term,
    /// One-off exam/session lessons on specific dates.
    Session,
}

impl ScheduleMode {
    pub const ALL: [Self; 2] = [Self::Term, Self::Session];

    pub fn from_session_flag(is_session: bool) -> Self {
        if is_session { Self::Session } else { Self::Term }
    }

    pub fn is_session(self) -> bool {
        matches!(self, Self::Session)
    }

    /// Value of the upstream `session` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Term => "0",
            Self::Session => "1",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Term => "term",
            Self::Session => "session",
        }
    }
}
