//! Row types and natural keys for the timetable schema.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of reference entity, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Group,
    Subject,
    SubjectType,
    Location,
    Room,
    Teacher,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Subject => "subject",
            Self::SubjectType => "subject type",
            Self::Location => "location",
            Self::Room => "room",
            Self::Teacher => "teacher",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A teacher's name split into its stored parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeacherName {
    pub second: String,
    pub first: String,
    pub middle: Option<String>,
}

impl TeacherName {
    /// Parse `"Second First [Middle...]"`; anything past the third token is
    /// folded into the middle name. Fewer than two tokens is unparseable.
    pub fn parse(full: &str) -> Option<Self> {
        let mut tokens = full.split_whitespace();
        let second = tokens.next()?.to_string();
        let first = tokens.next()?.to_string();
        let rest: Vec<&str> = tokens.collect();
        let middle = (!rest.is_empty()).then(|| rest.join(" "));
        Some(Self {
            second,
            first,
            middle,
        })
    }

    pub fn full_name(&self) -> String {
        match &self.middle {
            Some(middle) => format!("{} {} {}", self.second, self.first, middle),
            None => format!("{} {}", self.second, self.first),
        }
    }
}

impl fmt::Display for TeacherName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Natural key of a reference entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Group(String),
    Subject(String),
    SubjectType(String),
    Location(String),
    Room(String),
    Teacher(TeacherName),
}

impl NaturalKey {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::Group(_) => ReferenceKind::Group,
            Self::Subject(_) => ReferenceKind::Subject,
            Self::SubjectType(_) => ReferenceKind::SubjectType,
            Self::Location(_) => ReferenceKind::Location,
            Self::Room(_) => ReferenceKind::Room,
            Self::Teacher(_) => ReferenceKind::Teacher,
        }
    }

    /// Build a teacher key from a full name, `None` if it has < 2 tokens.
    pub fn teacher(full_name: &str) -> Option<Self> {
        TeacherName::parse(full_name).map(Self::Teacher)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(v)
            | Self::Subject(v)
            | Self::SubjectType(v)
            | Self::Location(v)
            | Self::Room(v) => write!(f, "{} {v:?}", self.kind()),
            Self::Teacher(name) => write!(f, "teacher {:?}", name.full_name()),
        }
    }
}

/// A persisted schedule row, references by id.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub subject_id: Uuid,
    pub type_id: Uuid,
    pub location_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// 1 = Monday .. 7 = Sunday.
    pub weekday: i16,
    pub link: Option<String>,
    pub is_session: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct TeacherLink {
    pub teacher_id: Uuid,
    pub schedule_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct RoomLink {
    pub room_id: Uuid,
    pub schedule_id: Uuid,
}

/// A schedule row joined with the names of everything it references.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduleData {
    pub id: Uuid,
    pub group: String,
    pub subject: String,
    pub kind: String,
    pub location: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekday: i16,
    pub link: Option<String>,
    pub is_session: bool,
    pub teachers: Vec<String>,
    pub rooms: Vec<String>,
}

/// Composite natural key of a schedule row, used to find rows to delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub group: String,
    pub subject: String,
    pub kind: String,
    pub location: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekday: i16,
    pub is_session: bool,
}
