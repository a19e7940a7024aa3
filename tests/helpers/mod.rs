//! Shared fixtures: an in-memory `Store` with failure injection and a fake
//! upstream.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{Value, json};
use timetable_sync::data::models::{
    NaturalKey, ReferenceKind, RoomLink, ScheduleData, ScheduleKey, ScheduleRow, TeacherLink,
};
use timetable_sync::data::{Store, StoreError, StoreResult};
use timetable_sync::timetable::ScheduleMode;
use timetable_sync::upstream::{GroupResponse, TimetableSource, UpstreamError, interpret_response};
use uuid::Uuid;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindReference,
    CreateReference,
    CreateSchedule,
    DeleteSchedule,
    CreateTeacherLink,
    CreateRoomLink,
    DeleteLinks,
}

#[derive(Default)]
struct State {
    refs: HashMap<NaturalKey, Uuid>,
    names: HashMap<Uuid, NaturalKey>,
    schedules: HashMap<Uuid, ScheduleRow>,
    teacher_links: Vec<TeacherLink>,
    room_links: Vec<RoomLink>,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Remaining failures per operation.
    failures: Mutex<HashMap<FailPoint, usize>>,
    /// Keys for which another writer wins the create race.
    racing: Mutex<HashSet<NaturalKey>>,
    /// Keys that can never be created.
    broken: Mutex<HashSet<NaturalKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `point` fail with a database error.
    pub fn fail_next(&self, point: FailPoint, times: usize) {
        self.failures.lock().unwrap().insert(point, times);
    }

    /// The next create of `key` loses a race against another writer.
    pub fn race_on_create(&self, key: NaturalKey) {
        self.racing.lock().unwrap().insert(key);
    }

    /// Every create of `key` fails with a database error.
    pub fn break_key(&self, key: NaturalKey) {
        self.broken.lock().unwrap().insert(key);
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "injected failure at {point:?}"
                ))))
            }
            _ => Ok(()),
        }
    }

    /// Number of mutating calls that succeeded.
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn rows(&self) -> Vec<ScheduleRow> {
        let mut rows: Vec<_> = self.state.lock().unwrap().schedules.values().cloned().collect();
        rows.sort_by_key(|r| (r.weekday, r.start_time, r.start_date));
        rows
    }

    pub fn all_teacher_links(&self) -> Vec<TeacherLink> {
        self.state.lock().unwrap().teacher_links.clone()
    }

    pub fn all_room_links(&self) -> Vec<RoomLink> {
        self.state.lock().unwrap().room_links.clone()
    }

    pub fn reference_count(&self, kind: ReferenceKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .refs
            .keys()
            .filter(|k| k.kind() == kind)
            .count()
    }

    pub fn reference_id(&self, key: &NaturalKey) -> Option<Uuid> {
        self.state.lock().unwrap().refs.get(key).copied()
    }

    /// Insert a reference directly, bypassing failure injection.
    pub fn seed_reference(&self, key: NaturalKey) -> Uuid {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.refs.get(&key) {
            return *id;
        }
        let id = Uuid::new_v4();
        state.refs.insert(key.clone(), id);
        state.names.insert(id, key);
        id
    }

    fn name_of(state: &State, id: Uuid) -> String {
        match state.names.get(&id) {
            Some(NaturalKey::Teacher(name)) => name.full_name(),
            Some(
                NaturalKey::Group(v)
                | NaturalKey::Subject(v)
                | NaturalKey::SubjectType(v)
                | NaturalKey::Location(v)
                | NaturalKey::Room(v),
            ) => v.clone(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_reference(&self, key: &NaturalKey) -> StoreResult<Uuid> {
        self.check(FailPoint::FindReference)?;
        self.state
            .lock()
            .unwrap()
            .refs
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create_reference(&self, id: Uuid, key: &NaturalKey) -> StoreResult<()> {
        self.check(FailPoint::CreateReference)?;
        if self.broken.lock().unwrap().contains(key) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "injected failure creating {key}"
            ))));
        }
        if self.racing.lock().unwrap().remove(key) {
            self.seed_reference(key.clone());
            return Err(StoreError::Exists(key.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if state.refs.contains_key(key) {
            return Err(StoreError::Exists(key.to_string()));
        }
        state.refs.insert(key.clone(), id);
        state.names.insert(id, key.clone());
        state.writes += 1;
        Ok(())
    }

    async fn schedules_by_group(&self, group: &str, is_session: bool) -> StoreResult<Vec<ScheduleData>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<ScheduleData> = state
            .schedules
            .values()
            .filter(|row| row.is_session == is_session && Self::name_of(&state, row.group_id) == group)
            .map(|row| ScheduleData {
                id: row.id,
                group: Self::name_of(&state, row.group_id),
                subject: Self::name_of(&state, row.subject_id),
                kind: Self::name_of(&state, row.type_id),
                location: Self::name_of(&state, row.location_id),
                start_time: row.start_time,
                end_time: row.end_time,
                start_date: row.start_date,
                end_date: row.end_date,
                weekday: row.weekday,
                link: row.link.clone(),
                is_session: row.is_session,
                teachers: state
                    .teacher_links
                    .iter()
                    .filter(|l| l.schedule_id == row.id)
                    .map(|l| Self::name_of(&state, l.teacher_id))
                    .collect(),
                rooms: state
                    .room_links
                    .iter()
                    .filter(|l| l.schedule_id == row.id)
                    .map(|l| Self::name_of(&state, l.room_id))
                    .collect(),
            })
            .collect();
        out.sort_by_key(|r| (r.weekday, r.start_time, r.start_date));
        Ok(out)
    }

    async fn schedule_by_id(&self, id: Uuid) -> StoreResult<ScheduleRow> {
        self.state
            .lock()
            .unwrap()
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("schedule {id}")))
    }

    async fn schedule_ids_by_key(&self, key: &ScheduleKey) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .schedules
            .values()
            .filter(|row| {
                Self::name_of(&state, row.group_id) == key.group
                    && Self::name_of(&state, row.subject_id) == key.subject
                    && Self::name_of(&state, row.type_id) == key.kind
                    && Self::name_of(&state, row.location_id) == key.location
                    && row.start_time == key.start_time
                    && row.end_time == key.end_time
                    && row.start_date == key.start_date
                    && row.end_date == key.end_date
                    && row.weekday == key.weekday
                    && row.is_session == key.is_session
            })
            .map(|row| row.id)
            .collect())
    }

    async fn create_schedule(&self, row: &ScheduleRow) -> StoreResult<()> {
        self.check(FailPoint::CreateSchedule)?;
        let mut state = self.state.lock().unwrap();
        for referenced in [row.group_id, row.subject_id, row.type_id, row.location_id] {
            if !state.names.contains_key(&referenced) {
                return Err(StoreError::MissingReference(format!("schedule {}", row.id)));
            }
        }
        if state.schedules.contains_key(&row.id) {
            return Err(StoreError::Exists(format!("schedule {}", row.id)));
        }
        state.schedules.insert(row.id, row.clone());
        state.writes += 1;
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()> {
        self.check(FailPoint::DeleteSchedule)?;
        let mut state = self.state.lock().unwrap();
        if state.schedules.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("schedule {id}")));
        }
        state.teacher_links.retain(|l| l.schedule_id != id);
        state.room_links.retain(|l| l.schedule_id != id);
        state.writes += 1;
        Ok(())
    }

    async fn teacher_links(&self, schedule_id: Uuid) -> StoreResult<Vec<TeacherLink>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .teacher_links
            .iter()
            .filter(|l| l.schedule_id == schedule_id)
            .copied()
            .collect())
    }

    async fn room_links(&self, schedule_id: Uuid) -> StoreResult<Vec<RoomLink>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .room_links
            .iter()
            .filter(|l| l.schedule_id == schedule_id)
            .copied()
            .collect())
    }

    async fn create_teacher_link(&self, link: TeacherLink) -> StoreResult<()> {
        self.check(FailPoint::CreateTeacherLink)?;
        let mut state = self.state.lock().unwrap();
        if !state.schedules.contains_key(&link.schedule_id) || !state.names.contains_key(&link.teacher_id) {
            return Err(StoreError::MissingReference("teacher link".into()));
        }
        if state.teacher_links.contains(&link) {
            return Err(StoreError::Exists("teacher link".into()));
        }
        state.teacher_links.push(link);
        state.writes += 1;
        Ok(())
    }

    async fn create_room_link(&self, link: RoomLink) -> StoreResult<()> {
        self.check(FailPoint::CreateRoomLink)?;
        let mut state = self.state.lock().unwrap();
        if !state.schedules.contains_key(&link.schedule_id) || !state.names.contains_key(&link.room_id) {
            return Err(StoreError::MissingReference("room link".into()));
        }
        if state.room_links.contains(&link) {
            return Err(StoreError::Exists("room link".into()));
        }
        state.room_links.push(link);
        state.writes += 1;
        Ok(())
    }

    async fn delete_links(&self, schedule_id: Uuid) -> StoreResult<()> {
        self.check(FailPoint::DeleteLinks)?;
        let mut state = self.state.lock().unwrap();
        let before = state.teacher_links.len() + state.room_links.len();
        state.teacher_links.retain(|l| l.schedule_id != schedule_id);
        state.room_links.retain(|l| l.schedule_id != schedule_id);
        if state.teacher_links.len() + state.room_links.len() != before {
            state.writes += 1;
        }
        Ok(())
    }
}

/// Upstream stand-in serving canned landing page and group payloads.
#[derive(Default)]
pub struct FakeSource {
    landing: Mutex<String>,
    responses: Mutex<HashMap<(String, ScheduleMode), Value>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSource {
    pub fn new(groups: &[&str]) -> Self {
        let source = Self::default();
        source.set_groups(groups);
        source
    }

    pub fn set_groups(&self, groups: &[&str]) {
        let options: String = groups
            .iter()
            .map(|g| format!("<option value=\"{g}\">{g}</option>\n"))
            .collect();
        *self.landing.lock().unwrap() = format!("<html><select>{options}</select></html>");
    }

    /// Serve `grid` for `group` in `mode`.
    pub fn set_grid(&self, group: &str, mode: ScheduleMode, grid: Value) {
        let body = json!({
            "status": "ok",
            "grid": grid,
            "isSession": mode.is_session(),
        });
        self.responses
            .lock()
            .unwrap()
            .insert((group.to_string(), mode), body);
    }

    pub fn fail_group(&self, group: &str) {
        self.failing.lock().unwrap().insert(group.to_string());
    }
}

#[async_trait]
impl TimetableSource for FakeSource {
    async fn landing_page(&self) -> Result<Vec<u8>, UpstreamError> {
        Ok(self.landing.lock().unwrap().clone().into_bytes())
    }

    async fn group_schedule(
        &self,
        group: &str,
        mode: ScheduleMode,
    ) -> Result<Option<GroupResponse>, UpstreamError> {
        if self.failing.lock().unwrap().contains(group) {
            return Err(UpstreamError::BadStatus {
                status: 502,
                url: format!("fake://{group}"),
            });
        }
        let body = self
            .responses
            .lock()
            .unwrap()
            .get(&(group.to_string(), mode))
            .cloned();
        let body = body.unwrap_or_else(|| {
            json!({"status": "error", "message": timetable_sync::upstream::NO_SCHEDULE_MESSAGE})
        });
        let response: GroupResponse = serde_json::from_value(body).expect("fixture is valid");
        interpret_response(group, response)
    }
}

/// One upstream lesson as JSON.
pub fn lesson(subject: &str, teachers: &str, rooms: &[&str]) -> Value {
    json!({
        "sbj": subject,
        "teacher": teachers,
        "df": "2025-02-01",
        "dt": "2025-06-01",
        "auditories": rooms.iter().map(|r| json!({"title": r, "color": "#fff"})).collect::<Vec<_>>(),
        "location": "Автозаводская",
        "type": "Лекция",
        "e_link": false,
    })
}

/// A grid with a single populated cell.
pub fn grid(day: &str, slot: &str, lessons: Vec<Value>) -> Value {
    json!({ day: { slot: lessons } })
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
