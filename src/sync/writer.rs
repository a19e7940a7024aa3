//! Applies per-cell plans to the store.
//!
//! Writes are not transactional: a failed insert or link is logged and left
//! for the next pass to correct.

use tracing::{debug, warn};
use uuid::Uuid;

use super::upsert::{PassStats, ReferenceIds};
use crate::data::models::{NaturalKey, RoomLink, ScheduleKey, ScheduleRow, TeacherLink};
use crate::data::{Store, StoreError};
use crate::timetable::diff::{CellPlan, Decision};
use crate::timetable::normalize::Lesson;
use crate::timetable::week::Pair;
use crate::timetable::{CellKey, ScheduleMode, SlotTable};

pub struct Reconciler<'a> {
    store: &'a dyn Store,
    slots: &'a SlotTable,
    group: &'a str,
    mode: ScheduleMode,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn Store, slots: &'a SlotTable, group: &'a str, mode: ScheduleMode) -> Self {
        Self {
            store,
            slots,
            group,
            mode,
        }
    }

    pub async fn apply(&self, plan: &CellPlan, ids: &mut ReferenceIds, stats: &mut PassStats) {
        match plan.decision {
            Decision::NoOp => {
                stats.cells_unchanged += 1;
                return;
            }
            Decision::RemoveOnly | Decision::Replace => stats.cells_changed += 1,
        }

        debug!(group = self.group, cell = %plan.cell, decision = ?plan.decision, "Reconciling cell");
        for pair in &plan.stale {
            self.remove_pair(plan.cell, pair, stats).await;
        }
        if plan.decision == Decision::Replace {
            for lesson in &plan.fresh {
                self.insert_lesson(lesson, ids, stats).await;
            }
        }
    }

    fn schedule_key(&self, cell: CellKey, pair: &Pair) -> Option<ScheduleKey> {
        let times = self.slots.get(cell.slot)?;
        Some(ScheduleKey {
            group: self.group.to_string(),
            subject: pair.subject.clone(),
            kind: pair.kind.clone(),
            location: pair.location.clone(),
            start_time: times.start,
            end_time: times.end,
            start_date: pair.start_date,
            end_date: pair.end_date,
            weekday: cell.day.weekday_number(),
            is_session: self.mode.is_session(),
        })
    }

    async fn remove_pair(&self, cell: CellKey, pair: &Pair, stats: &mut PassStats) {
        let Some(key) = self.schedule_key(cell, pair) else {
            warn!(group = self.group, %cell, "No slot times for cell, cannot delete");
            return;
        };
        let ids = match self.store.schedule_ids_by_key(&key).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(group = self.group, %cell, subject = %pair.subject, error = %e, "Failed to look up stale rows");
                return;
            }
        };
        if ids.is_empty() {
            debug!(group = self.group, %cell, subject = %pair.subject, "No stored rows matched stale pair");
        }
        for id in ids {
            if self.delete_row(id).await {
                stats.schedules_deleted += 1;
            }
        }
    }

    /// Delete a row and its links; `true` if the row was removed here.
    async fn delete_row(&self, id: Uuid) -> bool {
        if let Err(e) = self.store.delete_links(id).await {
            warn!(%id, error = %e, "Failed to delete schedule links");
            return false;
        }
        match self.store.delete_schedule(id).await {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => {
                warn!(%id, error = %e, "Failed to delete schedule row");
                false
            }
        }
    }

    async fn insert_lesson(&self, lesson: &Lesson, ids: &mut ReferenceIds, stats: &mut PassStats) {
        let Some(row) = self.build_row(lesson, ids, stats).await else {
            warn!(group = self.group, cell = %lesson.cell(), subject = %lesson.subject, "Skipping lesson with unresolved references");
            stats.lessons_failed += 1;
            return;
        };

        let mut teacher_ids = Vec::with_capacity(lesson.teachers.len());
        for teacher in &lesson.teachers {
            let Some(key) = NaturalKey::teacher(teacher) else {
                continue;
            };
            match ids.resolve_logged(self.store, &key, stats).await {
                Some(id) => teacher_ids.push(id),
                None => {
                    stats.lessons_failed += 1;
                    return;
                }
            }
        }
        let mut room_ids = Vec::with_capacity(lesson.rooms.len());
        for room in &lesson.rooms {
            match ids
                .resolve_logged(self.store, &NaturalKey::Room(room.clone()), stats)
                .await
            {
                Some(id) => room_ids.push(id),
                None => {
                    stats.lessons_failed += 1;
                    return;
                }
            }
        }

        if let Err(e) = self.store.create_schedule(&row).await {
            warn!(group = self.group, cell = %lesson.cell(), subject = %lesson.subject, error = %e, "Failed to insert schedule row");
            stats.lessons_failed += 1;
            return;
        }
        stats.schedules_inserted += 1;

        for teacher_id in teacher_ids {
            let link = TeacherLink {
                teacher_id,
                schedule_id: row.id,
            };
            if let Err(e) = self.store.create_teacher_link(link).await {
                warn!(schedule_id = %row.id, %teacher_id, error = %e, "Failed to link teacher");
            }
        }
        for room_id in room_ids {
            let link = RoomLink {
                room_id,
                schedule_id: row.id,
            };
            if let Err(e) = self.store.create_room_link(link).await {
                warn!(schedule_id = %row.id, %room_id, error = %e, "Failed to link room");
            }
        }
    }

    async fn build_row(
        &self,
        lesson: &Lesson,
        ids: &mut ReferenceIds,
        stats: &mut PassStats,
    ) -> Option<ScheduleRow> {
        let group_id = ids
            .resolve_logged(self.store, &NaturalKey::Group(self.group.to_string()), stats)
            .await?;
        let subject_id = ids
            .resolve_logged(self.store, &NaturalKey::Subject(lesson.subject.clone()), stats)
            .await?;
        let type_id = ids
            .resolve_logged(self.store, &NaturalKey::SubjectType(lesson.kind.clone()), stats)
            .await?;
        let location_id = ids
            .resolve_logged(self.store, &NaturalKey::Location(lesson.location.clone()), stats)
            .await?;

        Some(ScheduleRow {
            id: Uuid::new_v4(),
            group_id,
            subject_id,
            type_id,
            location_id,
            start_time: lesson.start_time,
            end_time: lesson.end_time,
            start_date: lesson.start_date,
            end_date: lesson.end_date,
            weekday: lesson.day.weekday_number(),
            link: lesson.link.clone(),
            is_session: self.mode.is_session(),
        })
    }
}
