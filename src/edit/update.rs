//! Replace one schedule row and its participants, rolling back on failure.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::FutureExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::saga::{Saga, SagaError, SagaStep};
use crate::cache::{Cache, schedule_cache_key};
use crate::data::models::{NaturalKey, RoomLink, ScheduleRow, TeacherLink};
use crate::data::{Store, StoreError};
use crate::timetable::slots::{MAX_TERM_WEEKDAY, parse_clock};

/// Requested new state of a schedule row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub group: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    /// `HH:MM` or `HH:MM:SS`.
    pub start_time: String,
    pub end_time: String,
    /// `YYYY-MM-DD`.
    pub start_date: String,
    pub end_date: String,
    pub weekday: i16,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub is_session: bool,
    /// Teacher full names, `"Second First [Middle]"`.
    #[serde(default)]
    pub teachers: Vec<String>,
    /// Room numbers.
    #[serde(default)]
    pub rooms: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("schedule {0} not found")]
    NotFound(Uuid),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("update of schedule {id} failed and was rolled back: {source}")]
    Aborted {
        id: Uuid,
        #[source]
        source: SagaError,
    },
    #[error("update of schedule {id} failed and could not be rolled back: {source}")]
    Unrecoverable {
        id: Uuid,
        #[source]
        source: SagaError,
    },
}

/// Row and links as they were before the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub row: ScheduleRow,
    pub teachers: Vec<TeacherLink>,
    pub rooms: Vec<RoomLink>,
}

pub struct ScheduleEditor {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
}

impl ScheduleEditor {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    /// Replace schedule `id` with `request`, keeping the same id.
    ///
    /// Nothing is written when the row is missing or the request is invalid.
    /// If a write fails midway the previous row and links are restored.
    pub async fn update(&self, id: Uuid, request: &ScheduleUpdate) -> Result<(), EditError> {
        let store = self.store.as_ref();

        let before = snapshot(store, id).await?;
        let after = self.build_row(id, request).await?;

        let result = Saga::new()
            .step(
                SagaStep::new("delete current row", || delete_row(store, id).boxed())
                    .compensate_with(|| restore(store, &before).boxed())
                    .compensate_on_failure(),
            )
            .step(
                SagaStep::new("insert updated row", || insert_row(store, &after).boxed())
                    .compensate_with(|| delete_row(store, id).boxed())
                    .compensate_on_failure(),
            )
            .step(SagaStep::new("link participants", || {
                link_participants(store, id, &request.teachers, &request.rooms).boxed()
            }))
            .execute()
            .await;

        match result {
            Ok(()) => {
                info!(%id, group = %request.group, "Schedule row updated");
                self.invalidate(&request.group).await;
                Ok(())
            }
            Err(source @ SagaError::Aborted { .. }) => {
                warn!(%id, error = %source, "Schedule update rolled back");
                Err(EditError::Aborted { id, source })
            }
            Err(source @ SagaError::RollbackFailed { .. }) => {
                error!(%id, error = %source, before = ?before, "Schedule update could not be rolled back");
                Err(EditError::Unrecoverable { id, source })
            }
        }
    }

    /// Validate the request and resolve its references, without writing.
    async fn build_row(&self, id: Uuid, request: &ScheduleUpdate) -> Result<ScheduleRow, EditError> {
        let invalid = |msg: String| EditError::InvalidRequest(msg);

        let start_time = parse_clock(&request.start_time)
            .ok_or_else(|| invalid(format!("bad start time {:?}", request.start_time)))?;
        let end_time = parse_clock(&request.end_time)
            .ok_or_else(|| invalid(format!("bad end time {:?}", request.end_time)))?;
        if end_time <= start_time {
            return Err(invalid("end time must be after start time".into()));
        }

        let parse_date = |raw: &str| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok();
        let start_date = parse_date(&request.start_date)
            .ok_or_else(|| invalid(format!("bad start date {:?}", request.start_date)))?;
        let end_date = parse_date(&request.end_date)
            .ok_or_else(|| invalid(format!("bad end date {:?}", request.end_date)))?;
        if end_date < start_date {
            return Err(invalid("end date must not be before start date".into()));
        }

        let max_weekday = if request.is_session { 7 } else { i16::from(MAX_TERM_WEEKDAY) };
        if !(1..=max_weekday).contains(&request.weekday) {
            return Err(invalid(format!(
                "weekday {} outside 1..={max_weekday}",
                request.weekday
            )));
        }

        let group_id = self.resolve(NaturalKey::Group(request.group.trim().to_string())).await?;
        let subject_id = self
            .resolve(NaturalKey::Subject(request.subject.trim().to_string()))
            .await?;
        let type_id = self
            .resolve(NaturalKey::SubjectType(request.kind.trim().to_string()))
            .await?;
        let location_id = self
            .resolve(NaturalKey::Location(request.location.trim().to_string()))
            .await?;

        Ok(ScheduleRow {
            id,
            group_id,
            subject_id,
            type_id,
            location_id,
            start_time,
            end_time,
            start_date,
            end_date,
            weekday: request.weekday,
            link: request
                .link
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            is_session: request.is_session,
        })
    }

    async fn resolve(&self, key: NaturalKey) -> Result<Uuid, EditError> {
        match self.store.find_reference(&key).await {
            Ok(id) => Ok(id),
            Err(StoreError::NotFound(_)) => Err(EditError::InvalidRequest(format!("unknown {key}"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn invalidate(&self, group: &str) {
        for is_session in [false, true] {
            let key = schedule_cache_key(group.trim(), is_session);
            if let Err(e) = self.cache.delete(&key).await {
                warn!(key, error = ?e, "Failed to invalidate cached schedule");
            }
        }
    }
}

/// Current row and links of `id`.
pub async fn snapshot(store: &dyn Store, id: Uuid) -> Result<Snapshot, EditError> {
    let row = match store.schedule_by_id(id).await {
        Ok(row) => row,
        Err(StoreError::NotFound(_)) => return Err(EditError::NotFound(id)),
        Err(e) => return Err(e.into()),
    };
    let teachers = store.teacher_links(id).await?;
    let rooms = store.room_links(id).await?;
    Ok(Snapshot {
        row,
        teachers,
        rooms,
    })
}

/// Delete links then the row. A missing row is not an error.
async fn delete_row(store: &dyn Store, id: Uuid) -> anyhow::Result<()> {
    store.delete_links(id).await?;
    match store.delete_schedule(id).await {
        Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn insert_row(store: &dyn Store, row: &ScheduleRow) -> anyhow::Result<()> {
    store.create_schedule(row).await?;
    Ok(())
}

/// Re-insert the snapshot. Rows and links that already exist are kept.
async fn restore(store: &dyn Store, before: &Snapshot) -> anyhow::Result<()> {
    match store.create_schedule(&before.row).await {
        Ok(()) | Err(StoreError::Exists(_)) => {}
        Err(e) => return Err(e.into()),
    }
    for link in &before.teachers {
        match store.create_teacher_link(*link).await {
            Ok(()) | Err(StoreError::Exists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    for link in &before.rooms {
        match store.create_room_link(*link).await {
            Ok(()) | Err(StoreError::Exists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn link_participants(
    store: &dyn Store,
    schedule_id: Uuid,
    teachers: &[String],
    rooms: &[String],
) -> anyhow::Result<()> {
    for name in teachers {
        let key = NaturalKey::teacher(name)
            .ok_or_else(|| anyhow::anyhow!("unparseable teacher name {name:?}"))?;
        let teacher_id = store.find_reference(&key).await?;
        store
            .create_teacher_link(TeacherLink {
                teacher_id,
                schedule_id,
            })
            .await?;
    }
    for number in rooms {
        let room_id = store
            .find_reference(&NaturalKey::Room(number.trim().to_string()))
            .await?;
        store
            .create_room_link(RoomLink {
                room_id,
                schedule_id,
            })
            .await?;
    }
    Ok(())
}
