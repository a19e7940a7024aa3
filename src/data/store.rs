//! The persistence seam used by the sync pipeline and the edit path.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{NaturalKey, RoomLink, ScheduleData, ScheduleKey, ScheduleRow, TeacherLink};

/// Relational store for reference entities, schedule rows and their links.
///
/// Lookups that find nothing return [`StoreError::NotFound`]; creates that
/// hit a unique constraint return [`StoreError::Exists`].
///
/// [`StoreError::NotFound`]: super::StoreError::NotFound
/// [`StoreError::Exists`]: super::StoreError::Exists
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_reference(&self, key: &NaturalKey) -> StoreResult<Uuid>;
    async fn create_reference(&self, id: Uuid, key: &NaturalKey) -> StoreResult<()>;

    /// All rows of a group for one mode, joined with reference names.
    async fn schedules_by_group(&self, group: &str, is_session: bool)
        -> StoreResult<Vec<ScheduleData>>;
    async fn schedule_by_id(&self, id: Uuid) -> StoreResult<ScheduleRow>;
    async fn schedule_ids_by_key(&self, key: &ScheduleKey) -> StoreResult<Vec<Uuid>>;
    async fn create_schedule(&self, row: &ScheduleRow) -> StoreResult<()>;
    /// Deletes one row; `NotFound` if it did not exist.
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()>;

    async fn teacher_links(&self, schedule_id: Uuid) -> StoreResult<Vec<TeacherLink>>;
    async fn room_links(&self, schedule_id: Uuid) -> StoreResult<Vec<RoomLink>>;
    async fn create_teacher_link(&self, link: TeacherLink) -> StoreResult<()>;
    async fn create_room_link(&self, link: RoomLink) -> StoreResult<()>;
    /// Deletes every teacher and room link of a schedule row.
    async fn delete_links(&self, schedule_id: Uuid) -> StoreResult<()>;
}
