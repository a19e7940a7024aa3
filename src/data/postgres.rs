//! PostgreSQL implementation of [`Store`].

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{NaturalKey, RoomLink, ScheduleData, ScheduleKey, ScheduleRow, TeacherLink};
use super::store::Store;

/// Joined projection of schedule rows with reference names and participants.
const SCHEDULE_DATA_SELECT: &str = r#"
    SELECT
        s.id,
        g.number AS "group",
        sb.name AS subject,
        st.name AS kind,
        l.name AS location,
        s.start_time,
        s.end_time,
        s.start_date,
        s.end_date,
        s.weekday,
        s.link,
        s.is_session,
        ARRAY(
            SELECT TRIM(CONCAT(t.second_name, ' ', t.first_name, ' ', COALESCE(t.middle_name, '')))
            FROM teachers_to_schedule tts
            JOIN teachers t ON t.id = tts.teacher_id
            WHERE tts.schedule_id = s.id
            ORDER BY 1
        ) AS teachers,
        ARRAY(
            SELECT r.number
            FROM rooms_to_schedule rts
            JOIN rooms r ON r.id = rts.room_id
            WHERE rts.schedule_id = s.id
            ORDER BY 1
        ) AS rooms
    FROM schedule s
    JOIN groups g ON g.id = s.group_id
    JOIN subjects sb ON sb.id = s.subject_id
    JOIN subj_types st ON st.id = s.type_id
    JOIN locations l ON l.id = s.location_id
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Table and natural-key column of single-column reference entities.
fn reference_table(key: &NaturalKey) -> Option<(&'static str, &'static str, &str)> {
    match key {
        NaturalKey::Group(v) => Some(("groups", "number", v)),
        NaturalKey::Subject(v) => Some(("subjects", "name", v)),
        NaturalKey::SubjectType(v) => Some(("subj_types", "name", v)),
        NaturalKey::Location(v) => Some(("locations", "name", v)),
        NaturalKey::Room(v) => Some(("rooms", "number", v)),
        NaturalKey::Teacher(_) => None,
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_reference(&self, key: &NaturalKey) -> StoreResult<Uuid> {
        let id: Option<Uuid> = match (key, reference_table(key)) {
            (NaturalKey::Teacher(name), _) => {
                sqlx::query_scalar(
                    r#"
                    SELECT id FROM teachers
                    WHERE second_name = $1 AND first_name = $2
                      AND COALESCE(middle_name, '') = COALESCE($3::TEXT, '')
                    "#,
                )
                .bind(&name.second)
                .bind(&name.first)
                .bind(name.middle.as_deref())
                .fetch_optional(&self.pool)
                .await?
            }
            (_, Some((table, column, value))) => {
                sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE {column} = $1"))
                    .bind(value)
                    .fetch_optional(&self.pool)
                    .await?
            }
            (_, None) => None,
        };
        id.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create_reference(&self, id: Uuid, key: &NaturalKey) -> StoreResult<()> {
        let result = match (key, reference_table(key)) {
            (NaturalKey::Teacher(name), _) => {
                sqlx::query(
                    "INSERT INTO teachers (id, second_name, first_name, middle_name) VALUES ($1, $2, $3, $4)",
                )
                .bind(id)
                .bind(&name.second)
                .bind(&name.first)
                .bind(name.middle.as_deref())
                .execute(&self.pool)
                .await
            }
            (_, Some((table, column, value))) => {
                sqlx::query(&format!("INSERT INTO {table} (id, {column}) VALUES ($1, $2)"))
                    .bind(id)
                    .bind(value)
                    .execute(&self.pool)
                    .await
            }
            (_, None) => return Err(StoreError::NotFound(key.to_string())),
        };
        result
            .map(|_| ())
            .map_err(|e| StoreError::classify(e, key.to_string()))
    }

    async fn schedules_by_group(
        &self,
        group: &str,
        is_session: bool,
    ) -> StoreResult<Vec<ScheduleData>> {
        let query = format!(
            "{SCHEDULE_DATA_SELECT} WHERE g.number = $1 AND s.is_session = $2 \
             ORDER BY s.weekday, s.start_time, s.start_date"
        );
        let rows = sqlx::query_as::<_, ScheduleData>(&query)
            .bind(group)
            .bind(is_session)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn schedule_by_id(&self, id: Uuid) -> StoreResult<ScheduleRow> {
        sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, group_id, subject_id, type_id, location_id, start_time, end_time,
                   start_date, end_date, weekday, link, is_session
            FROM schedule
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("schedule {id}")))
    }

    async fn schedule_ids_by_key(&self, key: &ScheduleKey) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT s.id
            FROM schedule s
            JOIN groups g ON g.id = s.group_id
            JOIN subjects sb ON sb.id = s.subject_id
            JOIN subj_types st ON st.id = s.type_id
            JOIN locations l ON l.id = s.location_id
            WHERE g.number = $1
              AND sb.name = $2
              AND st.name = $3
              AND l.name = $4
              AND s.start_time = $5
              AND s.end_time = $6
              AND s.start_date = $7
              AND s.end_date = $8
              AND s.weekday = $9
              AND s.is_session = $10
            "#,
        )
        .bind(&key.group)
        .bind(&key.subject)
        .bind(&key.kind)
        .bind(&key.location)
        .bind(key.start_time)
        .bind(key.end_time)
        .bind(key.start_date)
        .bind(key.end_date)
        .bind(key.weekday)
        .bind(key.is_session)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_schedule(&self, row: &ScheduleRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule (id, group_id, subject_id, type_id, location_id, start_time,
                                  end_time, start_date, end_date, weekday, link, is_session)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.id)
        .bind(row.group_id)
        .bind(row.subject_id)
        .bind(row.type_id)
        .bind(row.location_id)
        .bind(row.start_time)
        .bind(row.end_time)
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(row.weekday)
        .bind(row.link.as_deref())
        .bind(row.is_session)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::classify(e, format!("schedule {}", row.id)))?;
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM schedule WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    async fn teacher_links(&self, schedule_id: Uuid) -> StoreResult<Vec<TeacherLink>> {
        let links = sqlx::query_as::<_, TeacherLink>(
            "SELECT teacher_id, schedule_id FROM teachers_to_schedule WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn room_links(&self, schedule_id: Uuid) -> StoreResult<Vec<RoomLink>> {
        let links = sqlx::query_as::<_, RoomLink>(
            "SELECT room_id, schedule_id FROM rooms_to_schedule WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn create_teacher_link(&self, link: TeacherLink) -> StoreResult<()> {
        sqlx::query("INSERT INTO teachers_to_schedule (teacher_id, schedule_id) VALUES ($1, $2)")
            .bind(link.teacher_id)
            .bind(link.schedule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::classify(
                    e,
                    format!("teacher link {} -> {}", link.teacher_id, link.schedule_id),
                )
            })?;
        Ok(())
    }

    async fn create_room_link(&self, link: RoomLink) -> StoreResult<()> {
        sqlx::query("INSERT INTO rooms_to_schedule (room_id, schedule_id) VALUES ($1, $2)")
            .bind(link.room_id)
            .bind(link.schedule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::classify(
                    e,
                    format!("room link {} -> {}", link.room_id, link.schedule_id),
                )
            })?;
        Ok(())
    }

    async fn delete_links(&self, schedule_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM teachers_to_schedule WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM rooms_to_schedule WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
