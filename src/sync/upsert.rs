//! Get-or-create for reference entities, with per-pass memoisation.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::data::models::{NaturalKey, ReferenceKind};
use crate::data::{Store, StoreError, StoreResult};
use crate::timetable::normalize::NormalizedGrid;

/// Result of [`ensure_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing(Uuid),
    Created(Uuid),
}

impl EnsureOutcome {
    pub fn id(self) -> Uuid {
        match self {
            Self::Existing(id) | Self::Created(id) => id,
        }
    }
}

/// Look a reference up, creating it with a fresh id when missing.
///
/// A duplicate-key error on create means another writer got there first; the
/// row is looked up again and reported as existing.
pub async fn ensure_exists(store: &dyn Store, key: &NaturalKey) -> StoreResult<EnsureOutcome> {
    match store.find_reference(key).await {
        Ok(id) => return Ok(EnsureOutcome::Existing(id)),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let id = Uuid::new_v4();
    match store.create_reference(id, key).await {
        Ok(()) => {
            debug!(%key, %id, "Created reference");
            Ok(EnsureOutcome::Created(id))
        }
        Err(StoreError::Exists(_)) => store.find_reference(key).await.map(EnsureOutcome::Existing),
        Err(e) => Err(e),
    }
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub groups_seen: usize,
    pub groups_failed: usize,
    pub groups_created: usize,
    pub subjects_created: usize,
    pub types_created: usize,
    pub locations_created: usize,
    pub rooms_created: usize,
    pub teachers_created: usize,
    pub reference_failures: usize,
    pub cells_unchanged: usize,
    pub cells_changed: usize,
    /// Cells left untouched because their payload could not be read fully.
    pub cells_skipped: usize,
    pub schedules_inserted: usize,
    pub schedules_deleted: usize,
    pub lessons_failed: usize,
    pub normalize_issues: usize,
}

impl PassStats {
    pub fn record_created(&mut self, kind: ReferenceKind) {
        let counter = match kind {
            ReferenceKind::Group => &mut self.groups_created,
            ReferenceKind::Subject => &mut self.subjects_created,
            ReferenceKind::SubjectType => &mut self.types_created,
            ReferenceKind::Location => &mut self.locations_created,
            ReferenceKind::Room => &mut self.rooms_created,
            ReferenceKind::Teacher => &mut self.teachers_created,
        };
        *counter += 1;
    }

    pub fn references_created(&self) -> usize {
        self.groups_created
            + self.subjects_created
            + self.types_created
            + self.locations_created
            + self.rooms_created
            + self.teachers_created
    }

    /// Whether the pass wrote anything to the store.
    pub fn wrote_anything(&self) -> bool {
        self.references_created() > 0 || self.schedules_inserted > 0 || self.schedules_deleted > 0
    }
}

/// Reference ids resolved during a pass.
#[derive(Debug, Default)]
pub struct ReferenceIds {
    ids: HashMap<NaturalKey, Uuid>,
}

impl ReferenceIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &NaturalKey) -> Option<Uuid> {
        self.ids.get(key).copied()
    }

    /// Resolve `key`, creating it if needed. Memoised for the pass.
    pub async fn resolve(
        &mut self,
        store: &dyn Store,
        key: &NaturalKey,
        stats: &mut PassStats,
    ) -> StoreResult<Uuid> {
        if let Some(id) = self.get(key) {
            return Ok(id);
        }
        let outcome = ensure_exists(store, key).await?;
        if let EnsureOutcome::Created(_) = outcome {
            stats.record_created(key.kind());
        }
        self.ids.insert(key.clone(), outcome.id());
        Ok(outcome.id())
    }

    /// Resolve `key`, logging and counting a failure instead of returning it.
    pub async fn resolve_logged(
        &mut self,
        store: &dyn Store,
        key: &NaturalKey,
        stats: &mut PassStats,
    ) -> Option<Uuid> {
        match self.resolve(store, key, stats).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%key, error = %e, "Failed to ensure reference");
                stats.reference_failures += 1;
                None
            }
        }
    }
}

/// Every distinct reference key a grid mentions, in first-seen order.
pub fn grid_reference_keys(grid: &NormalizedGrid) -> IndexSet<NaturalKey> {
    let mut keys = IndexSet::new();
    for lesson in grid.lessons() {
        keys.insert(NaturalKey::Subject(lesson.subject.clone()));
        keys.insert(NaturalKey::SubjectType(lesson.kind.clone()));
        keys.insert(NaturalKey::Location(lesson.location.clone()));
        keys.extend(lesson.rooms.iter().cloned().map(NaturalKey::Room));
        keys.extend(lesson.teachers.iter().filter_map(|t| NaturalKey::teacher(t)));
    }
    keys
}

/// Ensure every reference of `grid` exists. Failures are logged per key.
pub async fn ensure_grid_references(
    store: &dyn Store,
    grid: &NormalizedGrid,
    ids: &mut ReferenceIds,
    stats: &mut PassStats,
) {
    for key in grid_reference_keys(grid) {
        ids.resolve_logged(store, &key, stats).await;
    }
}
