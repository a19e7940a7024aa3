//! The ingestion pipeline: discover groups, fetch, normalize, diff, write.

pub mod scheduler;
pub mod upsert;
pub mod writer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::data::Store;
use crate::data::models::NaturalKey;
use crate::timetable::diff::plan_cells;
use crate::timetable::groups::discover_groups;
use crate::timetable::normalize::normalize;
use crate::timetable::week::Week;
use crate::timetable::{ScheduleMode, SlotTable};
use crate::upstream::TimetableSource;
use crate::utils::{fmt_duration, log_if_slow};
use upsert::{PassStats, ReferenceIds, ensure_grid_references};
use writer::Reconciler;

const SLOW_GROUP_THRESHOLD: Duration = Duration::from_secs(20);

/// Anything the scheduler can run once per tick.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self) -> Result<PassStats>;
}

/// Runs sync passes against one upstream and one store.
pub struct Syncer {
    source: Arc<dyn TimetableSource>,
    store: Arc<dyn Store>,
    slots: SlotTable,
    timezone: Tz,
}

impl Syncer {
    pub fn new(
        source: Arc<dyn TimetableSource>,
        store: Arc<dyn Store>,
        slots: SlotTable,
        timezone: Tz,
    ) -> Self {
        Self {
            source,
            store,
            slots,
            timezone,
        }
    }

    /// Year used for session dates that omit it, in the upstream's timezone.
    fn current_year(&self) -> i32 {
        Utc::now().with_timezone(&self.timezone).year()
    }

    /// Sync every group on the landing page, term then session, one at a time.
    ///
    /// Failing groups are logged and counted; only a failed discovery fails
    /// the pass.
    pub async fn sync_all(&self) -> Result<PassStats> {
        let start = Instant::now();
        let page = self
            .source
            .landing_page()
            .await
            .context("failed to fetch landing page")?;
        let groups = discover_groups(&page);
        if groups.is_empty() {
            warn!("No groups found on landing page");
        }

        let mut stats = PassStats {
            groups_seen: groups.len(),
            ..Default::default()
        };
        let mut ids = ReferenceIds::new();

        for group in &groups {
            ids.resolve_logged(self.store.as_ref(), &NaturalKey::Group(group.clone()), &mut stats)
                .await;
        }

        for group in &groups {
            for mode in ScheduleMode::ALL {
                if let Err(e) = self.sync_group_with(group, mode, &mut ids, &mut stats).await {
                    warn!(group, mode = mode.as_str(), error = ?e, "Group sync failed");
                    stats.groups_failed += 1;
                }
            }
        }

        info!(
            duration = fmt_duration(start.elapsed()),
            groups = stats.groups_seen,
            groups_failed = stats.groups_failed,
            references_created = stats.references_created(),
            teachers_created = stats.teachers_created,
            rooms_created = stats.rooms_created,
            inserted = stats.schedules_inserted,
            deleted = stats.schedules_deleted,
            cells_unchanged = stats.cells_unchanged,
            cells_changed = stats.cells_changed,
            cells_skipped = stats.cells_skipped,
            lessons_failed = stats.lessons_failed,
            normalize_issues = stats.normalize_issues,
            "Sync pass completed"
        );
        Ok(stats)
    }

    /// Sync a single group (both modes) outside of a full pass.
    pub async fn sync_group(&self, group: &str) -> Result<PassStats> {
        let mut stats = PassStats {
            groups_seen: 1,
            ..Default::default()
        };
        let mut ids = ReferenceIds::new();
        for mode in ScheduleMode::ALL {
            self.sync_group_with(group, mode, &mut ids, &mut stats)
                .await
                .with_context(|| format!("failed to sync {} schedule of {group}", mode.as_str()))?;
        }
        Ok(stats)
    }

    async fn sync_group_with(
        &self,
        group: &str,
        mode: ScheduleMode,
        ids: &mut ReferenceIds,
        stats: &mut PassStats,
    ) -> Result<()> {
        let start = Instant::now();
        let store = self.store.as_ref();

        let Some(response) = self.source.group_schedule(group, mode).await? else {
            debug!(group, mode = mode.as_str(), "No upstream schedule, leaving stored rows untouched");
            return Ok(());
        };

        let grid = normalize(&response.grid, mode, &self.slots, self.current_year());
        for issue in &grid.issues {
            debug!(group, mode = mode.as_str(), %issue, "Skipped part of upstream grid");
        }
        stats.normalize_issues += grid.issues.len();
        let unsettled = grid.unsettled_cells();
        if !unsettled.is_empty() {
            warn!(group, mode = mode.as_str(), cells = unsettled.len(), "Leaving cells with unreadable dates untouched");
            stats.cells_skipped += unsettled.len();
        }

        ensure_grid_references(store, &grid, ids, stats).await;

        let rows = store
            .schedules_by_group(group, mode.is_session())
            .await
            .context("failed to load stored schedule")?;
        let week = Week::from_rows(&rows, mode, &self.slots);

        let reconciler = Reconciler::new(store, &self.slots, group, mode);
        for plan in plan_cells(&grid, &week) {
            reconciler.apply(&plan, ids, stats).await;
        }

        log_if_slow(start, SLOW_GROUP_THRESHOLD, "group sync");
        Ok(())
    }
}

#[async_trait]
impl PassRunner for Syncer {
    async fn run_pass(&self) -> Result<PassStats> {
        self.sync_all().await
    }
}
