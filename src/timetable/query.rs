//! Read-through access to a group's [`Week`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::slots::SlotTable;
use super::week::Week;
use super::ScheduleMode;
use crate::cache::{Cache, schedule_cache_key};
use crate::data::Store;

/// Serves projections from the cache, falling back to the store.
///
/// Cache failures degrade to a store read; they are never surfaced.
pub struct WeekQuery {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    slots: SlotTable,
    ttl: Duration,
}

impl WeekQuery {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, slots: SlotTable, ttl: Duration) -> Self {
        Self {
            store,
            cache,
            slots,
            ttl,
        }
    }

    pub async fn by_group(&self, group: &str, mode: ScheduleMode) -> Result<Week> {
        let key = schedule_cache_key(group, mode.is_session());

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Week>(&cached) {
                Ok(week) => {
                    debug!(key, "Schedule cache hit");
                    return Ok(week);
                }
                Err(e) => warn!(key, error = %e, "Discarding undecodable cached schedule"),
            },
            Ok(None) => debug!(key, "Schedule cache miss"),
            Err(e) => warn!(key, error = ?e, "Schedule cache read failed"),
        }

        let rows = self
            .store
            .schedules_by_group(group, mode.is_session())
            .await
            .with_context(|| format!("failed to load schedule of group {group}"))?;
        let week = Week::from_rows(&rows, mode, &self.slots);

        match serde_json::to_string(&week) {
            Ok(json) => {
                if let Err(e) = self.cache.set(&key, json, self.ttl).await {
                    warn!(key, error = ?e, "Schedule cache write failed");
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to encode schedule for cache"),
        }

        Ok(week)
    }
}
