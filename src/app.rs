use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::data::{PgStore, Store};
use crate::edit::{ScheduleEditor, ScheduleUpdate};
use crate::services::manager::ServiceManager;
use crate::services::signals::handle_shutdown_signals;
use crate::services::sync::SyncService;
use crate::sync::upsert::PassStats;
use crate::sync::{PassRunner, Syncer};
use crate::timetable::query::WeekQuery;
use crate::timetable::week::Week;
use crate::timetable::ScheduleMode;
use crate::upstream::{TimetableSource, UpstreamClient};
use crate::utils::fmt_duration;

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    syncer: Arc<Syncer>,
    service_manager: ServiceManager,
}

impl App {
    /// Connect to the database, run migrations and wire the pipeline.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 4,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "Database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let slots = config.slot_table()?;
        let timezone = config.timezone()?;
        let client = UpstreamClient::new(
            &config.upstream_base_url,
            config.request_timeout,
            config.upstream_rate_limit,
        )
        .context("Failed to create upstream client")?;
        info!(
            base_url = %client.base_url(),
            timeout = fmt_duration(config.request_timeout),
            rate_limit = config.upstream_rate_limit,
            slots = slots.len(),
            %timezone,
            "Upstream client configured"
        );

        let source: Arc<dyn TimetableSource> = Arc::new(client);
        let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let syncer = Arc::new(Syncer::new(source, store.clone(), slots, timezone));

        Ok(App {
            config,
            store,
            cache,
            syncer,
            service_manager: ServiceManager::new(),
        })
    }

    /// Register the sync service.
    pub fn setup_services(&mut self) {
        let interval = self.config.sync_interval();
        info!(interval = fmt_duration(interval), "Sync service configured");
        let runner: Arc<dyn PassRunner> = self.syncer.clone();
        self.service_manager
            .register_service(Box::new(SyncService::new(runner, interval)));
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }

    /// One full pass, or one group when `group` is given.
    pub async fn sync_once(&self, group: Option<&str>) -> anyhow::Result<PassStats> {
        match group {
            Some(group) => self.syncer.sync_group(group).await,
            None => self.syncer.sync_all().await,
        }
    }

    pub async fn show(&self, group: &str, mode: ScheduleMode) -> anyhow::Result<Week> {
        let slots = self.config.slot_table()?;
        let query = WeekQuery::new(
            self.store.clone(),
            self.cache.clone(),
            slots,
            self.config.schedule_cache_ttl,
        );
        query.by_group(group, mode).await
    }

    /// Apply a JSON update request read from `path` to schedule `id`.
    pub async fn update_from_file(&self, id: Uuid, path: &std::path::Path) -> anyhow::Result<()> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let request: ScheduleUpdate = crate::upstream::json::decode_json(&body)
            .with_context(|| format!("Invalid update request in {}", path.display()))?;
        let editor = ScheduleEditor::new(self.store.clone(), self.cache.clone());
        editor.update(id, &request).await?;
        Ok(())
    }
}
