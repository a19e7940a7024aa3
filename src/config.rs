//! Configuration loaded from `timetable.toml` and the environment.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};

use crate::sync::scheduler::effective_interval;
use crate::timetable::SlotTable;
use crate::timetable::slots::DEFAULT_SLOT_TIMES;

pub const CONFIG_FILE: &str = "timetable.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    /// Per-request timeout for upstream calls.
    #[serde(default = "default_request_timeout", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    /// Upstream requests per second.
    #[serde(default = "default_upstream_rate_limit")]
    pub upstream_rate_limit: u32,
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: i64,
    /// Optional `HH:MM-HH:MM,...` override of the slot table.
    #[serde(default)]
    pub slot_times: Option<String>,
    /// Timezone used to infer the year of session dates.
    #[serde(default = "default_upstream_timezone")]
    pub upstream_timezone: String,
    #[serde(default = "default_schedule_cache_ttl", deserialize_with = "deserialize_duration")]
    pub schedule_cache_ttl: Duration,
    /// Grace period for services to stop after a shutdown signal.
    #[serde(default = "default_shutdown_timeout", deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upstream_base_url() -> String {
    "https://rasp.dmami.ru".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upstream_rate_limit() -> u32 {
    5
}

fn default_sync_interval_minutes() -> i64 {
    10
}

fn default_upstream_timezone() -> String {
    "Europe/Moscow".to_string()
}

fn default_schedule_cache_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

impl Config {
    /// Figment with the config file (if any) overlaid by raw env vars.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::figment().extract().context("Failed to load config")
    }

    pub fn slot_table(&self) -> anyhow::Result<SlotTable> {
        let spec = self.slot_times.as_deref().unwrap_or(DEFAULT_SLOT_TIMES);
        SlotTable::parse(spec).with_context(|| format!("invalid SLOT_TIMES {spec:?}"))
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.upstream_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid UPSTREAM_TIMEZONE {:?}: {e}", self.upstream_timezone))
    }

    pub fn sync_interval(&self) -> Duration {
        effective_interval(self.sync_interval_minutes)
    }
}

static DURATION_PARSER: LazyLock<DurationParser<'static>> = LazyLock::new(|| {
    DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ])
});

/// Parse `"30s"`, `"500ms"`, `"2m"` and friends.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parsed = DURATION_PARSER
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration {raw:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

/// Accepts either a fundu duration string or a bare number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
