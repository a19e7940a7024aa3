//! Client for the upstream timetable site.
//!
//! Requests are sequential and a shared rate limiter gates every one of them.

pub mod errors;
pub mod json;
pub mod middleware;
pub mod models;

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::REFERER;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::debug;
use url::Url;

pub use errors::UpstreamError;
pub use models::{GroupResponse, NO_SCHEDULE_MESSAGE, RawAuditory, RawGrid, RawLesson};

use crate::timetable::ScheduleMode;
use middleware::TransactionLoggingMiddleware;

/// Anything that can serve the landing page and per-group schedules.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    /// Raw bytes of the landing page, used for group discovery.
    async fn landing_page(&self) -> Result<Vec<u8>, UpstreamError>;

    /// Schedule of one group, or `None` when upstream has none for `mode`.
    async fn group_schedule(
        &self,
        group: &str,
        mode: ScheduleMode,
    ) -> Result<Option<GroupResponse>, UpstreamError>;
}

pub struct UpstreamClient {
    http: ClientWithMiddleware,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration, requests_per_second: u32) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("invalid upstream base url")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let http = ClientBuilder::new(client)
            .with(TransactionLoggingMiddleware)
            .build();

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            http,
            base_url,
            limiter,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn group_url(&self, group: &str, mode: ScheduleMode) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.join("site/group")?;
        url.query_pairs_mut()
            .append_pair("group", group)
            .append_pair("session", mode.as_query());
        Ok(url)
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, UpstreamError> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(url.clone())
            .header(REFERER, self.base_url.as_str())
            .send()
            .await
            .map_err(|source| UpstreamError::RequestFailed {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::RequestFailed {
                url: url.to_string(),
                source: e.into(),
            })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl TimetableSource for UpstreamClient {
    async fn landing_page(&self) -> Result<Vec<u8>, UpstreamError> {
        self.get_bytes(self.base_url.clone()).await
    }

    async fn group_schedule(
        &self,
        group: &str,
        mode: ScheduleMode,
    ) -> Result<Option<GroupResponse>, UpstreamError> {
        let url = self.group_url(group, mode)?;
        let body = self.get_bytes(url.clone()).await?;
        let response: GroupResponse =
            json::decode_json(&body).map_err(|source| UpstreamError::ParseFailed {
                url: url.to_string(),
                source,
            })?;
        interpret_response(group, response)
    }
}

/// Translate upstream's status envelope into "schedule / none / rejected".
pub fn interpret_response(
    group: &str,
    response: GroupResponse,
) -> Result<Option<GroupResponse>, UpstreamError> {
    if response.is_ok() {
        return Ok(Some(response));
    }
    if response.message.trim() == NO_SCHEDULE_MESSAGE {
        debug!(group, "Upstream has no schedule for group");
        return Ok(None);
    }
    Err(UpstreamError::Rejected {
        group: group.to_string(),
        message: response.message,
    })
}
