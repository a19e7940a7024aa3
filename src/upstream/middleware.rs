//! HTTP middleware for the upstream client.

use std::time::{Duration, Instant};

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use tracing::{debug, trace, warn};

use crate::utils::fmt_duration;

/// Requests slower than this are logged at WARN.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(5);

/// Logs every upstream request with its status and latency.
pub struct TransactionLoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for TransactionLoggingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        trace!(method = %method, url = %url, "Sending upstream request");

        let start = Instant::now();
        let result = next.run(req, extensions).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) if response.status().is_success() => {
                if elapsed > SLOW_REQUEST_THRESHOLD {
                    warn!(
                        method = %method,
                        url = %url,
                        status = response.status().as_u16(),
                        duration = fmt_duration(elapsed),
                        "Slow upstream response"
                    );
                } else {
                    debug!(
                        method = %method,
                        url = %url,
                        status = response.status().as_u16(),
                        duration = fmt_duration(elapsed),
                        "Upstream response"
                    );
                }
            }
            Ok(response) => {
                warn!(
                    method = %method,
                    url = %url,
                    status = response.status().as_u16(),
                    duration = fmt_duration(elapsed),
                    "Upstream returned an error status"
                );
            }
            Err(error) => {
                warn!(
                    method = %method,
                    url = %url,
                    duration = fmt_duration(elapsed),
                    error = %error,
                    "Upstream request failed"
                );
            }
        }

        result
    }
}
