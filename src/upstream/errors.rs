//! Error types for the upstream timetable client.

use super::json::JsonDecodeError;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request to {url} failed")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("upstream returned HTTP {status} for {url}")]
    BadStatus { status: u16, url: String },
    #[error("failed to parse response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: JsonDecodeError,
    },
    #[error("upstream rejected group {group}: {message}")]
    Rejected { group: String, message: String },
    #[error("invalid upstream url")]
    InvalidUrl(#[from] url::ParseError),
}
