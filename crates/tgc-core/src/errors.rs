use std::time::Duration;

use crate::domain::{ChannelId, JobId};

/// Core error type for the cloner.
///
/// Adapter crates map their specific failures into [`TransportError`]; the pipeline
/// decides per call site whether a failure is fatal to the job or only to one message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot resolve channel {channel}: {source}")]
    EntityResolution {
        channel: ChannelId,
        #[source]
        source: TransportError,
    },

    #[error("history fetch failed: {0}")]
    Fetch(#[source] TransportError),

    #[error("emission failed for message {message_id}: {source}")]
    Emission {
        message_id: i64,
        #[source]
        source: TransportError,
    },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`ChannelTransport`](crate::transport::ChannelTransport).
///
/// `Throttled` is the only recoverable variant: callers wait `retry_after` and
/// re-issue the identical request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("throttled, retry after {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("session not authorized: {0}")]
    Unauthorized(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),
}
