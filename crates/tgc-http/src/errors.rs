use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tgc_core::utils::iso_timestamp_utc;
use tracing::{error, warn};

/// Control-surface errors, rendered as `{error, status, timestamp}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tgc_core::Error> for ApiError {
    fn from(err: tgc_core::Error) -> Self {
        match err {
            tgc_core::Error::JobNotFound(id) => Self::NotFound(format!("job {id} not found")),
            tgc_core::Error::Config(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => {
                warn!(error = %msg, "rejected request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Internal(msg) => {
                error!(error = %msg, "internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": iso_timestamp_utc(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgc_core::domain::JobId;

    #[test]
    fn job_not_found_maps_to_404() {
        let err: ApiError = tgc_core::Error::JobNotFound(JobId("x".to_string())).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err: ApiError = tgc_core::Error::External("db password wrong".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
