use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::submission::SubmissionStatus;

/// Request-level error taxonomy. Handlers return `Result<_, ApiError>` and
/// the mapping to a status code and JSON body lives here.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Recoverable input problem; `fields` names the offending question
    /// ids (or payload fields) so the client can highlight them.
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<String>,
    },

    /// Bot-check or fill-time failure. The message is deliberately generic:
    /// it must not disclose which check failed or any threshold.
    #[error("verification failed, please retry")]
    AbuseRejected,

    /// Decision attempted on an already-decided submission. Carries the
    /// authoritative current status so the admin client can resync.
    #[error("submission has already been reviewed")]
    DecisionConflict { current: SubmissionStatus },

    /// Another submit for the same survey and player is still in flight.
    #[error("a submission is already being processed")]
    SubmitInProgress,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("survey is closed")]
    SurveyClosed,

    #[error("submission limit reached, try again later")]
    RateLimited,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, fields: Vec<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation { message, fields } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "fields": fields }),
            ),
            ApiError::AbuseRejected => {
                (StatusCode::FORBIDDEN, json!({ "error": self.to_string() }))
            }
            ApiError::DecisionConflict { current } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "current_status": current }),
            ),
            ApiError::SubmitInProgress => {
                (StatusCode::CONFLICT, json!({ "error": self.to_string() }))
            }
            ApiError::NotFound(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.to_string() }))
            }
            ApiError::SurveyClosed => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": self.to_string() }),
            ),
            ApiError::Internal(err) => {
                // Detail goes to the log, never to the client.
                tracing::error!("internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
