use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{executor::ExecError, properties_store::PropertiesError};

const MAX_MESSAGE_BYTES: usize = 32 * 1024;
const MAX_HINT_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let suffix = "…(truncated)";
    let keep = max_bytes.saturating_sub(suffix.len()).max(1);
    let mut end = keep.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    let mut out = s[..end].to_string();
    out.push_str(suffix);
    out
}

/// Joins an error and its sources, skipping empty and repeated messages.
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = Vec::<String>::new();
    let mut cur = Some(err);
    while let Some(e) = cur {
        let s = e.to_string();
        if !s.is_empty() && parts.last() != Some(&s) {
            parts.push(s);
        }
        cur = e.source();
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

impl ErrorPayload {
    pub fn new(code: &str, message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            code: code.to_string(),
            message: truncate_utf8(&message.into(), MAX_MESSAGE_BYTES),
            hint: hint.map(|h| truncate_utf8(&h, MAX_HINT_BYTES)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Properties(#[from] PropertiesError),
    #[error("{0} not found")]
    NotFound(String),
}

impl ApiError {
    fn status_and_payload(&self) -> (StatusCode, ErrorPayload) {
        let message = format_error_chain(self);
        match self {
            ApiError::Exec(ExecError::NotAllowed(_)) => (
                StatusCode::BAD_REQUEST,
                ErrorPayload::new(
                    "command_not_allowed",
                    message,
                    Some("Only commands on this agent's allow-list can be run.".to_string()),
                ),
            ),
            ApiError::Exec(ExecError::Timeout { .. }) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorPayload::new(
                    "command_timeout",
                    message,
                    Some("The mscs process was killed; check the server before retrying.".to_string()),
                ),
            ),
            ApiError::Exec(ExecError::Failed { .. }) => (
                StatusCode::BAD_GATEWAY,
                ErrorPayload::new(
                    "command_failed",
                    message,
                    Some("Check the agent log for the mscs error output.".to_string()),
                ),
            ),
            ApiError::Exec(ExecError::Io { .. }) => (
                StatusCode::BAD_GATEWAY,
                ErrorPayload::new(
                    "command_failed",
                    message,
                    Some("Ensure MSCS_PATH points at an executable mscs.".to_string()),
                ),
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorPayload::new("not_found", message, None)),
            ApiError::Properties(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorPayload::new("internal", message, None),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, payload) = self.status_and_payload();
        if status.is_server_error() {
            tracing::error!(code = %payload.code, message = %payload.message, "request failed");
        }
        (status, Json(payload)).into_response()
    }
}
