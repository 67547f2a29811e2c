//! Typed services over the gateway.
//!
//! [`AuthService`] owns the session lifecycle; [`TimetableService`] reads and
//! generates timetables. Neither ever touches credentials directly.

mod auth;
mod timetable;

pub use auth::AuthService;
pub use timetable::TimetableService;

use crate::gateway::{ApiResponse, GatewayError};
use crate::validation::ValidationErrors;

/// Shown when a call ends in `401` after any renewal attempt.
pub const UNAUTHORIZED_MESSAGE: &str = "Session expired or not logged in. Run `timegen login`.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Session expired or not logged in. Run `timegen login`.")]
    Unauthorized,

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The server accepted the call but the session could not be persisted.
    #[error("failed to save session: {0:#}")]
    Session(anyhow::Error),
}

impl ApiError {
    /// Builds a status error from a failed response, falling back to `default` for the message.
    pub(crate) fn from_response(response: &ApiResponse, default: &str) -> Self {
        Self::Status {
            status: response.status().as_u16(),
            message: response
                .error_message()
                .unwrap_or_else(|| default.to_string()),
        }
    }
}

/// Maps a gateway response of an authenticated call to `Ok(response)` or an error.
pub(crate) fn ensure_authorized(response: ApiResponse, default: &str) -> Result<ApiResponse, ApiError> {
    if response.is_unauthorized() {
        return Err(ApiError::Unauthorized);
    }
    if !response.is_success() {
        return Err(ApiError::from_response(&response, default));
    }
    Ok(response)
}
