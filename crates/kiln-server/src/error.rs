//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kiln_bootstrap::BootstrapFailure;
use kiln_core::{ErrorKind, KilnError};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

/// A [`KilnError`] on its way to a client.
///
/// Body: `{"error": {"code", "message", "details"?}}`. Denials carry no
/// reason and server-side failures no internals.
#[derive(Debug)]
pub struct ApiError(pub KilnError);

impl<E: Into<KilnError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Crypto | ErrorKind::External | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = self.0;

        let message = match err.kind() {
            ErrorKind::Authorization => {
                debug!(error = %err, "Request denied");
                "access denied".to_string()
            }
            ErrorKind::Crypto | ErrorKind::External | ErrorKind::Internal => {
                error!(code = %err.code(), error = %err, "Request failed");
                "internal server error".to_string()
            }
            _ => err.to_string(),
        };

        let mut body = json!({
            "code": err.code(),
            "message": message,
        });
        if let KilnError::Validation {
            details: Some(details),
            ..
        } = &err
        {
            body["details"] = details.clone();
        }

        (status, Json(json!({ "error": body }))).into_response()
    }
}

/// Startup failures of the server binary.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Kiln(#[from] KilnError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapFailure),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
