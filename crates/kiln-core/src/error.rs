//! Error types for the Kiln control plane.
//!
//! Every variant maps onto one of the [`ErrorKind`] categories, which in
//! turn decide retry policy and the HTTP status surfaced to clients.

use thiserror::Error;

/// Coarse error taxonomy shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing field, bad format, unknown service/module/action.
    Validation,
    /// Unique key already taken.
    Conflict,
    /// Tenant, user, certificate (...) absent.
    NotFound,
    /// Missing or invalid credentials.
    Authentication,
    /// Access denied by the authorization model.
    Authorization,
    /// Key generation, signing or parsing failure.
    Crypto,
    /// Store down, external process failure.
    External,
    /// Invariant violation or mis-initialization.
    Internal,
}

#[derive(Debug, Error)]
pub enum KilnError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity} ({key})")]
    AlreadyExists { entity: String, key: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Invalid claim '{input}': {reason}")]
    ClaimParse { input: String, reason: String },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unknown module {module} in service {service}")]
    UnknownModule { service: String, module: String },

    #[error("Action {action} is not allowed on {service}::{module}")]
    DisallowedAction {
        service: String,
        module: String,
        action: String,
    },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("External command failed: {command}: {stderr}")]
    External { command: String, stderr: String },

    #[error("Not implemented on this platform: {0}")]
    NotImplemented(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type KilnResult<T> = Result<T, KilnError>;

impl KilnError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(entity: impl Into<String>, key: impl ToString) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::Conflict,
            Self::Validation { .. }
            | Self::ClaimParse { .. }
            | Self::UnknownService(_)
            | Self::UnknownModule { .. }
            | Self::DisallowedAction { .. } => ErrorKind::Validation,
            Self::AuthenticationFailed { .. } => ErrorKind::Authentication,
            Self::AuthorizationDenied { .. } => ErrorKind::Authorization,
            Self::Certificate(_) | Self::Crypto(_) => ErrorKind::Crypto,
            Self::Database(_) | Self::External { .. } | Self::NotImplemented(_) => {
                ErrorKind::External
            }
            Self::Cancelled | Self::DeadlineExceeded | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case leaf code, e.g. `tenant_not_found`.
    pub fn code(&self) -> String {
        match self {
            Self::NotFound { entity, .. } => format!("{}_not_found", code_segment(entity)),
            Self::AlreadyExists { entity, .. } => {
                format!("{}_already_exists", code_segment(entity))
            }
            Self::Validation { .. } => "validation_failed".into(),
            Self::ClaimParse { .. } => "claim_parse_error".into(),
            Self::UnknownService(_) => "unknown_service".into(),
            Self::UnknownModule { .. } => "unknown_module".into(),
            Self::DisallowedAction { .. } => "disallowed_action".into(),
            Self::AuthenticationFailed { .. } => "unauthenticated".into(),
            Self::AuthorizationDenied { .. } => "forbidden".into(),
            Self::Database(_) => "database_error".into(),
            Self::Certificate(_) => "certificate_error".into(),
            Self::Crypto(_) => "crypto_error".into(),
            Self::External { .. } => "external_command_failed".into(),
            Self::NotImplemented(_) => "not_implemented".into(),
            Self::Cancelled => "cancelled".into(),
            Self::DeadlineExceeded => "deadline_exceeded".into(),
            Self::Internal(_) => "internal_error".into(),
        }
    }

    /// Whether the error is a unique-key conflict.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn code_segment(entity: &str) -> String {
    entity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
