//! Typed error handling for the rudder engine
//!
//! Every failure an endpoint can surface maps onto one [`EngineError`]
//! variant, and every variant carries a stable HTTP status and machine error
//! code. Handlers return `EngineError` directly; axum turns it into a uniform
//! JSON error body via [`IntoResponse`].
//!
//! # Example
//!
//! ```rust,ignore
//! use rudder::prelude::*;
//!
//! async fn fetch(store: &dyn EntityStore, id: Uuid) -> EngineResult<Resource> {
//!     store.get("article", &id).await?.ok_or(EngineError::NotFound {
//!         resource_type: "article".to_string(),
//!         id,
//!     })
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::core::binding::FieldErrors;
use crate::core::policy::Verdict;

/// The main error type for the rudder engine
#[derive(Debug)]
pub enum EngineError {
    /// The operation requires an authenticated actor (401)
    AuthenticationRequired { reason: String },

    /// The actor is authenticated but not permitted (403)
    Forbidden { reason: String },

    /// Resource was not found, or is invisible to this actor (404)
    NotFound { resource_type: String, id: Uuid },

    /// Submitted data failed validation (400)
    ///
    /// Carries the field-keyed errors and the raw submitted values so a form
    /// renderer can re-display the user's input.
    ValidationFailed {
        errors: FieldErrors,
        values: serde_json::Map<String, serde_json::Value>,
    },

    /// A unique-field constraint was violated (400, reported per-field)
    UniquenessViolation { resource_type: String, field: String },

    /// Route or resource type is not registered (404)
    UnknownResourceType { resource_type: String },

    /// Malformed request — bad id, bad body, unsupported override (400)
    BadRequest { message: String },

    /// Configuration could not be loaded or is inconsistent (500)
    Config { message: String },

    /// The storage layer failed (500)
    Storage { message: String },

    /// View template rendering failed (500)
    Render { message: String },

    /// Internal engine errors that should not happen in normal operation
    Internal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AuthenticationRequired { reason } => {
                write!(f, "Authentication required: {}", reason)
            }
            EngineError::Forbidden { reason } => write!(f, "Forbidden: {}", reason),
            EngineError::NotFound { resource_type, id } => {
                write!(f, "{} with id '{}' not found", resource_type, id)
            }
            EngineError::ValidationFailed { errors, .. } => {
                let fields: Vec<&str> = errors.keys().map(|k| k.as_str()).collect();
                write!(f, "Validation failed for: {}", fields.join(", "))
            }
            EngineError::UniquenessViolation {
                resource_type,
                field,
            } => {
                write!(
                    f,
                    "A {} with this {} already exists",
                    resource_type, field
                )
            }
            EngineError::UnknownResourceType { resource_type } => {
                write!(f, "Unknown resource type: {}", resource_type)
            }
            EngineError::BadRequest { message } => write!(f, "Bad request: {}", message),
            EngineError::Config { message } => write!(f, "Configuration error: {}", message),
            EngineError::Storage { message } => write!(f, "Storage error: {}", message),
            EngineError::Render { message } => write!(f, "Render error: {}", message),
            EngineError::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for EngineError {}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Field-keyed validation messages, present only on validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::AuthenticationRequired { .. } => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden { .. } => StatusCode::FORBIDDEN,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            EngineError::UniquenessViolation { .. } => StatusCode::BAD_REQUEST,
            EngineError::UnknownResourceType { .. } => StatusCode::NOT_FOUND,
            EngineError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            EngineError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Render { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::AuthenticationRequired { .. } => "AUTHENTICATION_REQUIRED",
            EngineError::Forbidden { .. } => "FORBIDDEN",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::ValidationFailed { .. } => "VALIDATION_FAILED",
            EngineError::UniquenessViolation { .. } => "UNIQUENESS_VIOLATION",
            EngineError::UnknownResourceType { .. } => "UNKNOWN_RESOURCE_TYPE",
            EngineError::BadRequest { .. } => "BAD_REQUEST",
            EngineError::Config { .. } => "CONFIG_ERROR",
            EngineError::Storage { .. } => "STORAGE_ERROR",
            EngineError::Render { .. } => "RENDER_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build an error from a denied authorization verdict.
    ///
    /// An anonymous denial maps to 401, an authenticated one to 403; the
    /// verdict carries which applies.
    pub fn from_denied(verdict: &Verdict) -> Self {
        if verdict.error_code == 401 {
            EngineError::AuthenticationRequired {
                reason: verdict.reason.clone(),
            }
        } else {
            EngineError::Forbidden {
                reason: verdict.reason.clone(),
            }
        }
    }

    /// Convert to an error response body
    pub fn to_response(&self) -> ErrorResponse {
        let errors = match self {
            EngineError::ValidationFailed { errors, .. } => Some(errors.clone()),
            _ => None,
        };
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            errors,
            details: self.details(),
        }
    }

    /// Get additional details for the error
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::NotFound { resource_type, id } => Some(serde_json::json!({
                "resource_type": resource_type,
                "id": id.to_string()
            })),
            EngineError::ValidationFailed { values, .. } => Some(serde_json::json!({
                "values": values
            })),
            EngineError::UniquenessViolation { field, .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::BadRequest {
            message: format!("invalid JSON: {}", err),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Config {
            message: err.to_string(),
        }
    }
}

impl From<uuid::Error> for EngineError {
    fn from(err: uuid::Error) -> Self {
        EngineError::BadRequest {
            message: format!("invalid id: {}", err),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// A specialized Result type for rudder operations
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Tests
// =============================================================================
