// src/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::RequestStatus;

/// Field name -> list of human readable problems with that field.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    ValidationFailed(FieldErrors),
    InvalidTransition { from: RequestStatus, to: RequestStatus },
    CatalogUnavailable(String),
    PersistenceFailed(String),
    InternalServerError(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationFailed(errors) => {
                let fields = errors.keys().cloned().collect::<Vec<_>>().join(", ");
                write!(f, "Validation failed for: {}", fields)
            }
            ApiError::InvalidTransition { from, to } => {
                write!(f, "Invalid status transition from {} to {}", from, to)
            }
            ApiError::CatalogUnavailable(msg) => write!(f, "Catalog unavailable: {}", msg),
            ApiError::PersistenceFailed(msg) => write!(f, "Persistence failed: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Message safe to show to API consumers. Infrastructure failures never expose
    /// the underlying driver error.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::CatalogUnavailable(_) => {
                "The catalog is temporarily unavailable. Please try again shortly.".to_string()
            }
            ApiError::PersistenceFailed(_) => {
                "We could not process your request right now. Please try again.".to_string()
            }
            ApiError::DatabaseError(_) | ApiError::InternalServerError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::CatalogUnavailable(_) | ApiError::PersistenceFailed(_))
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.public_message(),
            errors: self.field_errors().cloned(),
            retryable: self.is_retryable(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(error_response),
            ApiError::ValidationFailed(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::InvalidTransition { .. } => HttpResponse::Conflict().json(error_response),
            ApiError::CatalogUnavailable(_) | ApiError::PersistenceFailed(_) => {
                HttpResponse::ServiceUnavailable().json(error_response)
            }
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationFailed(field_errors_from(&err))
    }
}

/// Flattens `validator` output into the field map returned to clients.
pub fn field_errors_from(err: &validator::ValidationErrors) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, field_errors) in err.field_errors() {
        let messages = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
            .collect::<Vec<_>>();
        errors.entry(field.to_string()).or_default().extend(messages);
    }
    errors
}

impl ApiError {
    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn material_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Material with ID '{}' not found", id))
    }

    pub fn request_not_found() -> Self {
        ApiError::NotFound("Request not found".to_string())
    }

    pub fn industry_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Industry '{}' not found", id))
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::ValidationFailed(errors)
    }

    pub fn catalog_unavailable(err: sqlx::Error) -> Self {
        log::error!("Catalog query failed: {}", err);
        ApiError::CatalogUnavailable(err.to_string())
    }

    pub fn persistence_failed(err: sqlx::Error) -> Self {
        log::error!("Request ledger operation failed: {}", err);
        ApiError::PersistenceFailed(err.to_string())
    }
}
