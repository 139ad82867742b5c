//! Comprehensive error handling for the application

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    // Auth
    #[error("Authentication token required")]
    TokenRequired,

    #[error("Authentication token expired")]
    TokenExpired,

    #[error("Authentication token invalid")]
    TokenInvalid,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation
    #[error("Request validation failed")]
    ValidationFailed(ValidationErrors),

    #[error("Invalid request format")]
    InvalidRequestFormat(String),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field value: {field}")]
    InvalidFieldValue { field: String, message: String },

    // Resource errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Resource already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Resource conflict: {message}")]
    Conflict { message: String },

    // Rate limiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<u64> },

    // Platform/external adapter errors
    #[error("Platform authentication failed for {platform}")]
    PlatformAuthError { platform: String, message: String },

    #[error("Platform request failed transiently for {platform}")]
    PlatformTransient { platform: String, message: String },

    #[error("Platform returned unexpected or missing data for {platform}")]
    MissingPlatformData { platform: String, message: String },

    // Data integrity
    #[error("Data integrity violation: {message}")]
    DataIntegrityViolation { message: String },

    // Database errors
    #[error("Database connection failed")]
    DatabaseConnectionFailed,

    #[error("Database query failed")]
    DatabaseQueryFailed(sqlx::Error),

    #[error("Database constraint violation")]
    DatabaseConstraintViolation(String),

    // Redis errors
    #[error("Redis connection failed")]
    RedisConnectionFailed,

    #[error("Redis operation failed")]
    RedisOperationFailed(String),

    // Business logic
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },

    #[error("Operation not allowed: {reason}")]
    OperationNotAllowed { reason: String },

    // System
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal server error")]
    Internal { message: Option<String> },

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("JSON parsing error")]
    JsonParsingError(#[from] JsonRejection),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationFailed(_)
            | AppError::InvalidRequestFormat(_)
            | AppError::MissingField { .. }
            | AppError::InvalidFieldValue { .. }
            | AppError::JsonParsingError(_) => StatusCode::BAD_REQUEST,

            AppError::TokenRequired | AppError::TokenExpired | AppError::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }

            AppError::InsufficientPermissions => StatusCode::FORBIDDEN,

            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            AppError::AlreadyExists { .. }
            | AppError::Conflict { .. }
            | AppError::DatabaseConstraintViolation(_) => StatusCode::CONFLICT,

            AppError::BusinessRuleViolation { .. }
            | AppError::OperationNotAllowed { .. }
            | AppError::DataIntegrityViolation { .. }
            | AppError::MissingPlatformData { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            AppError::PlatformAuthError { .. } | AppError::PlatformTransient { .. } => {
                StatusCode::BAD_GATEWAY
            }

            AppError::ServiceUnavailable
            | AppError::DatabaseConnectionFailed
            | AppError::RedisConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::TokenRequired => "AUTH_TOKEN_REQUIRED",
            AppError::TokenExpired => "AUTH_TOKEN_EXPIRED",
            AppError::TokenInvalid => "AUTH_TOKEN_INVALID",
            AppError::InsufficientPermissions => "AUTH_INSUFFICIENT_PERMISSIONS",
            AppError::ValidationFailed(_) => "VALIDATION_FAILED",
            AppError::InvalidRequestFormat(_) => "INVALID_REQUEST_FORMAT",
            AppError::MissingField { .. } => "MISSING_FIELD",
            AppError::InvalidFieldValue { .. } => "INVALID_FIELD_VALUE",
            AppError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::AlreadyExists { .. } => "RESOURCE_ALREADY_EXISTS",
            AppError::Conflict { .. } => "RESOURCE_CONFLICT",
            AppError::RateLimitExceeded { .. } => "RATE_LIMITED",
            AppError::PlatformAuthError { .. } => "PLATFORM_AUTH_ERROR",
            AppError::PlatformTransient { .. } => "PLATFORM_TRANSIENT",
            AppError::MissingPlatformData { .. } => "MISSING_PLATFORM_DATA",
            AppError::DataIntegrityViolation { .. } => "DATA_INTEGRITY_VIOLATION",
            AppError::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            AppError::DatabaseQueryFailed(_) => "DATABASE_QUERY_FAILED",
            AppError::DatabaseConstraintViolation(_) => "DATABASE_CONSTRAINT_VIOLATION",
            AppError::RedisConnectionFailed => "REDIS_CONNECTION_FAILED",
            AppError::RedisOperationFailed(_) => "REDIS_OPERATION_FAILED",
            AppError::BusinessRuleViolation { .. } => "BUSINESS_RULE_VIOLATION",
            AppError::OperationNotAllowed { .. } => "OPERATION_NOT_ALLOWED",
            AppError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
            AppError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            AppError::JsonParsingError(_) => "JSON_PARSING_ERROR",
        }
    }

    /// Get user-friendly message for this error
    pub fn user_message(&self) -> String {
        match self {
            AppError::TokenRequired => "Authentication required".to_string(),
            AppError::TokenExpired => "Session expired, please reconnect".to_string(),
            AppError::TokenInvalid => "Invalid authentication token".to_string(),
            AppError::InsufficientPermissions => {
                "You don't have permission to perform this action".to_string()
            }
            AppError::ValidationFailed(_) => "Please check your input and try again".to_string(),
            AppError::InvalidRequestFormat(msg) => format!("Invalid request format: {}", msg),
            AppError::MissingField { field } => format!("Missing required field: {}", field),
            AppError::InvalidFieldValue { field, message } => {
                format!("Invalid value for {}: {}", field, message)
            }
            AppError::NotFound { resource } => format!("{} not found", resource),
            AppError::AlreadyExists { resource } => format!("{} already exists", resource),
            AppError::Conflict { message } => message.clone(),
            AppError::RateLimitExceeded { .. } => {
                "Too many requests, please try again later".to_string()
            }
            AppError::PlatformAuthError { platform, .. } => {
                format!("Reconnect your {} account to continue", platform)
            }
            AppError::PlatformTransient { platform, .. } => {
                format!("{} is temporarily unavailable, retrying", platform)
            }
            AppError::MissingPlatformData { platform, .. } => {
                format!("{} did not return expected data", platform)
            }
            AppError::DataIntegrityViolation { message } => message.clone(),
            AppError::BusinessRuleViolation { rule } => format!("Business rule violation: {}", rule),
            AppError::OperationNotAllowed { reason } => format!("Operation not allowed: {}", reason),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Get error details for debugging
    pub fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ValidationFailed(errors) => {
                let mut details = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "Invalid value".to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::RateLimitExceeded { retry_after } => Some(json!({
                "retry_after_seconds": retry_after
            })),
            AppError::DatabaseQueryFailed(e) => Some(json!({
                "database_error": e.to_string()
            })),
            AppError::PlatformAuthError { message, .. }
            | AppError::PlatformTransient { message, .. }
            | AppError::MissingPlatformData { message, .. } => Some(json!({
                "platform_message": message
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let user_message = self.user_message();
        let details = self.error_details();

        match &self {
            AppError::Internal { .. }
            | AppError::DatabaseConnectionFailed
            | AppError::DatabaseQueryFailed(_)
            | AppError::RedisConnectionFailed
            | AppError::RedisOperationFailed(_)
            | AppError::ConfigurationError { .. }
            | AppError::ServiceUnavailable => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Server error occurred"
                );
            }
            AppError::PlatformAuthError { platform, .. }
            | AppError::PlatformTransient { platform, .. }
            | AppError::MissingPlatformData { platform, .. } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    platform = %platform,
                    error = %self,
                    "Platform adapter error"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Client error occurred"
                );
            }
        }

        let error_response = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: user_message,
            details,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::DatabaseConstraintViolation("Unique constraint violation".to_string())
                } else if db_err.is_foreign_key_violation() {
                    AppError::DatabaseConstraintViolation(
                        "Foreign key constraint violation".to_string(),
                    )
                } else if db_err.is_check_violation() {
                    AppError::DatabaseConstraintViolation("Check constraint violation".to_string())
                } else {
                    AppError::DatabaseQueryFailed(err)
                }
            }
            sqlx::Error::RowNotFound => AppError::NotFound {
                resource: "Resource".to_string(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                AppError::DatabaseConnectionFailed
            }
            _ => AppError::DatabaseQueryFailed(err),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => AppError::RedisConnectionFailed,
            redis::ErrorKind::AuthenticationFailed => AppError::RedisConnectionFailed,
            _ => AppError::RedisOperationFailed(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::ValidationFailed(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequestFormat(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidToken => AppError::TokenInvalid,
            _ => AppError::Internal {
                message: Some(format!("JWT error: {}", err)),
            },
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Internal {
            message: Some(format!("UUID parsing error: {}", err)),
        }
    }
}

/// Result type alias for application errors
pub type Result<T> = std::result::Result<T, AppError>;
