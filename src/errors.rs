// src/errors.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    // --- Authentication/Authorization Errors ---
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email Taken")]
    EmailTaken,

    #[error("Password hashing failed: {0}")]
    PasswordHashingFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication framework error: {0}")]
    AuthError(String),

    // --- Database Errors ---
    #[error("Database query error: {0}")]
    DatabaseQueryError(String),

    #[error("Database pool error: {0}")]
    DbPoolError(String),

    #[error("Database interaction error (deadpool): {0}")]
    DbInteractError(String),

    #[error("Database migration error: {0}")]
    DbMigrationError(String),

    // --- Request/Input Errors ---
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("File upload error: {0}")]
    FileUploadError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("UUID Error: {0}")]
    UuidError(String),

    // --- Analysis Pipeline Errors ---
    /// The artifact reference handed to the pipeline is neither a readable
    /// file path nor valid inline base64 image data.
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Any failure calling the analysis provider (transport, quota,
    /// malformed or empty response, timeout).
    #[error("LLM API error: {0}")]
    LlmError(String),

    // --- General/Internal Errors ---
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("IO Error: {0}")]
    IoError(String),

    #[error("Serialization Error: {0}")]
    SerializationError(String),

    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // 4xx Client Errors
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
            AppError::EmailTaken => (
                StatusCode::CONFLICT,
                "Email is already registered".to_string(),
            ),
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid input: {msg}"))
            }
            AppError::FileUploadError(e) => {
                error!("File upload error: {}", e);
                (StatusCode::BAD_REQUEST, "File upload failed".to_string())
            }
            AppError::UuidError(e) => {
                error!("UUID error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid identifier format".to_string(),
                )
            }
            AppError::InvalidArtifact(e) => {
                error!("Invalid artifact: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Artifact is not a readable image".to_string(),
                )
            }
            AppError::AuthError(e) => {
                error!("Authentication framework error: {}", e);
                (StatusCode::UNAUTHORIZED, "Authentication error".to_string())
            }

            // 5xx Server Errors
            AppError::DatabaseQueryError(e) => {
                error!("Database query error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::DbPoolError(e) => {
                error!("Database pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database connection error".to_string(),
                )
            }
            AppError::DbInteractError(e) => {
                error!("Database interaction error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database task execution error".to_string(),
                )
            }
            AppError::DbMigrationError(e) => {
                error!("Database migration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database schema error".to_string(),
                )
            }
            AppError::PasswordHashingFailed(e) => {
                error!("Password hashing failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal security error".to_string(),
                )
            }
            AppError::ConfigError(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                )
            }
            AppError::IoError(e) => {
                error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "File system error".to_string(),
                )
            }
            AppError::SerializationError(e) => {
                error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Data formatting error".to_string(),
                )
            }
            AppError::LlmError(e) => {
                error!("LLM API error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AI service error".to_string(),
                )
            }
            AppError::InternalServerError(e) => {
                error!("Internal Server Error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// --- Convenience Result Type ---
pub type Result<T, E = AppError> = std::result::Result<T, E>;

// --- From implementations for common source errors ---

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::PasswordHashingFailed(err.to_string())
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                AppError::NotFound("Record not found".to_string())
            }
            _ => AppError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl From<deadpool_diesel::PoolError> for AppError {
    fn from(err: deadpool_diesel::PoolError) -> Self {
        AppError::DbPoolError(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for AppError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        AppError::DbInteractError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::FileUploadError(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::UuidError(err.to_string())
    }
}

impl From<genai::Error> for AppError {
    fn from(err: genai::Error) -> Self {
        AppError::LlmError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::WrongCredentials => AppError::InvalidCredentials,
            crate::auth::AuthError::EmailTaken => AppError::EmailTaken,
            crate::auth::AuthError::HashingError => {
                AppError::PasswordHashingFailed("Password hashing failed".to_string())
            }
            crate::auth::AuthError::UserNotFound => AppError::UserNotFound,
            crate::auth::AuthError::DatabaseError(s) => AppError::DatabaseQueryError(s),
            crate::auth::AuthError::PoolError(e) => AppError::DbPoolError(e.to_string()),
            crate::auth::AuthError::InteractError(s) => AppError::DbInteractError(s),
        }
    }
}

// --- Test Module ---
#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Response;
    use diesel::result::Error as DieselError;
    use serde_json::Value;
    use uuid::Uuid;

    // Helper to extract JSON body from response
    async fn get_body_json(response: Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        serde_json::from_slice(&body_bytes).expect("Failed to parse JSON body")
    }

    #[tokio::test]
    async fn test_internal_server_error_response() {
        let error = AppError::InternalServerError("Something went very wrong".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "An unexpected error occurred");
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let db_error = DieselError::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value violates unique constraint".to_string()),
        );
        let error = AppError::from(db_error);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Database error");
    }

    #[tokio::test]
    async fn test_diesel_not_found_maps_to_404() {
        let error = AppError::from(DieselError::NotFound);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let error = AppError::NotFound("Drawing 'abc' not found".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Drawing 'abc' not found");
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let error = AppError::Forbidden("Not a facilitator".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Not a facilitator");
    }

    #[tokio::test]
    async fn test_conflict_response() {
        let error = AppError::Conflict("Submission is already processing".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Submission is already processing");
    }

    #[tokio::test]
    async fn test_invalid_artifact_response() {
        let error = AppError::InvalidArtifact("neither path nor base64".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Artifact is not a readable image");
    }

    #[tokio::test]
    async fn test_llm_error_response_is_opaque() {
        let error = AppError::LlmError("quota exceeded for project 1234".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = get_body_json(response).await;
        // Provider details stay in the logs, not in the client response.
        assert_eq!(body["error"], "AI service error");
    }

    #[tokio::test]
    async fn test_uuid_error_response() {
        let inner_error = Uuid::try_parse("invalid-uuid").unwrap_err();
        let error = AppError::from(inner_error);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = get_body_json(response).await;
        assert_eq!(body["error"], "Invalid identifier format");
    }
}
