use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Upload item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Document API (upload / create-document) errors.
///
/// The `Display` output is what ends up in an item's error message, so every
/// variant renders as a sentence a user can read.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Could not reach document service at {url}: {}", error_chain(.source))]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{message} (status {status})")]
    Status { status: u16, message: String },

    #[error("Invalid upload request")]
    InvalidRequest {
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response from document service")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },

    #[error("Upload cancelled")]
    Cancelled,
}

/// Render an error and its sources as `outer: inner: root`.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.ends_with(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Api(ApiError::Connection { .. }) => StatusCode::BAD_GATEWAY,
            ServiceError::Api(ApiError::Status { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::ItemNotFound { .. } => "item_not_found",
            ServiceError::Api(ApiError::Connection { .. }) => "document_api_connection",
            ServiceError::Api(ApiError::Status { .. }) => "document_api_status",
            ServiceError::Api(ApiError::InvalidRequest { .. }) => "document_api_invalid_request",
            ServiceError::Api(ApiError::InvalidResponse { .. }) => "document_api_invalid_response",
            ServiceError::Api(ApiError::Cancelled) => "cancelled",
            ServiceError::FileTooLarge { .. } => "file_too_large",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
