//! Errors surfaced by the auth handlers and their HTTP rendering.

use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{
    jwt::TokenError, password::PasswordError, repo::StoreError, validation::FieldError,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(Vec<FieldError>),
    #[error("request body rejected: {0}")]
    BadBody(String),
    #[error("username already exists")]
    UsernameTaken,
    #[error("phone number already registered")]
    PhoneTaken,
    #[error("unknown username")]
    InvalidUsername,
    #[error("password mismatch")]
    InvalidPassword,
    #[error("unauthorized")]
    Unauthorized,
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("password: {0}")]
    Password(#[from] PasswordError),
    #[error("token: {0}")]
    Token(#[from] TokenError),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadBody(e.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(e: FormRejection) -> Self {
        ApiError::BadBody(e.body_text())
    }
}

fn status_message(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": status.as_u16(), "message": message })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::BadBody(reason) => {
                warn!(%reason, "request body rejected");
                status_message(StatusCode::BAD_REQUEST, "Invalid request body")
            }
            ApiError::UsernameTaken => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": 400, "message": "Username already exists", "errors": [] })),
            )
                .into_response(),
            ApiError::PhoneTaken => {
                status_message(StatusCode::BAD_REQUEST, "Phone number already registered")
            }
            ApiError::InvalidUsername => status_message(StatusCode::BAD_REQUEST, "Invalid username"),
            ApiError::InvalidPassword => status_message(StatusCode::BAD_REQUEST, "Invalid password"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            ApiError::Store(_) | ApiError::Password(_) | ApiError::Token(_) => {
                error!(error = %self, "internal error");
                status_message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
            }
        }
    }
}
