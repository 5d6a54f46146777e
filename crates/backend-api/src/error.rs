use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatehouse_auth::AuthError;
use gatehouse_database::UserError;
use gatehouse_mailer::MailerError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// Wire shape of every error. Clients switch on `code`, not on the
/// human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "too many requests, slow down",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
            },
        });
        (self.status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match &error {
            AuthError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
            }
            AuthError::DuplicateEmail => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE_EMAIL", error.to_string())
            }
            AuthError::InvalidCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                error.to_string(),
            ),
            AuthError::AccountLocked => {
                Self::new(StatusCode::LOCKED, "ACCOUNT_LOCKED", error.to_string())
            }
            AuthError::InvalidOrExpiredToken => Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_OR_EXPIRED_TOKEN",
                error.to_string(),
            ),
            AuthError::Unauthorized => Self::unauthorized("authentication required"),
            AuthError::RateLimited => Self::rate_limited(),
            AuthError::Database(_) | AuthError::PasswordHash(_) | AuthError::TokenEncoding(_) => {
                error!(error = %error, "auth infrastructure error");
                Self::internal()
            }
        }
    }
}

impl From<UserError> for ApiError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::UserNotFound => Self::not_found("user not found"),
            UserError::EmailAlreadyExists | UserError::UsernameAlreadyExists => {
                Self::validation(error.to_string())
            }
            UserError::DatabaseError(_) | UserError::SerializationError(_) => {
                error!(error = %error, "settings infrastructure error");
                Self::internal()
            }
        }
    }
}

impl From<MailerError> for ApiError {
    fn from(error: MailerError) -> Self {
        error!(error = %error, "smtp dispatch error");
        Self::new(
            StatusCode::BAD_GATEWAY,
            "SMTP_FAILURE",
            "failed to send email",
        )
    }
}
