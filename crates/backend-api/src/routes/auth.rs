use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use gatehouse_auth::{IssuedToken, NewAccount};
use gatehouse_database::User;
use gatehouse_mailer::templates;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::{util::require_bearer, ApiError, AppState};

/// Returned by forgot-password regardless of whether the email exists. The
/// byte-identical body is what keeps account enumeration off the table.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: String,
    pub email_verified: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        Self {
            id: value.public_id,
            email: value.email,
            username: value.username,
            display_name: value.display_name,
            role: value.role.as_str().to_string(),
            email_verified: value.email_verified,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

impl From<User> for UserEnvelope {
    fn from(value: User) -> Self {
        Self { user: value.into() }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

impl SessionResponse {
    pub fn new(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at.to_rfc3339(),
            user: issued.user.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email dispatched", body = UserEnvelope),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse),
        (status = 429, description = "Rate limited", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let registration = state
        .authenticator()
        .register(NewAccount {
            email: payload.email,
            username: payload.username,
            display_name: payload.display_name,
            password: payload.password,
        })
        .await?;

    dispatch_verification_email(&state, &registration.user, &registration.verification_token)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope::from(registration.user)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 423, description = "Account temporarily locked", body = crate::error::ErrorResponse),
        (status = 429, description = "Rate limited", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let issued = state
        .authenticator()
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(SessionResponse::new(issued)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    state.authenticator().logout(&token).await?;

    Ok(Json(MessageResponse::new("Logged out.")))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh-token",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Fresh token issued, old token revoked", body = SessionResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    let issued = state.authenticator().refresh(&token).await?;

    Ok(Json(SessionResponse::new(issued)))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "The authenticated account", body = UserEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserEnvelope>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;

    Ok(Json(UserEnvelope::from(user)))
}

#[utoipa::path(
    delete,
    path = "/api/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account soft-deleted", body = MessageResponse),
        (status = 401, description = "Wrong password or not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;
    state
        .authenticator()
        .delete_account(user.id, &payload.password)
        .await?;

    Ok(Json(MessageResponse::new("Account deleted.")))
}

#[utoipa::path(
    post,
    path = "/api/auth/update-password",
    tag = "Auth",
    security(("bearerAuth" = [])),
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password changed, existing sessions stay valid", body = MessageResponse),
        (status = 400, description = "New password rejected", body = crate::error::ErrorResponse),
        (status = 401, description = "Wrong current password", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;
    state
        .authenticator()
        .update_password(user.id, &payload.current_password, &payload.new_password)
        .await?;

    Ok(Json(MessageResponse::new("Password updated.")))
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 202, description = "Accepted; the response does not reveal whether the email exists", body = MessageResponse),
        (status = 429, description = "Rate limited", body = crate::error::ErrorResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.enforce_rate_limit(&headers).await?;

    if let Some(reset) = state
        .authenticator()
        .request_password_reset(&payload.email)
        .await?
    {
        dispatch_reset_email(&state, &reset.user, &reset.token).await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced, outstanding sessions invalidated", body = MessageResponse),
        (status = 400, description = "Unknown, expired, or consumed token", body = crate::error::ErrorResponse),
        (status = 429, description = "Rate limited", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    state
        .authenticator()
        .reset_password(&payload.token, &payload.password)
        .await?;

    Ok(Json(MessageResponse::new("Password has been reset.")))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    tag = "Auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = UserEnvelope),
        (status = 400, description = "Unknown, expired, or consumed token", body = crate::error::ErrorResponse),
        (status = 429, description = "Rate limited", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let user = state.authenticator().verify_email(&payload.token).await?;

    Ok(Json(UserEnvelope::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Verification email re-sent", body = MessageResponse),
        (status = 400, description = "Email already verified", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 429, description = "Inside the resend cooldown", body = crate::error::ErrorResponse)
    )
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state.enforce_rate_limit(&headers).await?;

    let token = require_bearer(&headers)?;
    let (user, _claims) = state.authenticate(&token).await?;
    let resend = state.authenticator().resend_verification(user.id).await?;

    dispatch_verification_email(&state, &resend.user, &resend.token).await;

    Ok(Json(MessageResponse::new("Verification email sent.")))
}

/// Mail failures on these paths are logged, never surfaced: the HTTP
/// response must not change shape because SMTP hiccuped.
pub(crate) async fn dispatch_verification_email(state: &AppState, user: &User, token: &str) {
    let email = templates::verification(
        &user.email,
        &user.username,
        &state.api_config().link_base_url,
        token,
    );
    if let Err(err) = state.mailer().send(&email).await {
        error!(error = %err, user_id = user.id, "failed to send verification email");
    }
}

pub(crate) async fn dispatch_reset_email(state: &AppState, user: &User, token: &str) {
    let email = templates::password_reset(
        &user.email,
        &user.username,
        &state.api_config().link_base_url,
        token,
    );
    if let Err(err) = state.mailer().send(&email).await {
        error!(error = %err, user_id = user.id, "failed to send password reset email");
    }
}
