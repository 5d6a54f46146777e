//! Gatehouse authentication core.
//!
//! The [`Authenticator`] owns signup, credential checks, JWT lifecycle,
//! and the failed-login lockout policy. Password-reset and verification
//! flows live in [`recovery`](crate::recovery); the storage layer is the
//! repository set from `gatehouse-database`.

mod jwt;
mod password;
mod recovery;
mod validation;

pub use jwt::{Claims, IssuedJwt, JwtManager};
pub use recovery::{PasswordReset, VerificationResend, VerificationStatus};

use chrono::{DateTime, Utc};
use gatehouse_config::AuthConfig;
use gatehouse_database::{
    CreateUserRequest, RevocationRepository, TokenError, TokenPurpose, TokenRepository, User,
    UserError, UserRepository,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is temporarily locked")]
    AccountLocked,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("unauthorized")]
    Unauthorized,
    #[error("too many requests")]
    RateLimited,
    #[error("database error: {0}")]
    Database(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("token encoding failed: {0}")]
    TokenEncoding(String),
}

impl From<UserError> for AuthError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::EmailAlreadyExists => AuthError::DuplicateEmail,
            UserError::UsernameAlreadyExists => {
                AuthError::Validation("Username is already taken".to_string())
            }
            UserError::UserNotFound => AuthError::Unauthorized,
            UserError::DatabaseError(message) | UserError::SerializationError(message) => {
                AuthError::Database(message)
            }
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidTimestamp(message) | TokenError::DatabaseError(message) => {
                AuthError::Database(message)
            }
        }
    }
}

/// Signup payload, already shaped by the HTTP layer
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

/// Result of a successful registration. The verification token is raw
/// and exists solely for email dispatch.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub verification_token: String,
}

/// A signed access token plus the account it belongs to
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    users: UserRepository,
    tokens: TokenRepository,
    revocations: RevocationRepository,
    jwt: JwtManager,
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            tokens: TokenRepository::new(pool.clone()),
            revocations: RevocationRepository::new(pool.clone()),
            jwt: JwtManager::from_config(&config),
            pool,
            config,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub(crate) fn users(&self) -> &UserRepository {
        &self.users
    }

    pub(crate) fn tokens(&self) -> &TokenRepository {
        &self.tokens
    }

    pub(crate) fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create an account and mint its email-verification token
    pub async fn register(&self, account: NewAccount) -> Result<Registration, AuthError> {
        let email = account.email.trim().to_lowercase();
        validation::validate_email(&email)?;
        validation::validate_username(&account.username)?;
        if let Some(display_name) = &account.display_name {
            validation::validate_display_name(display_name)?;
        }
        validation::validate_password(&account.password)?;

        if self.users.email_exists(&email).await? {
            return Err(AuthError::DuplicateEmail);
        }
        if self.users.username_exists(&account.username).await? {
            return Err(AuthError::Validation(
                "Username is already taken".to_string(),
            ));
        }

        let password_hash = password::hash_password(&account.password)?;

        // The UNIQUE constraints still backstop races past the pre-checks.
        let user = self
            .users
            .create(&CreateUserRequest {
                email,
                username: account.username,
                display_name: account.display_name,
                password_hash,
            })
            .await?;

        let verification_token = self
            .issue_action_token(
                user.id,
                TokenPurpose::EmailVerification,
                self.config.verification_token_ttl_seconds,
            )
            .await?;

        info!(user = %user.public_id, "account registered");
        Ok(Registration {
            user,
            verification_token,
        })
    }

    /// Check credentials and issue an access token.
    ///
    /// Unknown emails and wrong passwords are indistinguishable to the
    /// caller. A live lock wins over a correct password. Every mismatch
    /// funnels through one atomic counter update in the user row.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let email = email.trim().to_lowercase();

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if Self::is_locked(&user)? {
            return Err(AuthError::AccountLocked);
        }

        match password::verify_password(password, &user.password_hash) {
            Ok(()) => {}
            Err(AuthError::InvalidCredentials) => {
                let updated = self
                    .users
                    .record_failed_login(
                        user.id,
                        self.config.failed_login_window_seconds as i64,
                        self.config.max_failed_logins as i64,
                        self.config.lockout_seconds as i64,
                    )
                    .await?;
                if updated.failed_login_attempts >= self.config.max_failed_logins as i64 {
                    warn!(
                        user = %user.public_id,
                        attempts = updated.failed_login_attempts,
                        "account locked after repeated login failures"
                    );
                }
                return Err(AuthError::InvalidCredentials);
            }
            Err(other) => return Err(other),
        }

        self.users.record_successful_login(user.id).await?;
        info!(user = %user.public_id, "login succeeded");
        self.issue_for(&user)
    }

    /// Resolve a bearer token to its account.
    ///
    /// Checks, in order: signature/expiry/issuer/audience, the revocation
    /// denylist, the account row, and the credentials floor (tokens minted
    /// before the last password reset are dead).
    pub async fn authenticate(&self, token: &str) -> Result<(User, Claims), AuthError> {
        let claims = self.jwt.validate_token(token)?;

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(AuthError::Unauthorized);
        }

        let Some(user) = self.users.find_by_public_id(&claims.sub).await? else {
            return Err(AuthError::Unauthorized);
        };

        if let Some(changed_at) = &user.credentials_changed_at {
            let floor = recovery::parse_stored_timestamp(changed_at)?;
            if (claims.iat as i64) < floor.timestamp() {
                return Err(AuthError::Unauthorized);
            }
        }

        Ok((user, claims))
    }

    /// Revoke the presented token until its natural expiry
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let (user, claims) = self.authenticate(token).await?;
        let expires_at = jwt::expiry_of(&claims)?;

        self.revocations
            .revoke(&claims.jti, user.id, &expires_at.to_rfc3339())
            .await?;

        info!(user = %user.public_id, "session revoked");
        Ok(())
    }

    /// Rotate the presented token: revoke it, mint a fresh one
    pub async fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let (user, claims) = self.authenticate(token).await?;
        let expires_at = jwt::expiry_of(&claims)?;

        self.revocations
            .revoke(&claims.jti, user.id, &expires_at.to_rfc3339())
            .await?;

        self.issue_for(&user)
    }

    /// Change the password with the current one as proof. Outstanding
    /// sessions stay valid; only the reset flow invalidates them.
    pub async fn update_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };

        password::verify_password(current_password, &user.password_hash)?;
        validation::validate_password(new_password)?;

        let password_hash = password::hash_password(new_password)?;
        self.users.update_password(user_id, &password_hash).await?;

        info!(user = %user.public_id, "password updated");
        Ok(())
    }

    /// Soft-delete the account with the password as proof
    pub async fn delete_account(&self, user_id: i64, password: &str) -> Result<(), AuthError> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };

        password::verify_password(password, &user.password_hash)?;
        self.users.soft_delete(user_id).await?;

        info!(user = %user.public_id, "account deleted");
        Ok(())
    }

    /// The active account row
    pub async fn profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    fn issue_for(&self, user: &User) -> Result<IssuedToken, AuthError> {
        let issued = self.jwt.generate_token(&user.public_id, user.role.as_str())?;
        Ok(IssuedToken {
            token: issued.token,
            expires_at: issued.expires_at,
            user: user.clone(),
        })
    }

    fn is_locked(user: &User) -> Result<bool, AuthError> {
        let Some(locked_until) = &user.locked_until else {
            return Ok(false);
        };
        let until = recovery::parse_stored_timestamp(locked_until)?;
        Ok(until > Utc::now())
    }
}
