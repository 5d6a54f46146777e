//! Password-reset and email-verification flows.
//!
//! Both flows ride on opaque single-use action tokens: 32 random bytes,
//! base64url encoded, with only the SHA-256 digest stored. The raw value
//! exists in memory just long enough to be mailed out.

use crate::{password, validation, AuthError, Authenticator};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use gatehouse_database::{TokenPurpose, User};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// A granted password-reset request: the raw token travels to the inbox,
/// never to the caller of the HTTP operation.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub user: User,
    pub token: String,
}

/// A freshly (re)issued verification token for dispatch
#[derive(Debug, Clone)]
pub struct VerificationResend {
    pub user: User,
    pub token: String,
}

/// Verification state for the settings surface
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatus {
    pub email: String,
    pub verified: bool,
    pub pending: bool,
    pub cooldown_remaining_seconds: u64,
}

impl Authenticator {
    /// Begin a password reset. Unknown or deleted emails return `Ok(None)`
    /// so callers can answer exactly as they would for a known address.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordReset>, AuthError> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.users().find_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(None);
        };

        let token = self
            .issue_action_token(
                user.id,
                TokenPurpose::PasswordReset,
                self.config().reset_token_ttl_seconds,
            )
            .await?;

        info!(user = %user.public_id, "password reset token issued");
        Ok(Some(PasswordReset { user, token }))
    }

    /// Redeem a reset token. Unknown, already-consumed, and expired tokens
    /// are indistinguishable. The token is burned only after the new
    /// password passes validation, so a weak password can be retried.
    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let token_hash = hash_action_token(raw_token);
        let Some(record) = self
            .tokens()
            .find_valid(&token_hash, TokenPurpose::PasswordReset)
            .await?
        else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        validation::validate_password(new_password)?;
        let password_hash = password::hash_password(new_password)?;

        if !self.tokens().consume(record.id).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.users()
            .reset_password(record.user_id, &password_hash)
            .await?;

        let user = self
            .users()
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        info!(user = %user.public_id, "password reset completed");
        Ok(user)
    }

    /// Redeem an email-verification token
    pub async fn verify_email(&self, raw_token: &str) -> Result<User, AuthError> {
        let token_hash = hash_action_token(raw_token);
        let Some(record) = self
            .tokens()
            .find_valid(&token_hash, TokenPurpose::EmailVerification)
            .await?
        else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        if !self.tokens().consume(record.id).await? {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.users().verify_email(record.user_id).await?;

        let user = self
            .users()
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        info!(user = %user.public_id, "email verified");
        Ok(user)
    }

    /// Re-issue the verification token, subject to the resend cooldown
    pub async fn resend_verification(
        &self,
        user_id: i64,
    ) -> Result<VerificationResend, AuthError> {
        let Some(user) = self.users().find_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };

        if user.email_verified {
            return Err(AuthError::Validation(
                "Email is already verified".to_string(),
            ));
        }

        if let Some(previous) = self
            .tokens()
            .latest_for_user(user_id, TokenPurpose::EmailVerification)
            .await?
        {
            let issued_at = parse_stored_timestamp(&previous.created_at)?;
            let cooldown = Duration::seconds(self.config().resend_cooldown_seconds as i64);
            if Utc::now() - issued_at < cooldown {
                return Err(AuthError::RateLimited);
            }
        }

        let token = self
            .issue_action_token(
                user_id,
                TokenPurpose::EmailVerification,
                self.config().verification_token_ttl_seconds,
            )
            .await?;

        Ok(VerificationResend { user, token })
    }

    /// Verification state plus remaining resend cooldown
    pub async fn verification_status(&self, user_id: i64) -> Result<VerificationStatus, AuthError> {
        let Some(user) = self.users().find_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };

        let mut pending = false;
        let mut cooldown_remaining_seconds = 0u64;

        if !user.email_verified {
            if let Some(latest) = self
                .tokens()
                .latest_for_user(user_id, TokenPurpose::EmailVerification)
                .await?
            {
                let now = Utc::now();
                pending = parse_stored_timestamp(&latest.expires_at)? > now;

                let issued_at = parse_stored_timestamp(&latest.created_at)?;
                let elapsed = (now - issued_at).num_seconds().max(0) as u64;
                cooldown_remaining_seconds = self
                    .config()
                    .resend_cooldown_seconds
                    .saturating_sub(elapsed);
            }
        }

        Ok(VerificationStatus {
            email: user.email,
            verified: user.email_verified,
            pending,
            cooldown_remaining_seconds,
        })
    }

    /// Mint, store, and hand back a raw action token
    pub(crate) async fn issue_action_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        ttl_seconds: u64,
    ) -> Result<String, AuthError> {
        let raw = generate_action_token();
        let token_hash = hash_action_token(&raw);
        let expires_at = (Utc::now() + Duration::seconds(ttl_seconds as i64)).to_rfc3339();

        self.tokens()
            .issue(user_id, purpose, &token_hash, &expires_at)
            .await?;

        Ok(raw)
    }
}

/// 32 random bytes, base64url without padding
pub(crate) fn generate_action_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 digest of the raw token, hex encoded for storage
pub(crate) fn hash_action_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub(crate) fn parse_stored_timestamp(value: &str) -> Result<DateTime<Utc>, AuthError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AuthError::Database(format!("invalid stored timestamp: {e}")))
}
