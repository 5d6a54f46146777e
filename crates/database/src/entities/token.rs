//! Action token entity definitions
//!
//! Action tokens back the password-reset and email-verification flows.
//! Only the SHA-256 digest of a token is ever stored; the raw value
//! leaves the process exactly once, inside the outgoing email.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionToken {
    pub id: i64,
    pub user_id: i64,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

/// What an action token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerification,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::EmailVerification => "email_verification",
        }
    }
}

impl From<&str> for TokenPurpose {
    fn from(s: &str) -> Self {
        match s {
            "email_verification" => TokenPurpose::EmailVerification,
            _ => TokenPurpose::PasswordReset,
        }
    }
}
