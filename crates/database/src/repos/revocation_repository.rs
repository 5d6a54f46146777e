//! JWT denylist repository.

use crate::types::{TokenError, TokenResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// Repository over the revoked-token denylist. Entries only need to
/// outlive the JWT they shadow, so writes opportunistically purge rows
/// whose shadowed token has already expired.
#[derive(Clone)]
pub struct RevocationRepository {
    pool: SqlitePool,
}

impl RevocationRepository {
    /// Create a new revocation repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Denylist a token id until its natural expiry
    pub async fn revoke(&self, jti: &str, user_id: i64, expires_at: &str) -> TokenResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        self.purge_expired().await?;
        Ok(())
    }

    /// Whether this token id has been denylisted
    pub async fn is_revoked(&self, jti: &str) -> TokenResult<bool> {
        let row = sqlx::query("SELECT 1 FROM revoked_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Drop entries whose shadowed token has expired on its own
    pub async fn purge_expired(&self) -> TokenResult<u64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
