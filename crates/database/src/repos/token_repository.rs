//! Action token repository for database operations.

use crate::entities::{ActionToken, TokenPurpose};
use crate::types::{TokenError, TokenResult};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Repository for single-use action tokens (password reset, email
/// verification). Rows hold SHA-256 digests, never raw tokens.
#[derive(Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    /// Create a new token repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a fresh token for the user, replacing any outstanding token
    /// of the same purpose. The newest token is the only valid one.
    pub async fn issue(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: &str,
    ) -> TokenResult<ActionToken> {
        self.delete_for_user(user_id, purpose).await?;

        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO action_tokens (user_id, purpose, token_hash, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(token_hash)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(ActionToken {
            id: result.last_insert_rowid(),
            user_id,
            purpose,
            token_hash: token_hash.to_string(),
            expires_at: expires_at.to_string(),
            created_at: now,
        })
    }

    /// Look up a live token by digest. Expired rows are deleted on sight
    /// and reported as absent, so an expired token is indistinguishable
    /// from one that never existed.
    pub async fn find_valid(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> TokenResult<Option<ActionToken>> {
        let row = sqlx::query(
            "SELECT id, user_id, purpose, token_hash, expires_at, created_at \
             FROM action_tokens WHERE token_hash = ? AND purpose = ?",
        )
        .bind(token_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let token = map_token(&row);

        let expires = chrono::DateTime::parse_from_rfc3339(&token.expires_at)
            .map_err(|e| TokenError::InvalidTimestamp(e.to_string()))?;
        if expires.with_timezone(&Utc) <= Utc::now() {
            self.consume(token.id).await?;
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Delete the row by id. Returns whether this call removed it; under
    /// concurrent use only one caller sees `true`, which makes the delete
    /// the single-use linearization point.
    pub async fn consume(&self, token_id: i64) -> TokenResult<bool> {
        let result = sqlx::query("DELETE FROM action_tokens WHERE id = ?")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    /// Most recent token of this purpose for the user, expired or not.
    /// Cooldown checks care about when it was issued, not whether it
    /// still works.
    pub async fn latest_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> TokenResult<Option<ActionToken>> {
        let row = sqlx::query(
            "SELECT id, user_id, purpose, token_hash, expires_at, created_at \
             FROM action_tokens WHERE user_id = ? AND purpose = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(row.as_ref().map(map_token))
    }

    /// Remove every token of this purpose for the user
    pub async fn delete_for_user(&self, user_id: i64, purpose: TokenPurpose) -> TokenResult<()> {
        sqlx::query("DELETE FROM action_tokens WHERE user_id = ? AND purpose = ?")
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Remove every expired token. Returns the number of rows purged.
    pub async fn purge_expired(&self) -> TokenResult<u64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("DELETE FROM action_tokens WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| TokenError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

fn map_token(row: &SqliteRow) -> ActionToken {
    ActionToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        purpose: TokenPurpose::from(row.get::<String, _>("purpose").as_str()),
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}
