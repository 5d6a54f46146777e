//! User repository for database operations.

use crate::entities::{CreateUserRequest, User, UserRole, UserStatus};
use crate::types::{UserError, UserResult};
use chrono::{Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const USER_COLUMNS: &str = "id, public_id, email, username, display_name, password_hash, \
     role, status, email_verified, failed_login_attempts, last_failed_login_at, \
     locked_until, credentials_changed_at, last_login_at, created_at, updated_at";

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user row. The email is stored lowercased so lookups
    /// and the UNIQUE constraint are case-insensitive in practice.
    pub async fn create(&self, request: &CreateUserRequest) -> UserResult<User> {
        let now = Utc::now().to_rfc3339();
        let public_id = cuid2::cuid();
        let email = request.email.to_lowercase();

        let result = sqlx::query(
            "INSERT INTO users (public_id, email, username, display_name, password_hash, \
             role, status, email_verified, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 'user', 'active', 0, ?, ?)",
        )
        .bind(&public_id)
        .bind(&email)
        .bind(&request.username)
        .bind(&request.display_name)
        .bind(&request.password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        let user_id = result.last_insert_rowid();

        self.find_by_id(user_id).await?.ok_or_else(|| {
            UserError::DatabaseError("failed to retrieve created user".to_string())
        })
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND status != 'deleted'"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(row.as_ref().map(map_user))
    }

    /// Find user by public ID
    pub async fn find_by_public_id(&self, public_id: &str) -> UserResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = ? AND status != 'deleted'"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(row.as_ref().map(map_user))
    }

    /// Find user by email (matched lowercased)
    pub async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? AND status != 'deleted'"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(row.as_ref().map(map_user))
    }

    /// Whether any row (deleted included, since the UNIQUE index spans them)
    /// already claims this email.
    pub async fn email_exists(&self, email: &str) -> UserResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Whether any row already claims this username.
    pub async fn username_exists(&self, username: &str) -> UserResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Mark the user's email address as verified
    pub async fn verify_email(&self, user_id: i64) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET email_verified = 1, updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }

    /// Replace the password hash without touching session validity.
    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(password_hash)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }

    /// Replace the password hash after a reset: bumps the credentials
    /// floor (outstanding tokens minted before it become invalid) and
    /// clears any lockout so the owner can sign in immediately.
    pub async fn reset_password(&self, user_id: i64, password_hash: &str) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, credentials_changed_at = ?, \
             failed_login_attempts = 0, last_failed_login_at = NULL, locked_until = NULL, \
             updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }

    /// Record one failed login attempt in a single UPDATE so concurrent
    /// failures cannot lose counts. The attempt counter restarts at 1 when
    /// the previous failure fell outside the window, otherwise increments;
    /// reaching `max_failed` sets `locked_until`.
    pub async fn record_failed_login(
        &self,
        user_id: i64,
        window_seconds: i64,
        max_failed: i64,
        lockout_seconds: i64,
    ) -> UserResult<User> {
        let now = Utc::now();
        let window_start = (now - Duration::seconds(window_seconds)).to_rfc3339();
        let lock_until = (now + Duration::seconds(lockout_seconds)).to_rfc3339();
        let now = now.to_rfc3339();

        sqlx::query(
            "UPDATE users SET \
             failed_login_attempts = CASE \
                 WHEN last_failed_login_at IS NULL OR last_failed_login_at < ?1 THEN 1 \
                 ELSE failed_login_attempts + 1 \
             END, \
             locked_until = CASE \
                 WHEN (CASE \
                     WHEN last_failed_login_at IS NULL OR last_failed_login_at < ?1 THEN 1 \
                     ELSE failed_login_attempts + 1 \
                 END) >= ?2 THEN ?3 \
                 ELSE locked_until \
             END, \
             last_failed_login_at = ?4, \
             updated_at = ?4 \
             WHERE id = ?5 AND status != 'deleted'",
        )
        .bind(&window_start)
        .bind(max_failed)
        .bind(&lock_until)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        self.find_by_id(user_id).await?.ok_or(UserError::UserNotFound)
    }

    /// Clear failure counters and any lock, and stamp `last_login_at`.
    pub async fn record_successful_login(&self, user_id: i64) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, last_failed_login_at = NULL, \
             locked_until = NULL, last_login_at = ?, updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }

    /// Change the user's role
    pub async fn set_role(&self, user_id: i64, role: UserRole) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ? AND status != 'deleted'",
        )
        .bind(role.as_str())
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }

    /// Soft-delete the user. The row keeps occupying its unique email and
    /// username; lookups filter it out.
    pub async fn soft_delete(&self, user_id: i64) -> UserResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE users SET status = 'deleted', updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }
        Ok(())
    }
}

fn map_user(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        public_id: row.get("public_id"),
        email: row.get("email"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        role: UserRole::from(row.get::<String, _>("role").as_str()),
        status: UserStatus::from(row.get::<String, _>("status").as_str()),
        email_verified: row.get("email_verified"),
        failed_login_attempts: row.get("failed_login_attempts"),
        last_failed_login_at: row.get("last_failed_login_at"),
        locked_until: row.get("locked_until"),
        credentials_changed_at: row.get("credentials_changed_at"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_unique_violation(e: sqlx::Error) -> UserError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        if message.contains("users.email") {
            UserError::EmailAlreadyExists
        } else if message.contains("users.username") {
            UserError::UsernameAlreadyExists
        } else {
            UserError::DatabaseError(message)
        }
    } else {
        UserError::DatabaseError(message)
    }
}
