//! Settings repository for database operations.

use crate::entities::{UserPreferences, UserSettings};
use crate::types::errors::UserError;
use crate::types::UserResult;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Repository for user settings database operations
#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Create a new settings repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find settings by user ID
    pub async fn find_by_user_id(&self, user_id: i64) -> UserResult<Option<UserSettings>> {
        let row = sqlx::query(
            "SELECT id, user_id, preferences, created_at, updated_at \
             FROM user_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let preferences_json: String = row
            .try_get("preferences")
            .map_err(|e| UserError::DatabaseError(e.to_string()))?;
        let preferences = serde_json::from_str(&preferences_json)
            .map_err(|e| UserError::SerializationError(e.to_string()))?;

        Ok(Some(UserSettings {
            id: row
                .try_get("id")
                .map_err(|e| UserError::DatabaseError(e.to_string()))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| UserError::DatabaseError(e.to_string()))?,
            preferences,
            created_at: row
                .try_get("created_at")
                .map_err(|e| UserError::DatabaseError(e.to_string()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| UserError::DatabaseError(e.to_string()))?,
        }))
    }

    /// Create a settings row with default preferences
    pub async fn create(&self, user_id: i64) -> UserResult<UserSettings> {
        let now = Utc::now().to_rfc3339();
        let preferences = UserPreferences::default();
        let preferences_json = serde_json::to_string(&preferences)
            .map_err(|e| UserError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO user_settings (user_id, preferences, created_at, updated_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&preferences_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(UserSettings {
            id: result.last_insert_rowid(),
            user_id,
            preferences,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Settings for the user, created lazily on first read
    pub async fn get_or_create(&self, user_id: i64) -> UserResult<UserSettings> {
        if let Some(settings) = self.find_by_user_id(user_id).await? {
            Ok(settings)
        } else {
            self.create(user_id).await
        }
    }

    /// Overwrite the stored preferences
    pub async fn update(
        &self,
        user_id: i64,
        preferences: &UserPreferences,
    ) -> UserResult<UserSettings> {
        let preferences_json = serde_json::to_string(preferences)
            .map_err(|e| UserError::SerializationError(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE user_settings SET preferences = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(&preferences_json)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(UserError::UserNotFound);
        }

        self.find_by_user_id(user_id)
            .await?
            .ok_or(UserError::UserNotFound)
    }

    /// Reset settings to default preferences
    pub async fn reset_to_default(&self, user_id: i64) -> UserResult<UserSettings> {
        self.update(user_id, &UserPreferences::default()).await
    }

    /// Delete the settings row
    pub async fn delete(&self, user_id: i64) -> UserResult<()> {
        sqlx::query("DELETE FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| UserError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CreateUserRequest;
    use crate::migrations::MIGRATOR;
    use crate::repos::UserRepository;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn create_test_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("settings.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
            .unwrap()
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();

        MIGRATOR.run(&pool).await.unwrap();
        (pool, temp_dir)
    }

    async fn seed_user(pool: &SqlitePool) -> i64 {
        let repo = UserRepository::new(pool.clone());
        repo.create(&CreateUserRequest {
            email: "settings@example.com".to_string(),
            username: "settings".to_string(),
            display_name: None,
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (pool, _temp_dir) = create_test_pool().await;
        let user_id = seed_user(&pool).await;
        let repo = SettingsRepository::new(pool);

        let first = repo.get_or_create(user_id).await.unwrap();
        let second = repo.get_or_create(user_id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.preferences, UserPreferences::default());
    }

    #[tokio::test]
    async fn update_overwrites_preferences() {
        let (pool, _temp_dir) = create_test_pool().await;
        let user_id = seed_user(&pool).await;
        let repo = SettingsRepository::new(pool);

        repo.get_or_create(user_id).await.unwrap();

        let preferences = UserPreferences {
            theme: "light".to_string(),
            language: "fr".to_string(),
            notifications_enabled: false,
            email_notifications: false,
            timezone: "Europe/Paris".to_string(),
        };
        let updated = repo.update(user_id, &preferences).await.unwrap();

        assert_eq!(updated.preferences, preferences);
    }

    #[tokio::test]
    async fn update_without_row_reports_user_not_found() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = SettingsRepository::new(pool);

        let err = repo
            .update(42, &UserPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::UserNotFound));
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let (pool, _temp_dir) = create_test_pool().await;
        let user_id = seed_user(&pool).await;
        let repo = SettingsRepository::new(pool);

        repo.get_or_create(user_id).await.unwrap();
        let custom = UserPreferences {
            theme: "light".to_string(),
            ..UserPreferences::default()
        };
        repo.update(user_id, &custom).await.unwrap();

        let reset = repo.reset_to_default(user_id).await.unwrap();
        assert_eq!(reset.preferences, UserPreferences::default());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let (pool, _temp_dir) = create_test_pool().await;
        let user_id = seed_user(&pool).await;
        let repo = SettingsRepository::new(pool);

        let original = repo.get_or_create(user_id).await.unwrap();
        repo.delete(user_id).await.unwrap();

        assert!(repo.find_by_user_id(user_id).await.unwrap().is_none());

        // The next read mints a fresh row.
        let recreated = repo.get_or_create(user_id).await.unwrap();
        assert_ne!(original.id, recreated.id);
    }
}
