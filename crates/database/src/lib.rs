//! Gatehouse Database Crate
//!
//! Connection management, embedded migrations, and the repository layer
//! over the account, settings, action-token, and revocation tables.

use gatehouse_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};

// Re-export repositories
pub use repos::{RevocationRepository, SettingsRepository, TokenRepository, UserRepository};

// Re-export entities
pub use entities::{
    settings::{UserPreferences, UserSettings},
    token::{ActionToken, TokenPurpose},
    user::{CreateUserRequest, User, UserRole, UserStatus},
};

// Re-export types
pub use types::{
    errors::{DatabaseError, TokenError, UserError},
    DatabaseResult, TokenResult, UserResult,
};

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

    Ok(pool)
}
