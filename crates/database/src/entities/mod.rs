//! Domain entities for the database layer

pub mod settings;
pub mod token;
pub mod user;

// Re-export all entity types
pub use settings::{UserPreferences, UserSettings};
pub use token::{ActionToken, TokenPurpose};
pub use user::{CreateUserRequest, User, UserRole, UserStatus};
