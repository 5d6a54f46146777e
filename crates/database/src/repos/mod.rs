//! Database repository implementations

pub mod revocation_repository;
pub mod settings_repository;
pub mod token_repository;
pub mod user_repository;

// Re-export all repositories for convenience
pub use revocation_repository::*;
pub use settings_repository::*;
pub use token_repository::*;
pub use user_repository::*;
