//! Settings entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: i64,
    pub user_id: i64,
    pub preferences: UserPreferences,
    pub created_at: String,
    pub updated_at: String,
}

/// Stored preference blob. Every field carries a serde default so rows
/// written before a field existed still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default = "UserPreferences::default_theme")]
    pub theme: String,
    #[serde(default = "UserPreferences::default_language")]
    pub language: String,
    #[serde(default = "UserPreferences::default_notifications")]
    pub notifications_enabled: bool,
    #[serde(default = "UserPreferences::default_notifications")]
    pub email_notifications: bool,
    #[serde(default = "UserPreferences::default_timezone")]
    pub timezone: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Self::default_theme(),
            language: Self::default_language(),
            notifications_enabled: Self::default_notifications(),
            email_notifications: Self::default_notifications(),
            timezone: Self::default_timezone(),
        }
    }
}

impl UserPreferences {
    fn default_theme() -> String {
        "dark".to_string()
    }

    fn default_language() -> String {
        "en".to_string()
    }

    const fn default_notifications() -> bool {
        true
    }

    fn default_timezone() -> String {
        "UTC".to_string()
    }
}
