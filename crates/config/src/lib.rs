use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "gatehouse.toml",
    "config/gatehouse.toml",
    "crates/config/gatehouse.toml",
    "../gatehouse.toml",
    "../config/gatehouse.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub smtp: SmtpConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// CORS origin for the collaborating UI. `None` allows any origin.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            cors_origin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://gatehouse.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_jwt_ttl")]
    pub jwt_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_jwt_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "AuthConfig::default_jwt_audience")]
    pub jwt_audience: String,
    #[serde(default = "AuthConfig::default_max_failed_logins")]
    pub max_failed_logins: u32,
    #[serde(default = "AuthConfig::default_failed_login_window")]
    pub failed_login_window_seconds: u64,
    #[serde(default = "AuthConfig::default_lockout")]
    pub lockout_seconds: u64,
    #[serde(default = "AuthConfig::default_reset_token_ttl")]
    pub reset_token_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_verification_token_ttl")]
    pub verification_token_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_resend_cooldown")]
    pub resend_cooldown_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_jwt_secret(),
            jwt_ttl_seconds: Self::default_jwt_ttl(),
            jwt_issuer: Self::default_jwt_issuer(),
            jwt_audience: Self::default_jwt_audience(),
            max_failed_logins: Self::default_max_failed_logins(),
            failed_login_window_seconds: Self::default_failed_login_window(),
            lockout_seconds: Self::default_lockout(),
            reset_token_ttl_seconds: Self::default_reset_token_ttl(),
            verification_token_ttl_seconds: Self::default_verification_token_ttl(),
            resend_cooldown_seconds: Self::default_resend_cooldown(),
        }
    }
}

impl AuthConfig {
    fn default_jwt_secret() -> String {
        "insecure-dev-secret-change-me".to_string()
    }

    const fn default_jwt_ttl() -> u64 {
        86_400
    }

    fn default_jwt_issuer() -> String {
        "gatehouse".to_string()
    }

    fn default_jwt_audience() -> String {
        "gatehouse-web".to_string()
    }

    const fn default_max_failed_logins() -> u32 {
        5
    }

    const fn default_failed_login_window() -> u64 {
        900
    }

    const fn default_lockout() -> u64 {
        900
    }

    const fn default_reset_token_ttl() -> u64 {
        3_600
    }

    const fn default_verification_token_ttl() -> u64 {
        86_400
    }

    const fn default_resend_cooldown() -> u64 {
        60
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Negotiate STARTTLS with the relay. Disable for local capture servers.
    #[serde(default = "SmtpConfig::default_starttls")]
    pub starttls: bool,
    pub from_address: String,
    pub from_name: String,
    /// Origin of the collaborating UI, used to build links in outgoing mail.
    pub link_base_url: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            starttls: Self::default_starttls(),
            from_address: "no-reply@gatehouse.local".to_string(),
            from_name: "Gatehouse".to_string(),
            link_base_url: "http://localhost:5173".to_string(),
        }
    }
}

impl SmtpConfig {
    const fn default_starttls() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_window")]
    pub window_seconds: u64,
    #[serde(default = "RateLimitConfig::default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: Self::default_window(),
            max_requests: Self::default_max_requests(),
        }
    }
}

impl RateLimitConfig {
    const fn default_window() -> u64 {
        60
    }

    const fn default_max_requests() -> u32 {
        30
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use gatehouse_config::load;
///
/// std::env::remove_var("GATEHOUSE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default("database.url", defaults.database.url.clone())
        .unwrap()
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )
        .unwrap()
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())
        .unwrap()
        .set_default("auth.jwt_ttl_seconds", clamp_u64(defaults.auth.jwt_ttl_seconds))
        .unwrap()
        .set_default("auth.jwt_issuer", defaults.auth.jwt_issuer.clone())
        .unwrap()
        .set_default("auth.jwt_audience", defaults.auth.jwt_audience.clone())
        .unwrap()
        .set_default(
            "auth.max_failed_logins",
            i64::from(defaults.auth.max_failed_logins),
        )
        .unwrap()
        .set_default(
            "auth.failed_login_window_seconds",
            clamp_u64(defaults.auth.failed_login_window_seconds),
        )
        .unwrap()
        .set_default("auth.lockout_seconds", clamp_u64(defaults.auth.lockout_seconds))
        .unwrap()
        .set_default(
            "auth.reset_token_ttl_seconds",
            clamp_u64(defaults.auth.reset_token_ttl_seconds),
        )
        .unwrap()
        .set_default(
            "auth.verification_token_ttl_seconds",
            clamp_u64(defaults.auth.verification_token_ttl_seconds),
        )
        .unwrap()
        .set_default(
            "auth.resend_cooldown_seconds",
            clamp_u64(defaults.auth.resend_cooldown_seconds),
        )
        .unwrap()
        .set_default("smtp.host", defaults.smtp.host.clone())
        .unwrap()
        .set_default("smtp.port", i64::from(defaults.smtp.port))
        .unwrap()
        .set_default("smtp.starttls", defaults.smtp.starttls)
        .unwrap()
        .set_default("smtp.from_address", defaults.smtp.from_address.clone())
        .unwrap()
        .set_default("smtp.from_name", defaults.smtp.from_name.clone())
        .unwrap()
        .set_default("smtp.link_base_url", defaults.smtp.link_base_url.clone())
        .unwrap()
        .set_default(
            "rate_limit.window_seconds",
            clamp_u64(defaults.rate_limit.window_seconds),
        )
        .unwrap()
        .set_default(
            "rate_limit.max_requests",
            i64::from(defaults.rate_limit.max_requests),
        )
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("GATEHOUSE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("GATEHOUSE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via GATEHOUSE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(
        address = %config.http.address,
        port = config.http.port,
        "loaded backend configuration"
    );
    Ok(config)
}

fn clamp_u64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
