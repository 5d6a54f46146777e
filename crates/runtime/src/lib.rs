use std::sync::Arc;

use anyhow::{Context, Result};
use gatehouse_auth::Authenticator;
use gatehouse_config::AppConfig;
use gatehouse_database::{initialize_database, SettingsRepository};
use gatehouse_mailer::{Mailer, SmtpMailer};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a frontend for the backend (HTTP server, CLI) needs,
/// wired up once from the loaded configuration.
#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub settings: SettingsRepository,
    pub mailer: Arc<dyn Mailer>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let settings = SettingsRepository::new(db_pool.clone());
        let mailer: Arc<dyn Mailer> = Arc::new(
            SmtpMailer::from_config(&config.smtp)
                .context("failed to configure smtp transport")?,
        );

        info!(
            host = %config.smtp.host,
            port = config.smtp.port,
            "smtp transport configured"
        );

        Ok(Self {
            db_pool,
            authenticator,
            settings,
            mailer,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
