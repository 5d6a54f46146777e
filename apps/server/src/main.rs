use anyhow::Context;
use clap::{Parser, Subcommand};
use gatehouse_auth::NewAccount;
use gatehouse_backend_api::{build_router, ApiConfig, AppState};
use gatehouse_config::load as load_config;
use gatehouse_database::{UserRepository, UserRole};
use gatehouse_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "gatehouse-backend")]
#[command(about = "Gatehouse backend (HTTP server by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::CreateAdmin {
            email,
            username,
            password,
        } => create_admin(email, username, password).await,
    }
}

async fn run_server() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting Gatehouse backend");

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let state = AppState::new(
        services.db_pool.clone(),
        services.authenticator.clone(),
        services.settings.clone(),
        services.mailer.clone(),
        ApiConfig::from_app_config(&config),
    );
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(gatehouse_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

/// Bootstrap path for the admin-gated endpoints: registers the account,
/// promotes it, and skips email verification.
async fn create_admin(email: String, username: String, password: String) -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let registration = services
        .authenticator
        .register(NewAccount {
            email,
            username,
            display_name: None,
            password,
        })
        .await
        .context("failed to register administrator account")?;

    let users = UserRepository::new(services.db_pool.clone());
    users
        .set_role(registration.user.id, UserRole::Admin)
        .await
        .context("failed to promote account to administrator")?;
    users
        .verify_email(registration.user.id)
        .await
        .context("failed to mark administrator email as verified")?;

    println!(
        "Administrator account created: {} ({})",
        registration.user.email, registration.user.public_id
    );
    Ok(())
}
