use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use workforce::auth::password;
use workforce::config::Config;
use workforce::db;

#[derive(Parser, Debug)]
#[command(name = "workforce", version, about = "Departments and employees API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Provision a user account.
    CreateUser(CreateUserCommand),
}

#[derive(Args, Debug)]
struct CreateUserCommand {
    #[arg(long)]
    username: String,
    #[arg(long, env = "WORKFORCE_USER_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long, default_value = "")]
    email: String,
    /// Grant administrator privileges.
    #[arg(long)]
    superuser: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::CreateUser(cmd) => create_user(&pool, cmd).await,
    }
}

async fn serve(pool: PgPool, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Workforce");

    let addr = SocketAddr::new(config.host, config.port);
    let app = workforce::build_app(pool, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn create_user(pool: &PgPool, cmd: CreateUserCommand) -> Result<(), Box<dyn std::error::Error>> {
    if cmd.password.chars().count() < password::MIN_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            password::MIN_LENGTH
        )
        .into());
    }

    let pw_hash = password::hash(&cmd.password)?;
    let user = db::users::create(pool, &cmd.username, &pw_hash, &cmd.email, cmd.superuser).await?;

    tracing::info!(
        user_id = user.id,
        username = %user.username,
        superuser = user.is_superuser,
        "User created"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
