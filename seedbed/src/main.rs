mod migrations;
mod shutdown;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use seedbed_core::{
    bootstrap::{
        ensure_admin, init_database, load_config, DatabaseHandle, ShutdownOutcome, ShutdownSignal,
    },
    logging, Config,
};

use migrations::run_migrations;
use shutdown::shutdown_signal;

#[derive(Parser, Debug)]
#[command(name = "seedbed")]
#[command(about = "Database bootstrap and admin seeding", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "SEEDBED_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, migrate and hold the pool until SIGINT or SIGTERM
    Serve,
    /// Migrate and make sure the admin account exists
    Seed {
        /// Overrides ADMIN_EMAIL
        #[arg(long)]
        email: Option<String>,
        /// Overrides ADMIN_NAME
        #[arg(long)]
        name: Option<String>,
    },
    /// Exit non-zero unless the database answers
    Check,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 1. Load and validate configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging, config.environment)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        "seedbed starting..."
    );

    // 3. Initialize database
    let handle = Arc::new(init_database(&config.connection_config()?).await?);

    // 4. Run the command until it finishes or a signal arrives
    let (outcome, signal) =
        run_until_signal(run(cli.command, &config, &handle), shutdown_signal()).await;

    // 5. Release the pool exactly once, whichever path got here
    let late = spawn_late_signal_listener(Arc::clone(&handle));
    let released = handle.shutdown(signal).await;
    late.abort();

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }
    outcome?;
    released?;

    info!("seedbed stopped");
    Ok(())
}

/// Drive `work` to completion unless a termination signal arrives first.
///
/// Finishing on its own maps to [`ShutdownSignal::Exit`].
async fn run_until_signal<W, S>(work: W, signal: S) -> (Result<()>, ShutdownSignal)
where
    W: Future<Output = Result<()>>,
    S: Future<Output = ShutdownSignal>,
{
    tokio::select! {
        outcome = work => (outcome, ShutdownSignal::Exit),
        signal = signal => {
            info!(signal = %signal, "Shutdown signal received, stopping...");
            (Ok(()), signal)
        }
    }
}

async fn run(command: Command, config: &Config, handle: &DatabaseHandle) -> Result<()> {
    match command {
        Command::Serve => serve(config, handle).await,
        Command::Seed { email, name } => {
            run_migrations(handle.pool()).await?;

            let bootstrap = &config.bootstrap;
            let email = email.unwrap_or_else(|| bootstrap.admin_email.clone());
            let name = name.unwrap_or_else(|| bootstrap.admin_display_name.clone());

            let outcome = ensure_admin(handle, &email, &bootstrap.admin_password, &name).await?;
            info!(
                created = outcome.created,
                account_id = %outcome.account_id,
                default_password_in_use = outcome.default_password_in_use,
                "Seed finished"
            );
            Ok(())
        }
        Command::Check => {
            if handle.health_check().await {
                info!(target_db = %handle.target(), "Database is healthy");
                Ok(())
            } else {
                Err(anyhow::anyhow!("Database health check failed"))
            }
        }
        Command::Migrate => run_migrations(handle.pool()).await,
    }
}

async fn serve(config: &Config, handle: &DatabaseHandle) -> Result<()> {
    run_migrations(handle.pool()).await?;
    info!("Ready, waiting for shutdown signal");

    let mut interval = tokio::time::interval(config.health_check_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    interval.tick().await;

    // Failures are logged by `health_check` itself
    while handle.is_ready() {
        interval.tick().await;
        handle.health_check().await;
    }

    Ok(())
}

/// A second SIGINT/SIGTERM while the pool is closing must not release it again.
fn spawn_late_signal_listener(handle: Arc<DatabaseHandle>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        if let Ok(ShutdownOutcome::AlreadyReleased) = handle.shutdown(signal).await {
            warn!(signal = %signal, "Shutdown already in progress");
        }
    })
}
