//! PostgreSQL Session Pool - command line entry point.
//!
//! Loads the connection configuration from the environment (and `.env`), brings up the
//! pool for that target, probes it, optionally runs one statement inside a session,
//! and disconnects.

use clap::Parser;
use pg_session_pool::{PostgresConfig, Registry};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Probe a PostgreSQL target through the session pool.
#[derive(Debug, Parser)]
#[command(name = "pg-session-pool", version, author)]
struct Cli {
    /// Raw connection URL; overrides POSTGRES_HOST/PORT/USER/PASSWORD/DB
    #[arg(long, env = "POSTGRES_URL")]
    url: Option<String>,

    /// Statement to execute inside a committed session after the probe
    #[arg(short, long)]
    statement: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PGPOOL_LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "PGPOOL_JSON_LOGS")]
    json_logs: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = PostgresConfig::from_env()?;
    if let Some(url) = &cli.url {
        config = config.with_url(url.as_str())?;
    }

    info!(config = %config.summary(), "Starting pg-session-pool v{}", env!("CARGO_PKG_VERSION"));

    let registry = Registry::global();
    let manager = match registry.get_or_create(&config).await {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Pool initialization failed");
            return Err(e.into());
        }
    };

    if let Some(sql) = cli.statement.clone() {
        let rows = manager
            .with_session(move |session| Box::pin(async move { session.execute(&sql).await }))
            .await;
        match rows {
            Ok(rows) => info!(rows_affected = rows, "Statement committed"),
            Err(e) => {
                error!(error = %e, "Statement failed");
                manager.disconnect().await;
                return Err(e.into());
            }
        }
    }

    registry.disconnect_all().await;
    info!("Shutdown complete");
    Ok(())
}
