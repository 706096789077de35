//! Loyalty Daemon
//!
//! # Usage
//!
//! ```bash
//! # Start with in-memory store and stub accrual system
//! cargo run -p loyaltyd
//!
//! # Start against PostgreSQL and a real accrual system
//! DATABASE_URL=postgres://... LOYALTY_ACCRUAL_ADDRESS=http://localhost:8081 \
//!     cargo run -p loyaltyd --features postgres
//!
//! # Database maintenance
//! cargo run -p loyaltyd --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LOYALTY_ENV`: Environment (test, development, production)
//! - `LOYALTY_API_HOST`: API host (default: 0.0.0.0)
//! - `LOYALTY_API_PORT`: API port (default: 8080)
//! - `DATABASE_URL`: PostgreSQL DSN (default: in-memory store)
//! - `LOYALTY_ACCRUAL_ADDRESS`: Accrual system base URL (default: stub)
//! - `LOYALTY_TOKEN_KEY`: Bearer token HMAC key (required in production)
//! - `LOYALTY_QUEUE_CAPACITY`: Reconciliation queue size (default: 100)
//! - `LOYALTY_FLUSH_INTERVAL_MS`: Worker flush interval (default: 1000)
//! - `LOYALTY_DISCOVERY_INTERVAL_MS`: Discovery sweep interval (default: 10000)
//! - `LOYALTY_ACCRUAL_TIMEOUT_MS`: Accrual request timeout (default: 5000)

use loyaltyd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("loyaltyd=info".parse()?)
                .add_directive("loyalty_reconcile=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        return run_db(&args).await;
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Loyalty Daemon"
    );

    let daemon = Daemon::from_config(config).await?;
    daemon.run().await?;

    Ok(())
}

#[cfg(feature = "postgres")]
async fn run_db(args: &[String]) -> anyhow::Result<()> {
    loyaltyd::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: &[String]) -> anyhow::Result<()> {
    anyhow::bail!("db commands require loyaltyd built with the postgres feature")
}
