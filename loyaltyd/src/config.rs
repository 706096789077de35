//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use loyalty_reconcile::ReconcileConfig;
use std::env;
use std::time::Duration;

/// Token key used outside production when `LOYALTY_TOKEN_KEY` is unset.
const DEV_TOKEN_KEY: &str = "loyalty-dev-token-key";

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Reconciliation pipeline configuration
    pub reconcile: ReconcileConfig,

    /// Accrual system connection
    pub accrual: AccrualConfig,

    /// PostgreSQL DSN; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// HMAC key verifying bearer tokens
    pub token_key: String,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Accrual system configuration.
#[derive(Debug, Clone)]
pub struct AccrualConfig {
    /// Base URL of the accrual system; the scripted stub is used when unset
    pub address: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let reconcile = Self::load_reconcile_config()?;
        let accrual = Self::load_accrual_config()?;
        let database_url = Self::load_optional("DATABASE_URL");
        let token_key = Self::load_token_key(environment)?;

        Ok(Self {
            api,
            reconcile,
            accrual,
            database_url,
            token_key,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            reconcile: ReconcileConfig {
                queue_capacity: 16,
                flush_interval: Duration::from_millis(20),
                discovery_interval: Duration::from_millis(50),
            },
            accrual: AccrualConfig { address: None, timeout: Duration::from_secs(1) },
            database_url: None,
            token_key: "test-token-key".to_string(),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("LOYALTY_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid LOYALTY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("LOYALTY_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("LOYALTY_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid LOYALTY_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_reconcile_config() -> DaemonResult<ReconcileConfig> {
        let defaults = ReconcileConfig::default();

        let queue_capacity = match env::var("LOYALTY_QUEUE_CAPACITY") {
            Ok(val) => val.parse::<usize>().map_err(|_| {
                DaemonError::Config(format!("Invalid LOYALTY_QUEUE_CAPACITY value: {}", val))
            })?,
            Err(_) => defaults.queue_capacity,
        };
        let flush_interval =
            Self::load_millis_env("LOYALTY_FLUSH_INTERVAL_MS", defaults.flush_interval)?;
        let discovery_interval =
            Self::load_millis_env("LOYALTY_DISCOVERY_INTERVAL_MS", defaults.discovery_interval)?;

        let config = ReconcileConfig { queue_capacity, flush_interval, discovery_interval };
        config.validate().map_err(|e| DaemonError::Config(e.to_string()))?;
        Ok(config)
    }

    fn load_accrual_config() -> DaemonResult<AccrualConfig> {
        let address = Self::load_optional("LOYALTY_ACCRUAL_ADDRESS");
        let timeout = Self::load_millis_env("LOYALTY_ACCRUAL_TIMEOUT_MS", Duration::from_secs(5))?;
        if timeout.is_zero() {
            return Err(DaemonError::Config(
                "LOYALTY_ACCRUAL_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(AccrualConfig { address, timeout })
    }

    fn load_token_key(environment: Environment) -> DaemonResult<String> {
        match Self::load_optional("LOYALTY_TOKEN_KEY") {
            Some(key) => Ok(key),
            None if environment == Environment::Production => Err(DaemonError::Config(
                "LOYALTY_TOKEN_KEY is required in production".to_string(),
            )),
            None => Ok(DEV_TOKEN_KEY.to_string()),
        }
    }

    fn load_millis_env(key: &str, default: Duration) -> DaemonResult<Duration> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    /// Read a variable, treating empty values as unset.
    fn load_optional(key: &str) -> Option<String> {
        env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            reconcile: ReconcileConfig::default(),
            accrual: AccrualConfig { address: None, timeout: Duration::from_secs(5) },
            database_url: None,
            token_key: DEV_TOKEN_KEY.to_string(),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
