//! Main daemon runtime.
//!
//! Wires the store, the accrual client, the loyalty service and the API
//! server together, and tears them down on Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use loyalty_connectors::AccrualHttpClient;
use loyalty_reconcile::{AccrualPort, StubAccrual};
use loyalty_store::{MemoryStore, Store};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{create_router, ApiState};
use crate::config::{AccrualConfig, Config};
use crate::error::{DaemonError, DaemonResult};
use crate::metrics::Metrics;
use crate::service::LoyaltyService;

// =============================================================================
// Daemon
// =============================================================================

/// Main daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Loyalty operations, shared with the API
    service: Arc<LoyaltyService<dyn Store>>,
    /// Metrics registry, fed by the reconciler
    metrics: Metrics,
}

impl Daemon {
    /// Create a daemon over explicit adapters.
    ///
    /// Starts the reconciliation pipeline, so it must be called from within a
    /// tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        accrual: Arc<dyn AccrualPort>,
    ) -> DaemonResult<Self> {
        let metrics = Metrics::new()?;
        let service = LoyaltyService::start(
            &config.token_key,
            store,
            accrual,
            config.reconcile.clone(),
            Arc::new(metrics.clone()),
        )?;

        Ok(Self { config, service: Arc::new(service), metrics })
    }

    /// Create a daemon over the in-memory store.
    ///
    /// The accrual system is reached over HTTP when an address is configured,
    /// otherwise the scripted stub answers.
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let accrual = accrual_client(&config.accrual);
        Self::new(config, Arc::new(MemoryStore::new()), accrual)
    }

    /// Create a daemon with the adapters the configuration asks for.
    pub async fn from_config(config: Config) -> DaemonResult<Self> {
        match config.database_url.clone() {
            None => {
                warn!("DATABASE_URL unset, orders are kept in memory only");
                Self::new_stub(config)
            },
            Some(url) => {
                let store = connect_store(&url).await?;
                let accrual = accrual_client(&config.accrual);
                Self::new(config, store, accrual)
            },
        }
    }

    /// Get the loyalty service.
    pub fn service(&self) -> &Arc<LoyaltyService<dyn Store>> {
        &self.service
    }

    /// Run the daemon until Ctrl-C.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting loyalty daemon"
        );

        let shutdown = CancellationToken::new();
        let (api_addr, server) = self.start_api_server(shutdown.clone()).await?;
        info!(%api_addr, "API server started");

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");

        self.shutdown(shutdown, server).await;
        Ok(())
    }

    /// Bind the API server and serve until `shutdown` fires.
    pub async fn start_api_server(
        &self,
        shutdown: CancellationToken,
    ) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let state = Arc::new(ApiState {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, server))
    }

    /// Stop the API server, then the reconciliation pipeline.
    pub async fn shutdown(&self, shutdown: CancellationToken, server: JoinHandle<()>) {
        info!("Initiating graceful shutdown");

        shutdown.cancel();
        if let Err(e) = server.await {
            error!(error = %e, "API server task failed");
        }
        self.service.shutdown().await;

        info!("Shutdown complete");
    }
}

fn accrual_client(config: &AccrualConfig) -> Arc<dyn AccrualPort> {
    match &config.address {
        Some(address) => {
            info!(%address, "Using accrual system over HTTP");
            Arc::new(AccrualHttpClient::with_timeout(address.as_str(), config.timeout))
        },
        None => {
            warn!("LOYALTY_ACCRUAL_ADDRESS unset, using stub accrual system");
            Arc::new(StubAccrual::new())
        },
    }
}

#[cfg(feature = "postgres")]
async fn connect_store(url: &str) -> DaemonResult<Arc<dyn Store>> {
    let pool = sqlx::PgPool::connect(url).await.map_err(loyalty_store::StoreError::from)?;
    loyalty_db::migrate(&pool)
        .await
        .map_err(|e| DaemonError::Config(format!("Failed to run migrations: {}", e)))?;
    info!("Connected to PostgreSQL");

    Ok(Arc::new(loyalty_store::PgStore::new(pool)))
}

#[cfg(not(feature = "postgres"))]
async fn connect_store(_url: &str) -> DaemonResult<Arc<dyn Store>> {
    Err(DaemonError::Config(
        "DATABASE_URL is set but loyaltyd was built without the postgres feature".to_string(),
    ))
}

// =============================================================================
// Tests
// =============================================================================
