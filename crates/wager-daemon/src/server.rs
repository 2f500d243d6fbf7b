//! Server setup and lifecycle management: wires storage, payments,
//! catalog sync, and the engine together, then runs the HTTP API with
//! every background loop supervised alongside it.

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::notify::LoggingAdminNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use wager_catalog::{CatalogSource, CatalogSyncLoop, SheetCatalogSource, StaticCatalogSource};
use wager_engine::{AdminReminder, AdminReminderLoop, MatchmakingEngine, Reconciler, ReconcilerLoop, SettlementEngine, SettlementLoop};
use wager_payments::{CryptoPayClient, PaymentProvider};
use wager_storage::{InMemoryStorage, PostgresStorage, Storage};

pub struct Server {
    config: DaemonConfig,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn PaymentProvider>,
}

impl Server {
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage: Arc<dyn Storage> = if config.storage.is_postgres() {
            Arc::new(
                PostgresStorage::new(
                    &config.storage.pg_url,
                    config.storage.pg_max_connections,
                    config.storage.pg_connect_timeout_secs,
                )
                .await?,
            )
        } else {
            Arc::new(InMemoryStorage::new())
        };

        let provider: Arc<dyn PaymentProvider> = match &config.payments.crypto_pay_base_url {
            Some(base_url) => Arc::new(
                CryptoPayClient::with_base_url(config.payments.crypto_pay_token.clone(), base_url.clone())
                    .map_err(|e| DaemonError::Config(e.to_string()))?,
            ),
            None => Arc::new(
                CryptoPayClient::new(config.payments.crypto_pay_token.clone())
                    .map_err(|e| DaemonError::Config(e.to_string()))?,
            ),
        };

        Ok(Self { config, storage, provider })
    }

    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let matchmaking = Arc::new(MatchmakingEngine::new(
            self.storage.clone(),
            self.provider.clone(),
            self.config.payments.crypto_default_asset.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(self.storage.clone(), self.provider.clone()));

        let state = AppState::new(matchmaking, reconciler.clone());
        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("wagerd listening on {}", addr);

        self.spawn_background_loops(reconciler);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("wagerd shutting down");
        Ok(())
    }

    fn spawn_background_loops(&self, reconciler: Arc<Reconciler>) {
        let reconciler_loop = ReconcilerLoop::new(
            reconciler,
            Duration::from_secs(self.config.scheduler.reconcile_interval_secs),
        );
        tokio::spawn(reconciler_loop.run());

        let settlement = Arc::new(SettlementEngine::new(
            self.storage.clone(),
            self.provider.clone(),
            self.config.payments.crypto_default_asset.clone(),
            self.config.payments.fee_pct,
        ));
        let (settlement_loop, settlement_rx) = SettlementLoop::new(
            settlement,
            Duration::from_secs(self.config.scheduler.settlement_interval_secs),
        );
        tokio::spawn(settlement_loop.run(settlement_rx));

        let catalog_source: Arc<dyn CatalogSource> = match &self.config.catalog.gsheet_csv_url {
            Some(url) => Arc::new(SheetCatalogSource::new(url.clone())),
            None => Arc::new(StaticCatalogSource::new(Vec::new())),
        };
        let (catalog_loop, catalog_rx) = CatalogSyncLoop::new(
            self.storage.clone(),
            catalog_source,
            Duration::from_secs(self.config.catalog.sync_interval_secs),
        );
        tokio::spawn(catalog_loop.run(catalog_rx));

        let admin_reminder = Arc::new(AdminReminder::new(
            self.storage.clone(),
            Arc::new(LoggingAdminNotifier),
            self.config.chat.admin_id_list(),
            Duration::from_secs(self.config.scheduler.admin_reminder_grace_secs),
        ));
        let admin_loop = AdminReminderLoop::new(
            admin_reminder,
            Duration::from_secs(self.config.scheduler.admin_reminder_interval_secs),
        );
        tokio::spawn(admin_loop.run());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
