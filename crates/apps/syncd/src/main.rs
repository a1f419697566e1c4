//! Savrii sync service
//!
//! Hosts the inbound email ingestion job behind a small HTTP API. The
//! database is opened once here and shared by every request.

mod routes;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ingest::{GmailConnector, GmailCredentials, MailStore, ProviderConnector, SqliteMailStore};
use log::{error, info};
use poem::Server;
use poem::listener::TcpListener;
use tokio::signal;

use routes::AppState;
use settings::ServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG overrides the default level)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = ServiceConfig::load()?;

    let db_path = settings.database_path()?;
    info!("Opening database at {}", db_path.display());
    let store: Arc<dyn MailStore> = Arc::new(SqliteMailStore::new(&db_path)?);

    let credentials = GmailCredentials::load()?;
    let connector: Arc<dyn ProviderConnector> =
        Arc::new(GmailConnector::new(credentials, settings.gmail.clone()));

    let state = AppState::new(store, connector, settings.sync.clone());

    info!(
        "Sync service listening on {} (fetch limit {}, unread mode {:?})",
        settings.listen_addr,
        settings.sync.effective_fetch_limit(),
        settings.sync.unread_count
    );

    Server::new(TcpListener::bind(settings.listen_addr.clone()))
        .name("savrii-syncd")
        .idle_timeout(Duration::from_secs(60))
        .run_with_graceful_shutdown(
            routes::app(state),
            shutdown_signal(),
            Some(Duration::from_secs(5)),
        )
        .await?;

    info!("Sync service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}
