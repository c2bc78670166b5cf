//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use dcr_node::{EventError, EventService, HttpEventGateway, InMemoryStorage, Storage};
use dcr_types::EventDefinition;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// DCR event node server
pub struct Server {
    config: DaemonConfig,
    service: Arc<EventService>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage = open_storage(&config.storage).await?;

        let gateway = HttpEventGateway::new(config.gateway.to_http_config())
            .map_err(|e| DaemonError::Config(format!("Invalid gateway configuration: {}", e)))?;

        let service = Arc::new(EventService::new(
            storage,
            Arc::new(gateway),
            config.node_settings(),
        ));

        if let Some(path) = &config.events_file {
            seed_events(&service, path).await?;
        }

        Ok(Self { config, service })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.service.clone());
        let app = create_router(state, &self.config.server);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Event node listening on {}", addr);
        tracing::info!("Public URI: {}", self.config.server.public_uri);

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Event node shutting down");

        Ok(())
    }
}

async fn open_storage(config: &StorageConfig) -> DaemonResult<Arc<dyn Storage>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            tracing::info!("Using PostgreSQL storage");
            let storage =
                dcr_node::PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "PostgreSQL storage requires the 'postgres' feature".to_string(),
        )),
    }
}

/// Create the events listed in `path`; already existing ones are kept
async fn seed_events(service: &EventService, path: &Path) -> DaemonResult<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let definitions: Vec<EventDefinition> = serde_json::from_str(&raw)
        .map_err(|e| DaemonError::Config(format!("Invalid events file {}: {}", path.display(), e)))?;

    let mut created = 0;
    for definition in definitions {
        let key = definition.key();
        match service.create_event(definition).await {
            Ok(()) => created += 1,
            Err(EventError::Conflict(_)) => {
                tracing::debug!(event = %key, "Event already present, keeping stored state");
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(created, file = %path.display(), "Seeded events");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
