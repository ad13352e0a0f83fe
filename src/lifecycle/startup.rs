//! Startup orchestration for the `serve` mode.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Build the backend client and the coordinator
//! - Start background tasks (cache sweeper, admin API)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The admin listener starts last

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::authz::AuthorizationCoordinator;
use crate::backend::{ClientBuildError, HttpPermissionClient};
use crate::config::AuthzConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend client: {0}")]
    Client(#[from] ClientBuildError),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to bind admin listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Everything `serve` keeps alive until shutdown.
pub struct Services {
    pub coordinator: Arc<AuthorizationCoordinator>,
    pub admin_address: Option<SocketAddr>,
    pub tasks: Vec<JoinHandle<()>>,
}

pub async fn start(config: &AuthzConfig, shutdown: &Shutdown) -> Result<Services, StartupError> {
    if config.observability.metrics_enabled {
        let addr = parse_addr(&config.observability.metrics_address)?;
        metrics::init_metrics(addr)?;
    }

    let client = HttpPermissionClient::new(&config.backend)?;
    let coordinator = Arc::new(AuthorizationCoordinator::from_config(config, Arc::new(client)));

    let mut tasks = vec![coordinator.cache().spawn_sweeper(shutdown.subscribe())];

    let mut admin_address = None;
    if config.admin.enabled {
        let listener = TcpListener::bind(parse_addr(&config.admin.bind_address)?).await?;
        let local = listener.local_addr()?;
        admin_address = Some(local);

        let router = setup_admin_router(AdminState::new(coordinator.clone(), &config.admin.api_key));
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "admin server failed");
            }
        }));
        tracing::info!(address = %local, "admin API listening");
    }

    Ok(Services {
        coordinator,
        admin_address,
        tasks,
    })
}

fn parse_addr(raw: &str) -> Result<SocketAddr, StartupError> {
    raw.parse()
        .map_err(|_| StartupError::Address(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_and_stop_with_admin() {
        let mut config = AuthzConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "k".to_string();
        config.admin.bind_address = "127.0.0.1:0".to_string();

        let shutdown = Shutdown::new();
        let services = start(&config, &shutdown).await.unwrap();
        assert!(services.admin_address.is_some());
        assert_eq!(services.tasks.len(), 2);

        shutdown.trigger();
        for task in services.tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_bad_admin_address() {
        let mut config = AuthzConfig::default();
        config.admin.enabled = true;
        config.admin.bind_address = "nowhere".to_string();

        let err = start(&config, &Shutdown::new()).await.err().unwrap();
        assert!(matches!(err, StartupError::Address(_)));
    }
}
