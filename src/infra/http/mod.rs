//! HTTP download surface for published artifacts.

mod download;
mod middleware;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, middleware::from_fn, routing::get};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tracing::{error, info};

use crate::{
    artifacts::{reaper, store::ArtifactStore},
    config::ServerSettings,
};

use self::middleware::{log_responses, set_request_context};
use super::error::InfraError;

#[derive(Clone)]
pub struct DownloadState {
    pub store: Arc<ArtifactStore>,
}

pub fn build_router(state: DownloadState) -> Router {
    Router::new()
        .route("/files/{id}/{filename}", get(download::serve_artifact))
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

/// A running download listener plus the reaper tied to its lifetime.
///
/// Started lazily by the first publish and kept for the rest of the
/// process; `shutdown` exists for a clean exit.
pub struct DownloadServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    reaper: JoinHandle<()>,
}

impl DownloadServer {
    pub async fn start(
        store: Arc<ArtifactStore>,
        settings: ServerSettings,
        sweep_interval: Duration,
    ) -> Result<Self, InfraError> {
        let requested = SocketAddr::new(settings.host, settings.port);
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| InfraError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr()?;

        let router = build_router(DownloadState {
            store: store.clone(),
        });

        let (shutdown, mut signal) = watch::channel(false);
        tokio::spawn(async move {
            let wait = async move {
                let _ = signal.changed().await;
            };
            if let Err(err) = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(wait)
                .await
            {
                error!(
                    target = "infra::http::server",
                    error = %err,
                    "download server stopped unexpectedly"
                );
            }
        });

        let reaper = reaper::spawn(store, sweep_interval);

        info!(
            target = "infra::http::server",
            addr = %addr,
            "download server listening"
        );

        Ok(Self {
            addr,
            shutdown,
            reaper,
        })
    }

    /// The bound address; with a requested port of 0 this carries the port
    /// the OS chose.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.reaper.abort();
    }
}
