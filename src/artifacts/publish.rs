//! Bridge from "a file was produced" to "here is a link".

use std::{
    net::IpAddr,
    path::Path,
    sync::Arc,
    time::Duration,
};

use metrics::counter;
use slug::slugify;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::{
    config::{ServerSettings, Settings},
    infra::{error::InfraError, http::DownloadServer},
};

use super::store::ArtifactStore;

const SOURCE: &str = "artifacts::publish";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Server(#[from] InfraError),
    #[error("failed to stage artifact: {0}")]
    Stage(std::io::Error),
    #[error("failed to build download URL: {0}")]
    Url(String),
}

/// Result of a successful publish, ready for presentation to the caller.
#[derive(Debug, Clone)]
pub struct Published {
    pub id: Uuid,
    pub url: Url,
    pub filename: String,
    pub expires_at: OffsetDateTime,
}

/// Registers freshly produced files and hands out their download links.
///
/// The download server is started by the first publish, not at process
/// boot, and then lives for the rest of the process.
pub struct Publisher {
    store: Arc<ArtifactStore>,
    server_settings: ServerSettings,
    sweep_interval: Duration,
    ttl: Duration,
    server: OnceCell<DownloadServer>,
}

impl Publisher {
    pub fn new(store: Arc<ArtifactStore>, settings: &Settings) -> Self {
        Self {
            store,
            server_settings: settings.server,
            sweep_interval: settings.artifacts.sweep_interval,
            ttl: settings.artifacts.ttl,
            server: OnceCell::new(),
        }
    }

    /// Copy `source` into store-owned storage under `filename` and return
    /// the fully qualified download URL plus expiry.
    pub async fn publish(
        &self,
        source: &Path,
        filename: &str,
        content_type: &str,
    ) -> Result<Published, PublishError> {
        let server = self
            .server
            .get_or_try_init(|| {
                DownloadServer::start(
                    self.store.clone(),
                    self.server_settings,
                    self.sweep_interval,
                )
            })
            .await?;

        let filename = sanitize_filename(filename);
        let entry = self
            .store
            .register(source, &filename, content_type, self.ttl)
            .await
            .map_err(PublishError::Stage)?;

        let url = download_url(
            self.server_settings.host,
            server.addr().port(),
            entry.id,
            &filename,
        )?;

        counter!("deckmill_publish_total").increment(1);
        info!(
            target = SOURCE,
            id = %entry.id,
            url = %url,
            expires_at = %entry.expires_at,
            "artifact published"
        );

        Ok(Published {
            id: entry.id,
            url,
            filename,
            expires_at: entry.expires_at,
        })
    }

    /// Stop the download server and its reaper if they ever started.
    pub fn shutdown(&self) {
        if let Some(server) = self.server.get() {
            server.shutdown();
        }
    }
}

fn download_url(
    host: IpAddr,
    port: u16,
    id: Uuid,
    filename: &str,
) -> Result<Url, PublishError> {
    let authority = match host {
        IpAddr::V6(v6) => format!("[{v6}]"),
        IpAddr::V4(v4) => v4.to_string(),
    };
    let mut url = Url::parse(&format!("http://{authority}:{port}/"))
        .map_err(|err| PublishError::Url(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| PublishError::Url("base URL cannot carry a path".to_string()))?
        .push("files")
        .push(&id.to_string())
        .push(filename);
    Ok(url)
}

/// Normalise a declared filename before it is used on disk: slugged stem
/// plus a lowercased extension.
fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("artifact");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "artifact".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}
