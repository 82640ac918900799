//! Periodic sweep of expired artifacts.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::info;

use super::store::ArtifactStore;

const SOURCE: &str = "artifacts::reaper";

/// Spawn the background sweep loop. The returned handle is owned by the
/// download server and aborted on shutdown.
pub(crate) fn spawn(store: Arc<ArtifactStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the first immediate tick
        loop {
            ticker.tick().await;
            let reaped = store.sweep().await;
            if reaped > 0 {
                counter!("deckmill_reaped_total").increment(reaped as u64);
                info!(
                    target = SOURCE,
                    reaped,
                    remaining = store.len(),
                    "swept expired artifacts"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::fs;

    use super::*;

    #[tokio::test]
    async fn reaper_sweeps_on_its_cadence() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = scratch.path().join("deck.pptx");
        fs::write(&source, b"bytes").await.expect("write source");

        let store = Arc::new(ArtifactStore::new().expect("store"));
        let entry = store
            .register(
                &source,
                "deck.pptx",
                "application/octet-stream",
                Duration::from_millis(50),
            )
            .await
            .expect("register");
        let dir = entry.path.parent().expect("entry dir").to_path_buf();

        let handle = spawn(store.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        assert!(store.is_empty());
        assert!(!fs::try_exists(&dir).await.expect("dir check"));
    }
}
