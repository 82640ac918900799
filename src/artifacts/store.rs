//! Authoritative in-memory registry of published artifacts.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "artifacts::store";

/// One published, downloadable file.
///
/// The backing file lives alone in a per-entry directory under the store's
/// root; that directory is the deletion unit, so removing one entry can
/// never touch another entry's bytes.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub id: Uuid,
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub expires_at: OffsetDateTime,
}

/// Outcome of a registry lookup, tagged so HTTP callers can map directly to
/// status codes without re-deriving expiry logic.
#[derive(Debug)]
pub enum Lookup {
    Found(ArtifactEntry),
    NotFound,
    Expired,
}

/// In-memory index of published artifacts plus the temporary directory tree
/// that backs them.
///
/// The index is rebuilt empty on every process start; the root directory is
/// removed when the store is dropped.
pub struct ArtifactStore {
    root: TempDir,
    index: Mutex<HashMap<Uuid, ArtifactEntry>>,
}

impl ArtifactStore {
    pub fn new() -> Result<Self, std::io::Error> {
        let root = tempfile::Builder::new()
            .prefix("deckmill-artifacts-")
            .tempdir()?;
        Ok(Self {
            root,
            index: Mutex::new(HashMap::new()),
        })
    }

    /// Copy `source` into a fresh per-entry directory and index the copy
    /// under a new collision-resistant id.
    ///
    /// The copy completes before the entry becomes observable, so a `Found`
    /// result always refers to a readable file barring out-of-band deletion.
    /// The caller keeps ownership of `source`.
    pub async fn register(
        &self,
        source: &Path,
        filename: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<ArtifactEntry, std::io::Error> {
        let id = Uuid::new_v4();
        let dir = self.root.path().join(id.to_string());
        fs::create_dir(&dir).await?;

        let path = dir.join(filename);
        if let Err(err) = fs::copy(source, &path).await {
            discard_dir(&dir).await;
            return Err(err);
        }

        let entry = ArtifactEntry {
            id,
            path,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        };

        mutex_lock(&self.index, SOURCE, "register").insert(id, entry.clone());
        Ok(entry)
    }

    /// Look up a live entry.
    ///
    /// A present-but-expired entry is removed under the lock and its backing
    /// directory discarded; that call observes `Expired`, every later call
    /// observes `NotFound`.
    pub async fn lookup(&self, id: Uuid) -> Lookup {
        self.lookup_at(id, OffsetDateTime::now_utc()).await
    }

    pub async fn lookup_at(&self, id: Uuid, now: OffsetDateTime) -> Lookup {
        let evicted = {
            let mut index = mutex_lock(&self.index, SOURCE, "lookup");
            match index.get(&id) {
                None => return Lookup::NotFound,
                Some(entry) if now < entry.expires_at => return Lookup::Found(entry.clone()),
                Some(_) => {}
            }
            index.remove(&id)
        };

        if let Some(entry) = evicted {
            discard_entry(&entry).await;
        }
        Lookup::Expired
    }

    /// Remove an entry and its backing directory. Idempotent; absent ids are
    /// a no-op.
    pub async fn remove(&self, id: Uuid) {
        let removed = mutex_lock(&self.index, SOURCE, "remove").remove(&id);
        if let Some(entry) = removed {
            discard_entry(&entry).await;
        }
    }

    /// Remove every entry whose expiry has passed, returning the number
    /// reaped. Directory deletion is best-effort.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_at(&self, now: OffsetDateTime) -> usize {
        let expired: Vec<ArtifactEntry> = {
            let mut index = mutex_lock(&self.index, SOURCE, "sweep");
            let ids: Vec<Uuid> = index
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| index.remove(&id)).collect()
        };

        for entry in &expired {
            discard_entry(entry).await;
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.index, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn discard_entry(entry: &ArtifactEntry) {
    match entry.path.parent() {
        Some(dir) => discard_dir(dir).await,
        None => warn!(
            target = SOURCE,
            id = %entry.id,
            path = %entry.path.display(),
            "artifact path has no parent directory to discard"
        ),
    }
}

/// Best-effort directory removal: failures are logged and never propagated.
async fn discard_dir(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir).await {
        if err.kind() != ErrorKind::NotFound {
            warn!(
                target = SOURCE,
                dir = %dir.display(),
                error = %err,
                "failed to remove artifact directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

    async fn write_source(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).await.expect("write source");
        path
    }

    #[tokio::test]
    async fn register_then_lookup_preserves_metadata() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = write_source(&scratch, "deck.pptx", b"PK fake deck").await;
        let store = ArtifactStore::new().expect("store");

        let entry = store
            .register(&source, "presentation.pptx", PPTX, Duration::from_secs(60))
            .await
            .expect("register");

        match store.lookup(entry.id).await {
            Lookup::Found(found) => {
                assert_eq!(found.filename, "presentation.pptx");
                assert_eq!(found.content_type, PPTX);
                assert_eq!(found.path, entry.path);
            }
            other => panic!("expected Found, got {other:?}"),
        }

        let copied = fs::read(&entry.path).await.expect("read copy");
        assert_eq!(copied, b"PK fake deck");
        // Registration copies; the caller's file is untouched.
        assert!(fs::try_exists(&source).await.expect("source check"));
    }

    #[tokio::test]
    async fn expired_lookup_reports_expired_exactly_once() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = write_source(&scratch, "deck.pptx", b"bytes").await;
        let store = ArtifactStore::new().expect("store");

        let entry = store
            .register(&source, "deck.pptx", PPTX, Duration::from_secs(60))
            .await
            .expect("register");
        let dir = entry.path.parent().expect("entry dir").to_path_buf();

        let later = OffsetDateTime::now_utc() + Duration::from_secs(120);
        assert!(matches!(store.lookup_at(entry.id, later).await, Lookup::Expired));
        assert!(matches!(store.lookup_at(entry.id, later).await, Lookup::NotFound));
        assert!(!fs::try_exists(&dir).await.expect("dir check"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_never_expired() {
        let store = ArtifactStore::new().expect("store");
        assert!(matches!(store.lookup(Uuid::new_v4()).await, Lookup::NotFound));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = write_source(&scratch, "deck.pptx", b"bytes").await;
        let store = ArtifactStore::new().expect("store");

        let entry = store
            .register(&source, "deck.pptx", PPTX, Duration::from_secs(60))
            .await
            .expect("register");

        store.remove(entry.id).await;
        store.remove(entry.id).await;
        assert!(matches!(store.lookup(entry.id).await, Lookup::NotFound));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries_and_their_directories() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = write_source(&scratch, "deck.pptx", b"bytes").await;
        let store = ArtifactStore::new().expect("store");

        let stale = store
            .register(&source, "stale.pptx", PPTX, Duration::from_secs(30))
            .await
            .expect("register stale");
        let fresh = store
            .register(&source, "fresh.pptx", PPTX, Duration::from_secs(3600))
            .await
            .expect("register fresh");
        let stale_dir = stale.path.parent().expect("stale dir").to_path_buf();

        let later = OffsetDateTime::now_utc() + Duration::from_secs(60);
        assert_eq!(store.sweep_at(later).await, 1);

        assert!(!fs::try_exists(&stale_dir).await.expect("stale dir check"));
        assert!(matches!(store.lookup(fresh.id).await, Lookup::Found(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_registrations_yield_distinct_ids() {
        let scratch = TempDir::new().expect("scratch dir");
        let source = write_source(&scratch, "deck.pptx", b"bytes").await;
        let store = Arc::new(ArtifactStore::new().expect("store"));

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                store
                    .register(
                        &source,
                        &format!("deck-{n}.pptx"),
                        PPTX,
                        Duration::from_secs(60),
                    )
                    .await
                    .expect("register")
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.expect("join"));
        }
        assert_eq!(ids.len(), 16);
        assert_eq!(store.len(), 16);
    }
}
