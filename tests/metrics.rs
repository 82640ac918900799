//! The artifact lifecycle emits the documented metric keys.

use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use deckmill::{
    application::{
        deck::DeckService,
        render::{DeckRenderer, MarpRenderer},
    },
    artifacts::{ArtifactStore, Publisher},
    config::{ArtifactSettings, LogFormat, LoggingSettings, MarpSettings, ServerSettings, Settings},
};
use metrics_util::debugging::DebuggingRecorder;
use tempfile::TempDir;
use tokio::fs;

const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

fn settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".parse().expect("loopback"),
            port: 0,
        },
        logging: LoggingSettings {
            level: tracing::level_filters::LevelFilter::INFO,
            format: LogFormat::Compact,
        },
        artifacts: ArtifactSettings {
            // Publishes below expire immediately and the sweep runs fast, so
            // the reaper path fires within the test window.
            ttl: Duration::ZERO,
            sweep_interval: Duration::from_millis(500),
        },
        marp: MarpSettings {
            cli_path: PathBuf::from("marp"),
        },
    }
}

#[tokio::test]
async fn lifecycle_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let scratch = TempDir::new().expect("scratch dir");
    let source = scratch.path().join("deck.pptx");
    fs::write(&source, b"bytes").await.expect("write source");

    let store = Arc::new(ArtifactStore::new().expect("store"));
    let publisher = Arc::new(Publisher::new(store.clone(), &settings()));

    // Publish (starts the server and its reaper), then fetch the link:
    // with a zero TTL the first GET hits the expired path, and the reaper
    // sweeps whatever lazy eviction has not already claimed.
    let published = publisher
        .publish(&source, "deck.pptx", PPTX)
        .await
        .expect("publish");
    let expired = reqwest::get(published.url.clone()).await.expect("GET expired");
    assert_eq!(expired.status(), reqwest::StatusCode::GONE);

    let _ = publisher
        .publish(&source, "deck.pptx", PPTX)
        .await
        .expect("second publish");
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(store.is_empty(), "reaper should have swept the second entry");

    // A live entry exercises the download counter.
    let fresh = store
        .register(&source, "deck.pptx", PPTX, Duration::from_secs(60))
        .await
        .expect("register fresh");
    let mut fresh_url = published.url.clone();
    fresh_url
        .path_segments_mut()
        .expect("segments")
        .pop()
        .pop()
        .push(&fresh.id.to_string())
        .push("deck.pptx");
    let ok = reqwest::get(fresh_url).await.expect("GET fresh");
    assert_eq!(ok.status(), reqwest::StatusCode::OK);

    // A renderer pointing at a missing binary exercises the failure counter.
    let renderer: Arc<dyn DeckRenderer> =
        Arc::new(MarpRenderer::new(PathBuf::from("/nonexistent/marp-binary")));
    let service = DeckService::new(renderer, publisher.clone());
    let err = service
        .generate("# Title")
        .await
        .expect_err("conversion must fail");
    assert!(err.to_string().contains("markup conversion failed"));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "deckmill_publish_total",
        "deckmill_download_total",
        "deckmill_download_expired_total",
        "deckmill_reaped_total",
        "deckmill_convert_fail_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    publisher.shutdown();
}
