//! Conversion boundary: drive the Marp CLI to turn Markdown into a PPTX.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;
use tokio::{fs, process::Command};
use tracing::{info, warn};

use crate::config::DEFAULT_MARP_CLI_PATH;

const SOURCE: &str = "application::render";
const INPUT_NAME: &str = "deck.md";
const OUTPUT_NAME: &str = "presentation.pptx";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to prepare conversion workspace: {0}")]
    Workspace(std::io::Error),
    #[error("marp executable `{bin}` not found")]
    NotFound {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn marp CLI: {0}")]
    Spawn(std::io::Error),
    #[error("marp CLI failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("marp CLI did not produce output at {}", .0.display())]
    NoOutput(PathBuf),
}

/// A converted deck. The working directory travels with the result so the
/// caller discards it once the output has been copied elsewhere.
#[derive(Debug)]
pub struct RenderedDeck {
    pub workdir: TempDir,
    pub output: PathBuf,
    pub filename: String,
}

/// The external document-generation capability: given Markdown, produce a
/// PPTX file or fail.
#[async_trait]
pub trait DeckRenderer: Send + Sync {
    async fn render_pptx(&self, markdown: &str) -> Result<RenderedDeck, RenderError>;
}

/// Marp CLI invoker.
///
/// Each call works in an isolated temporary directory so ambient
/// `.marprc.*` files cannot leak into the conversion.
#[derive(Debug, Clone)]
pub struct MarpRenderer {
    cli_path: PathBuf,
}

impl MarpRenderer {
    pub fn new(cli_path: PathBuf) -> Self {
        Self { cli_path }
    }

    /// Prefer a project-local `node_modules/.bin` binary when the default
    /// name is configured; an explicitly configured path is used as-is.
    async fn preferred_bin(&self) -> PathBuf {
        if self.cli_path != Path::new(DEFAULT_MARP_CLI_PATH) {
            return self.cli_path.clone();
        }
        let local = Path::new("node_modules").join(".bin").join(local_bin_name());
        match fs::try_exists(&local).await {
            Ok(true) => local,
            _ => self.cli_path.clone(),
        }
    }

    async fn invoke(&self, bin: &Path, workdir: &Path) -> Result<(), RenderError> {
        let started_at = Instant::now();
        let output = Command::new(bin)
            .arg(INPUT_NAME)
            .arg("--pptx")
            .arg("-o")
            .arg(OUTPUT_NAME)
            .arg("--quiet")
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    RenderError::NotFound {
                        bin: bin.to_path_buf(),
                        source: err,
                    }
                } else {
                    RenderError::Spawn(err)
                }
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                target = SOURCE,
                bin = %bin.display(),
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                stderr = %stderr,
                "marp CLI invocation failed"
            );
            return Err(RenderError::Cli { exit_code, stderr });
        }

        info!(
            target = SOURCE,
            bin = %bin.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "marp CLI conversion completed"
        );
        Ok(())
    }
}

fn local_bin_name() -> &'static str {
    if cfg!(windows) { "marp.cmd" } else { "marp" }
}

#[async_trait]
impl DeckRenderer for MarpRenderer {
    async fn render_pptx(&self, markdown: &str) -> Result<RenderedDeck, RenderError> {
        let workdir = tempfile::Builder::new()
            .prefix("deckmill-render-")
            .tempdir()
            .map_err(RenderError::Workspace)?;
        fs::write(workdir.path().join(INPUT_NAME), markdown)
            .await
            .map_err(RenderError::Workspace)?;

        let preferred = self.preferred_bin().await;
        match self.invoke(&preferred, workdir.path()).await {
            Ok(()) => {}
            // The one alternate invocation strategy: a missing preferred
            // binary falls back to the configured name on PATH. Engine
            // failures are terminal.
            Err(RenderError::NotFound { .. }) if preferred != self.cli_path => {
                warn!(
                    target = SOURCE,
                    preferred = %preferred.display(),
                    fallback = %self.cli_path.display(),
                    "preferred marp binary unavailable; retrying via PATH"
                );
                self.invoke(&self.cli_path, workdir.path()).await?;
            }
            Err(err) => return Err(err),
        }

        let output = workdir.path().join(OUTPUT_NAME);
        match fs::try_exists(&output).await {
            Ok(true) => {}
            _ => return Err(RenderError::NoOutput(output)),
        }

        Ok(RenderedDeck {
            workdir,
            output,
            filename: OUTPUT_NAME.to_string(),
        })
    }
}
