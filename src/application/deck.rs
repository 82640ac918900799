//! Tool glue: convert, publish, report the link.

use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::artifacts::Publisher;

use super::{
    error::AppError,
    render::DeckRenderer,
};

pub const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

const SOURCE: &str = "application::deck";

/// Everything the caller needs to hand the deck to an end user.
#[derive(Debug, Clone)]
pub struct DeckLink {
    pub url: Url,
    pub expires_at: OffsetDateTime,
    pub filename: String,
    pub content_type: &'static str,
}

pub struct DeckService {
    renderer: Arc<dyn DeckRenderer>,
    publisher: Arc<Publisher>,
}

impl DeckService {
    pub fn new(renderer: Arc<dyn DeckRenderer>, publisher: Arc<Publisher>) -> Self {
        Self {
            renderer,
            publisher,
        }
    }

    /// Convert the Markdown into a PPTX and publish it under a fresh
    /// download link with the configured TTL.
    pub async fn generate(&self, markdown: &str) -> Result<DeckLink, AppError> {
        if markdown.trim().is_empty() {
            return Err(AppError::validation("markdown cannot be empty"));
        }

        let deck = match self.renderer.render_pptx(markdown).await {
            Ok(deck) => deck,
            Err(err) => {
                counter!("deckmill_convert_fail_total").increment(1);
                return Err(AppError::Render(err));
            }
        };
        debug!(
            target = SOURCE,
            workdir = %deck.workdir.path().display(),
            "deck converted"
        );

        let published = self
            .publisher
            .publish(&deck.output, &deck.filename, PPTX_MIME)
            .await?;
        // The conversion workspace is no longer needed once the copy exists.
        drop(deck);

        Ok(DeckLink {
            url: published.url,
            expires_at: published.expires_at,
            filename: published.filename,
            content_type: PPTX_MIME,
        })
    }
}
