use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        HeaderName, HeaderValue, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
            CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS,
        },
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::counter;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::fs;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::error::HttpError,
    artifacts::store::{ArtifactEntry, Lookup},
    util::rfc3339,
};

use super::DownloadState;

const SOURCE: &str = "infra::http::download";
const EXPIRES_HEADER: HeaderName = HeaderName::from_static("x-expires-at");

// Everything outside unreserved characters is escaped in the
// Content-Disposition filename.
const FILENAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// `GET /files/{id}/{filename}`.
///
/// Only the id drives the lookup; the trailing segment merely names the file
/// a client saves.
pub(crate) async fn serve_artifact(
    State(state): State<DownloadState>,
    Path((id, _display_name)): Path<(String, String)>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found("artifact id is not recognized");
    };

    match state.store.lookup(id).await {
        Lookup::NotFound => not_found("no artifact is registered under this id"),
        Lookup::Expired => {
            counter!("deckmill_download_expired_total").increment(1);
            HttpError::new(
                SOURCE,
                StatusCode::GONE,
                "Download link expired",
                "the artifact's time-to-live has elapsed",
            )
            .into_response()
        }
        Lookup::Found(entry) => match fs::read(&entry.path).await {
            Ok(data) => {
                counter!("deckmill_download_total").increment(1);
                build_artifact_response(&entry, Bytes::from(data))
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    id = %entry.id,
                    path = %entry.path.display(),
                    error = %err,
                    "failed to read artifact backing file"
                );
                not_found("the artifact backing file could not be read")
            }
        },
    }
}

fn not_found(detail: &'static str) -> Response {
    HttpError::new(SOURCE, StatusCode::NOT_FOUND, "Artifact not found", detail).into_response()
}

fn build_artifact_response(entry: &ArtifactEntry, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&entry.content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    let disposition = format!(
        "attachment; filename=\"{}\"",
        utf8_percent_encode(&entry.filename, FILENAME_ESCAPES)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&rfc3339(entry.expires_at)) {
        headers.insert(EXPIRES_HEADER, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, max-age=60"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    response
}
