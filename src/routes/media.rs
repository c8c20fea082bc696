//! Media file serving: bounded reads from under the configured media root,
//! with long-lived cache headers. Path resolution refuses traversal before
//! any filesystem access.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::header,
  response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::dataset;
use crate::error::QuizError;
use crate::state::AppState;

const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=2592000, immutable";

#[instrument(level = "info", skip(state))]
pub async fn http_media(
  State(state): State<Arc<AppState>>,
  Path(rel_path): Path<String>,
) -> Result<Response, QuizError> {
  let fp = dataset::safe_media_path(&state.cfg.data_base_dir, &rel_path)?;
  if !fp.is_file() {
    return Err(QuizError::MediaNotFound);
  }
  let bytes = tokio::fs::read(&fp)
    .await
    .map_err(|_| QuizError::MediaNotFound)?;
  Ok(
    (
      [
        (header::CONTENT_TYPE, mime_for_path(&fp)),
        (header::CACHE_CONTROL, CACHE_CONTROL_IMMUTABLE),
      ],
      bytes,
    )
      .into_response(),
  )
}

fn mime_for_path(p: &std::path::Path) -> &'static str {
  let ext = p
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("png") => "image/png",
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    Some("svg") => "image/svg+xml",
    _ => "application/octet-stream",
  }
}
