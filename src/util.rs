//! Small shared helpers: input shape validation and time.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Character ids are strict slugs. Anything else claiming to be an id is
/// rejected before any lookup or comparison.
static ID_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[a-z0-9-]{1,80}$").expect("static pattern"));

/// Cheap shape gate for run tokens, applied before any signature work.
static TOKEN_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{20,8000}$").expect("static pattern"));

/// Relative media paths: conservative charset, bounded length.
static MEDIA_PATH_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-./]{1,220}$").expect("static pattern"));

pub fn is_valid_id(s: &str) -> bool {
  ID_RE.is_match(s)
}

pub fn is_token_shaped(s: &str) -> bool {
  TOKEN_RE.is_match(s)
}

pub fn is_media_path_shaped(s: &str) -> bool {
  MEDIA_PATH_RE.is_match(s)
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn id_shape_accepts_slugs_only() {
    assert!(is_valid_id("chase"));
    assert!(is_valid_id("mayor-goodway-2"));
    assert!(!is_valid_id(""));
    assert!(!is_valid_id("Chase"));
    assert!(!is_valid_id("a b"));
    assert!(!is_valid_id(&"x".repeat(81)));
  }

  #[test]
  fn media_path_shape_rejects_odd_characters() {
    assert!(is_media_path_shaped("images/chase.png"));
    assert!(!is_media_path_shaped("images/\\chase.png"));
    assert!(!is_media_path_shaped("images/ch ase.png"));
    assert!(!is_media_path_shaped(""));
  }

  #[test]
  fn token_shape_needs_min_length_and_charset() {
    assert!(is_token_shaped(&"a".repeat(20)));
    assert!(!is_token_shaped("too-short"));
    assert!(!is_token_shaped(&format!("{}+", "a".repeat(30))));
  }
}
