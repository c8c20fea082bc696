//! Dataset loading, the character validity filter, and safe media path
//! resolution.
//!
//! The dataset is a JSON object with a `characters` array. Individual array
//! entries are parsed tolerantly: a malformed record is skipped, never fatal.
//! A record survives validation only if its id is a strict slug, it has a
//! display name, its profile keeps at least one non-blank pair after the key
//! exclusions, and its image resolves safely under the media root and exists.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{Character, CharacterSource, MIN_ELIGIBLE, UNKNOWN_LIMIT};
use crate::error::QuizError;
use crate::util;

/// Profile keys that never count toward the profile / unknown checks.
const EXCLUDE_PROFILE_KEYS: [&str; 2] = ["Stimme (US/Kanada)", "Stimme (UK)"];

#[derive(Debug, Deserialize)]
struct RawDataset {
  characters: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCharacter {
  #[serde(default)]
  id: String,
  #[serde(default)]
  name: String,
  #[serde(default)]
  profile_flat: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  image: RawImage,
  #[serde(default)]
  source: CharacterSource,
}

#[derive(Debug, Default, Deserialize)]
struct RawImage {
  #[serde(default)]
  local_path: String,
}

/// Read the raw dataset file. The bytes also feed the level seed and the
/// derived signing secret, so callers get them verbatim.
pub fn load_dataset_bytes(path: &Path) -> Result<Vec<u8>, QuizError> {
  std::fs::read(path)
    .map_err(|e| QuizError::Dataset(format!("Dataset JSON not readable: {} ({e})", path.display())))
}

/// Parse and validate characters. Returns the valid subset (used for name
/// lookups and media); eligibility is a further filter on top.
pub fn parse_characters(bytes: &[u8], media_root: &Path) -> Result<Vec<Character>, QuizError> {
  let raw: RawDataset = serde_json::from_slice(bytes)
    .map_err(|e| QuizError::Dataset(format!("Dataset must be an object with a characters[] list: {e}")))?;

  let total = raw.characters.len();
  let mut out = Vec::new();
  for value in raw.characters {
    let Ok(rc) = serde_json::from_value::<RawCharacter>(value) else {
      continue;
    };
    let id = rc.id.trim().to_string();
    let name = rc.name.trim().to_string();
    if !util::is_valid_id(&id) || name.is_empty() {
      continue;
    }

    let profile = clean_profile(&rc.profile_flat);
    if profile.is_empty() {
      continue;
    }

    let image_rel = rc.image.local_path.trim().to_string();
    if image_rel.is_empty() {
      continue;
    }
    let Ok(img_path) = safe_media_path(media_root, &image_rel) else {
      continue;
    };
    if !img_path.is_file() {
      continue;
    }

    out.push(Character {
      id,
      name,
      image_rel,
      profile,
      source: rc.source,
    });
  }

  debug!(target: "quiz", total, valid = out.len(), "Character validation pass");
  if out.len() < MIN_ELIGIBLE {
    return Err(QuizError::Dataset(format!(
      "Not enough valid characters with profile + existing images (need >= {MIN_ELIGIBLE})."
    )));
  }
  Ok(out)
}

/// Strip excluded keys and blank pairs; stringify scalar values.
fn clean_profile(pf: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
  let mut clean = BTreeMap::new();
  for (k, v) in pf {
    let key = k.trim();
    if key.is_empty() || EXCLUDE_PROFILE_KEYS.contains(&key) {
      continue;
    }
    let val = match v {
      serde_json::Value::String(s) => s.trim().to_string(),
      serde_json::Value::Number(n) => n.to_string(),
      serde_json::Value::Bool(b) => b.to_string(),
      _ => continue,
    };
    if val.is_empty() {
      continue;
    }
    clean.insert(key.to_string(), val);
  }
  clean
}

fn unknown_count(profile: &BTreeMap<String, String>) -> usize {
  profile
    .values()
    .filter(|v| {
      let v = v.trim();
      v.eq_ignore_ascii_case("unbekannt") || v.eq_ignore_ascii_case("unknown")
    })
    .count()
}

/// The subset of valid characters that is actually in play: fewer than
/// `UNKNOWN_LIMIT` unknown profile values.
pub fn eligible_characters(valid: &[Character]) -> Result<Vec<Character>, QuizError> {
  let eligible: Vec<Character> = valid
    .iter()
    .filter(|c| unknown_count(&c.profile) < UNKNOWN_LIMIT)
    .cloned()
    .collect();
  if eligible.len() < MIN_ELIGIBLE {
    return Err(QuizError::Dataset(format!(
      "Too few eligible characters (need >= {MIN_ELIGIBLE}, got {}; filter: < {UNKNOWN_LIMIT}x unknown).",
      eligible.len()
    )));
  }
  info!(target: "quiz", valid = valid.len(), eligible = eligible.len(), "Eligible character set");
  Ok(eligible)
}

/// Resolve `rel` under `base` and refuse traversal: conservative charset,
/// no absolute paths, no `..`, and the canonicalized target must stay under
/// the canonicalized base.
pub fn safe_media_path(base: &Path, rel: &str) -> Result<PathBuf, QuizError> {
  if rel.is_empty() || !util::is_media_path_shaped(rel) || rel.starts_with('/') || rel.contains("..")
  {
    return Err(QuizError::MediaInvalidPath);
  }
  let base_abs = base.canonicalize().map_err(|_| QuizError::MediaInvalidPath)?;
  let target = base_abs
    .join(rel)
    .canonicalize()
    .map_err(|_| QuizError::MediaNotFound)?;
  if !target.starts_with(&base_abs) {
    return Err(QuizError::MediaInvalidPath);
  }
  Ok(target)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::fs;

  fn temp_media_root() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("paw-quiz-test-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(dir.join("images")).expect("create temp media root");
    dir
  }

  fn write_image(root: &Path, rel: &str) {
    fs::write(root.join(rel), b"\x89PNG").expect("write image fixture");
  }

  fn character_entry(id: &str, unknowns: usize) -> serde_json::Value {
    let mut profile = serde_json::Map::new();
    profile.insert("Beruf".into(), json!("Polizist"));
    for i in 0..unknowns {
      profile.insert(format!("Feld {i}"), json!("Unbekannt"));
    }
    json!({
      "id": id,
      "name": id.to_uppercase(),
      "profile_flat": profile,
      "image": { "local_path": format!("images/{id}.png") },
      "source": { "page_url": "https://example.org/wiki", "attribution": "Example Wiki" }
    })
  }

  fn dataset_bytes(entries: &[serde_json::Value]) -> Vec<u8> {
    serde_json::to_vec(&json!({ "characters": entries })).expect("serialize fixture")
  }

  #[test]
  fn validity_filter_drops_bad_records() {
    let root = temp_media_root();
    for id in ["chase", "skye", "rubble"] {
      write_image(&root, &format!("images/{id}.png"));
    }
    let entries = vec![
      character_entry("chase", 0),
      character_entry("skye", 0),
      character_entry("rubble", 0),
      character_entry("Not-A-Slug", 0),
      json!("junk entry"),
      json!({ "id": "zuma", "name": "", "profile_flat": { "a": "b" } }),
      character_entry("marshall", 0), // no image file on disk
    ];
    let valid = parse_characters(&dataset_bytes(&entries), &root).expect("valid set");
    let ids: Vec<&str> = valid.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["chase", "skye", "rubble"]);
  }

  #[test]
  fn too_few_valid_characters_is_a_dataset_error() {
    let root = temp_media_root();
    write_image(&root, "images/chase.png");
    let entries = vec![character_entry("chase", 0)];
    let err = parse_characters(&dataset_bytes(&entries), &root).unwrap_err();
    assert!(matches!(err, QuizError::Dataset(_)));
  }

  #[test]
  fn eligibility_threshold_counts_unknown_values() {
    let root = temp_media_root();
    for id in ["a1", "a2", "a3", "a4"] {
      write_image(&root, &format!("images/{id}.png"));
    }
    let entries = vec![
      character_entry("a1", 0),
      character_entry("a2", 4), // still below the limit
      character_entry("a3", 5), // at the limit: excluded
      character_entry("a4", 0),
    ];
    let valid = parse_characters(&dataset_bytes(&entries), &root).expect("valid set");
    assert_eq!(valid.len(), 4);
    let eligible = eligible_characters(&valid).expect("eligible set");
    let ids: Vec<&str> = eligible.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a4"]);
  }

  #[test]
  fn excluded_profile_keys_do_not_rescue_a_profile() {
    let pf: BTreeMap<String, serde_json::Value> = [
      ("Stimme (US/Kanada)".to_string(), json!("Somebody")),
      ("Stimme (UK)".to_string(), json!("Somebody Else")),
      ("  ".to_string(), json!("blank key")),
    ]
    .into_iter()
    .collect();
    assert!(clean_profile(&pf).is_empty());
  }

  #[test]
  fn media_path_traversal_is_blocked() {
    let root = temp_media_root();
    write_image(&root, "images/chase.png");
    assert!(safe_media_path(&root, "images/chase.png").is_ok());
    assert!(matches!(
      safe_media_path(&root, "../etc/passwd"),
      Err(QuizError::MediaInvalidPath)
    ));
    assert!(matches!(
      safe_media_path(&root, "/etc/passwd"),
      Err(QuizError::MediaInvalidPath)
    ));
    assert!(matches!(
      safe_media_path(&root, "images/nope.png"),
      Err(QuizError::MediaNotFound)
    ));
  }
}
