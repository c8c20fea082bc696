//! Domain models: characters, levels, and the run payload carried by the
//! signed token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every level has exactly this many questions.
pub const QUESTIONS_PER_LEVEL: usize = 15;

/// Characters with this many or more "unknown" profile values are excluded.
pub const UNKNOWN_LIMIT: usize = 5;

/// A playable quiz needs at least 3 characters (correct + 2 distractors).
pub const MIN_ELIGIBLE: usize = 3;

/// Attribution metadata shipped with every question (the UI offers a source
/// toggle, so this is included whether or not the question is answered).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CharacterSource {
  #[serde(default)] pub page_url: String,
  #[serde(default)] pub attribution: String,
  #[serde(default)] pub page_title: String,
  #[serde(default)] pub text_license_default: String,
  #[serde(default)] pub text_license_url: String,
  #[serde(default)] pub retrieved_at: String,
  #[serde(default)] pub revision_id: Option<i64>,
  #[serde(default)] pub revision_timestamp: String,
}

/// A character that survived validation: slug id, display name, an image
/// that exists under the media root, and a non-empty profile.
#[derive(Clone, Debug)]
pub struct Character {
  pub id: String,
  pub name: String,
  pub image_rel: String,
  pub profile: BTreeMap<String, String>,
  pub source: CharacterSource,
}

/// One level: exactly `QUESTIONS_PER_LEVEL` character ids in play order.
/// Derived deterministically from the dataset, cached for the process
/// lifetime.
#[derive(Clone, Debug)]
pub struct Level {
  pub level: u32,
  pub title: String,
  pub character_ids: Vec<String>,
}

/// Per-question spec inside a run: the correct id plus the 3 option ids in
/// display order. Fixed at run creation, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
  pub cid: String,
  pub opt: Vec<String>,
}

/// The full state of one quiz attempt. This struct *is* the session: it
/// round-trips through the signed run token on every request and the server
/// keeps no copy of it.
///
/// Invariants:
/// - `ans[i]` / `ok[i]` are `Some` iff `i < next`,
/// - `next` only ever increases (0..=15; 15 means complete),
/// - `score` equals the number of `Some(true)` entries in `ok`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
  pub v: u32,
  pub rid: String,
  pub lvl: u32,
  pub t0: i64,
  pub score: u32,
  pub next: usize,
  pub qs: Vec<QuestionSpec>,
  pub ans: Vec<Option<String>>,
  pub ok: Vec<Option<bool>>,
}

impl Run {
  pub fn is_done(&self) -> bool {
    self.next >= QUESTIONS_PER_LEVEL
  }
}
