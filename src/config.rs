//! Environment-driven configuration.
//!
//! Recognized variables:
//!   DATA_JSON_PATH      : dataset JSON file (default "out_pawpatrol_characters/characters_de.json")
//!   DATA_BASE_DIR       : media root for character images (default "out_pawpatrol_characters")
//!   APP_SECRET          : token signing secret; if unset, derived from the
//!                         dataset bytes (a dataset edit then invalidates
//!                         outstanding tokens)
//!   RUN_TOKEN_MAX_AGE_S : token lifetime in seconds (default 30 days)

use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_RUN_TOKEN_MAX_AGE_S: i64 = 30 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct QuizConfig {
  pub data_json_path: PathBuf,
  pub data_base_dir: PathBuf,
  pub app_secret: Option<String>,
  pub run_token_max_age_s: i64,
}

impl QuizConfig {
  pub fn from_env() -> Self {
    let data_json_path = std::env::var("DATA_JSON_PATH")
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from("out_pawpatrol_characters/characters_de.json"));
    let data_base_dir = std::env::var("DATA_BASE_DIR")
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from("out_pawpatrol_characters"));

    let app_secret = std::env::var("APP_SECRET")
      .ok()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty());

    let run_token_max_age_s = std::env::var("RUN_TOKEN_MAX_AGE_S")
      .ok()
      .and_then(|v| v.parse::<i64>().ok())
      .unwrap_or(DEFAULT_RUN_TOKEN_MAX_AGE_S);

    let cfg = Self {
      data_json_path,
      data_base_dir,
      app_secret,
      run_token_max_age_s,
    };
    info!(
      target: "paw_quiz_backend",
      data_json_path = %cfg.data_json_path.display(),
      data_base_dir = %cfg.data_base_dir.display(),
      explicit_secret = cfg.app_secret.is_some(),
      run_token_max_age_s = cfg.run_token_max_age_s,
      "Configuration loaded"
    );
    cfg
  }
}
