//! Application state: configuration plus the lazily-built quiz data.
//!
//! This module owns:
//!   - the validated character list (name lookups, media paths)
//!   - the eligible subset actually in play
//!   - the deterministic level list
//!   - the token signer (operator secret or dataset-derived)
//!
//! All of it is computed at most once per process lifetime behind a
//! `tokio::sync::OnceCell`, even under a concurrent first wave of requests.
//! Failures are returned per call instead of being cached, so the process
//! still boots with a broken dataset and `/api/health` reports the problem.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use tokio::sync::OnceCell;

use crate::config::QuizConfig;
use crate::dataset;
use crate::domain::{Character, Level};
use crate::error::QuizError;
use crate::levels;
use crate::token::{derive_secret, TokenSigner};

/// Everything derived from the dataset file. Read-only after construction.
pub struct QuizData {
    pub characters: Vec<Character>,
    pub eligible: Vec<Character>,
    pub levels: Vec<Level>,
    pub signer: TokenSigner,
    by_id: HashMap<String, usize>,
}

impl QuizData {
    pub fn new(
        characters: Vec<Character>,
        eligible: Vec<Character>,
        levels: Vec<Level>,
        signer: TokenSigner,
    ) -> Self {
        let by_id = characters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self {
            characters,
            eligible,
            levels,
            signer,
            by_id,
        }
    }

    /// Lookup over the *valid* set (eligibility is irrelevant for display).
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.by_id.get(id).map(|&i| &self.characters[i])
    }
}

pub struct AppState {
    pub cfg: QuizConfig,
    data: OnceCell<Arc<QuizData>>,
}

impl AppState {
    pub fn new(cfg: QuizConfig) -> Self {
        Self {
            cfg,
            data: OnceCell::new(),
        }
    }

    /// Shared quiz data, built on first access. Concurrent first callers
    /// converge on a single computation.
    pub async fn quiz_data(&self) -> Result<Arc<QuizData>, QuizError> {
        self.data
            .get_or_try_init(|| async { build_quiz_data(&self.cfg).map(Arc::new) })
            .await
            .cloned()
    }
}

#[instrument(level = "info", skip_all)]
fn build_quiz_data(cfg: &QuizConfig) -> Result<QuizData, QuizError> {
    let bytes = dataset::load_dataset_bytes(&cfg.data_json_path)?;
    let characters = dataset::parse_characters(&bytes, &cfg.data_base_dir)?;
    let eligible = dataset::eligible_characters(&characters)?;

    let master = levels::master_seed(&bytes);
    let level_list = levels::build_levels(&eligible, master);

    let secret = derive_secret(cfg.app_secret.as_deref(), &bytes);
    let signer = TokenSigner::new(&secret, cfg.run_token_max_age_s);

    info!(
        target: "quiz",
        characters = characters.len(),
        eligible = eligible.len(),
        levels = level_list.len(),
        "Quiz data built"
    );
    Ok(QuizData::new(characters, eligible, level_list, signer))
}
