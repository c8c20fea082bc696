//! Public protocol structs for the JSON API (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

// ---- Requests ----

#[derive(Debug, Deserialize)]
pub struct StartIn {
    #[serde(default)]
    pub level: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResumeIn {
    #[serde(default)]
    pub run: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionIn {
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub pos: i64,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(default)]
    pub run: String,
    #[serde(default = "default_answer_pos")]
    pub pos: i64,
    #[serde(default)]
    pub choice_id: String,
}

fn default_answer_pos() -> i64 {
    -1
}

// ---- Responses ----

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LevelOut {
    pub level: u32,
    pub title: String,
    pub questions: usize,
}

#[derive(Debug, Serialize)]
pub struct LevelsOut {
    pub ok: bool,
    pub levels: Vec<LevelOut>,
    pub eligible_total: usize,
}

/// Derived view of a run: where the client is looking (`pos`) vs. the first
/// unanswered question (`next`).
#[derive(Debug, Serialize)]
pub struct StateOut {
    pub level: u32,
    pub pos: usize,
    pub next: usize,
    pub total: usize,
    pub score: u32,
    pub done: bool,
}

#[derive(Debug, Serialize)]
pub struct OptionOut {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SourceOut {
    pub attribution: String,
    pub page_url: String,
    pub page_title: String,
    pub text_license_default: String,
    pub text_license_url: String,
    pub retrieved_at: String,
    pub revision_id: Option<i64>,
    pub revision_timestamp: String,
}

/// One question as presented to the client. Reveal fields (`selected_id`,
/// `correct_id`, `correct`) are only populated once the position has been
/// answered; `source` is always populated. The top-level `attribution` /
/// `page_url` duplicates exist for older frontend versions.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub idx: usize,
    pub pos: usize,
    pub total: usize,
    pub image_url: String,
    pub options: Vec<OptionOut>,
    pub answered: bool,
    pub selected_id: Option<String>,
    pub correct_id: Option<String>,
    pub correct: Option<bool>,
    pub source: SourceOut,
    pub attribution: String,
    pub page_url: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryOut {
    pub level: u32,
    pub score: u32,
    pub correct_n: u32,
    pub accuracy: f64,
    pub duration_s: i64,
}

#[derive(Debug, Serialize)]
pub struct StartOut {
    pub ok: bool,
    pub run: String,
    pub state: StateOut,
    pub question: QuestionOut,
}

/// Shared response shape for resume and answer (both may complete the run).
#[derive(Debug, Serialize)]
pub struct RunStepOut {
    pub ok: bool,
    pub updated_run: String,
    pub state: StateOut,
    pub question: QuestionOut,
    pub done: bool,
    pub summary: Option<SummaryOut>,
}

#[derive(Debug, Serialize)]
pub struct QuestionStepOut {
    pub ok: bool,
    pub updated_run: String,
    pub state: StateOut,
    pub question: QuestionOut,
}
