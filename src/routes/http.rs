//! HTTP endpoint handlers. These are thin wrappers that forward to the run
//! state machine in `logic`; each one is instrumented, and malformed JSON
//! bodies map to the fixed `invalid_json` data error.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::error::QuizError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  match state.quiz_data().await {
    Ok(_) => (StatusCode::OK, Json(HealthOut { ok: true, error: None })),
    Err(e) => {
      let mut msg = e.to_string();
      msg.truncate(240);
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(HealthOut { ok: false, error: Some(msg) }),
      )
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_levels(
  State(state): State<Arc<AppState>>,
) -> Result<Json<LevelsOut>, QuizError> {
  let data = state.quiz_data().await?;
  let levels = data
    .levels
    .iter()
    .map(|lv| LevelOut {
      level: lv.level,
      title: lv.title.clone(),
      questions: lv.character_ids.len(),
    })
    .collect();
  Ok(Json(LevelsOut {
    ok: true,
    levels,
    eligible_total: data.eligible.len(),
  }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_run_start(
  State(state): State<Arc<AppState>>,
  body: Result<Json<StartIn>, JsonRejection>,
) -> Result<Json<StartOut>, QuizError> {
  let Json(body) = body.map_err(|_| QuizError::InvalidBody)?;
  let data = state.quiz_data().await?;
  let out = logic::start(&data, body.level)?;
  info!(target: "quiz", level = body.level, "HTTP run started");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_run_resume(
  State(state): State<Arc<AppState>>,
  body: Result<Json<ResumeIn>, JsonRejection>,
) -> Result<Json<RunStepOut>, QuizError> {
  let Json(body) = body.map_err(|_| QuizError::InvalidBody)?;
  let data = state.quiz_data().await?;
  let out = logic::resume(&data, &body.run)?;
  info!(target: "quiz", next = out.state.next, done = out.done, "HTTP run resumed");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_run_question(
  State(state): State<Arc<AppState>>,
  body: Result<Json<QuestionIn>, JsonRejection>,
) -> Result<Json<QuestionStepOut>, QuizError> {
  let Json(body) = body.map_err(|_| QuizError::InvalidBody)?;
  let data = state.quiz_data().await?;
  let out = logic::view_question(&data, &body.run, body.pos)?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_run_answer(
  State(state): State<Arc<AppState>>,
  body: Result<Json<AnswerIn>, JsonRejection>,
) -> Result<Json<RunStepOut>, QuizError> {
  let Json(body) = body.map_err(|_| QuizError::InvalidBody)?;
  let data = state.quiz_data().await?;
  let out = logic::answer(&data, &body.run, body.pos, &body.choice_id)?;
  info!(target: "quiz", pos = body.pos, score = out.state.score, done = out.done, "HTTP answer evaluated");
  Ok(Json(out))
}
