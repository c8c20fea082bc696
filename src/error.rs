//! Error taxonomy for the quiz backend.
//!
//! Data errors are user-correctable and map to 400. Dataset problems are
//! operator-side and map to 500. Missing media maps to 404. Every variant
//! renders as the stable `{ok:false, error}` JSON shape; messages stay
//! human-readable and never expose internals. The only recovery path for a
//! broken token is discarding it and starting a new run, so the token
//! messages say exactly that.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

use crate::protocol::ErrorOut;

#[derive(Debug, Error)]
pub enum QuizError {
  #[error("Level must be between 1 and {max}.")]
  InvalidLevel { max: usize },

  #[error("Run token has expired. Please restart the level.")]
  TokenExpired,
  #[error("Run token is invalid. Please restart the level.")]
  TokenInvalid,
  #[error("Run token is incomplete. Please restart the level.")]
  TokenIncomplete,
  #[error("Missing run token.")]
  MissingToken,

  #[error("This question is not unlocked yet.")]
  QuestionLocked,
  #[error("Invalid question position.")]
  InvalidPosition,
  #[error("Only the next open question can be answered.")]
  NotNextQuestion,
  #[error("Invalid choice.")]
  InvalidChoice,
  #[error("Choice does not belong to this question.")]
  ChoiceMismatch,

  #[error("invalid_json")]
  InvalidBody,
  #[error("invalid_path")]
  MediaInvalidPath,
  #[error("not_found")]
  MediaNotFound,

  // Operator-side setup problems (missing dataset, too few characters, ...).
  #[error("{0}")]
  Dataset(String),
}

impl QuizError {
  pub fn status(&self) -> StatusCode {
    match self {
      QuizError::MediaNotFound => StatusCode::NOT_FOUND,
      QuizError::Dataset(_) => StatusCode::INTERNAL_SERVER_ERROR,
      _ => StatusCode::BAD_REQUEST,
    }
  }
}

impl IntoResponse for QuizError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = ErrorOut {
      ok: false,
      error: self.to_string(),
    };
    (status, Json(body)).into_response()
  }
}
