//! Run construction and the run state machine.
//!
//! A run's entire state lives inside its signed token. Every operation here
//! decodes a token, validates the requested transition, mutates at most the
//! `next` frontier, and re-encodes. Restricting mutation to exactly one
//! frontier position per call is the core integrity rule: replayed or
//! tampered requests become no-ops or outright rejections without any
//! server-side idempotency tracking.

use rand::seq::SliceRandom;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{QuestionSpec, Run, QUESTIONS_PER_LEVEL};
use crate::error::QuizError;
use crate::protocol::{
  OptionOut, QuestionOut, QuestionStepOut, RunStepOut, SourceOut, StartOut, StateOut, SummaryOut,
};
use crate::state::QuizData;
use crate::util;

pub fn validate_level(data: &QuizData, level: i64) -> Result<u32, QuizError> {
  let max = data.levels.len();
  if level < 1 || level > max as i64 {
    return Err(QuizError::InvalidLevel { max });
  }
  Ok(level as u32)
}

/// Build a fresh run for a level. Unlike level layout, runs are drawn from a
/// non-deterministic CSPRNG: the client must not be able to predict
/// distractors or option order.
pub fn build_run(data: &QuizData, level: u32) -> Result<Run, QuizError> {
  let lv_def = data
    .levels
    .get(level as usize - 1)
    .ok_or(QuizError::InvalidLevel { max: data.levels.len() })?;
  let eligible_ids: Vec<&str> = data.eligible.iter().map(|c| c.id.as_str()).collect();

  let mut rng = rand::thread_rng();
  let mut qs = Vec::with_capacity(QUESTIONS_PER_LEVEL);
  for cid in &lv_def.character_ids {
    let distractor_pool: Vec<&str> = eligible_ids
      .iter()
      .copied()
      .filter(|id| id != cid)
      .collect();
    // A collision (too few distinct distractors) is a data error; a question
    // never ships with fewer than 3 options.
    if distractor_pool.len() < 2 {
      return Err(QuizError::Dataset(
        "Too few distractors in the dataset (need >= 2 besides the answer).".into(),
      ));
    }
    let picks: Vec<&str> = distractor_pool.choose_multiple(&mut rng, 2).copied().collect();
    let mut opt = vec![cid.clone(), picks[0].to_string(), picks[1].to_string()];
    opt.shuffle(&mut rng);
    qs.push(QuestionSpec { cid: cid.clone(), opt });
  }
  if qs.len() != QUESTIONS_PER_LEVEL {
    return Err(QuizError::Dataset(
      "Internal error: level does not contain 15 questions.".into(),
    ));
  }

  Ok(Run {
    v: 1,
    rid: Uuid::new_v4().simple().to_string(),
    lvl: level,
    t0: util::now_unix(),
    score: 0,
    next: 0,
    qs,
    ans: vec![None; QUESTIONS_PER_LEVEL],
    ok: vec![None; QUESTIONS_PER_LEVEL],
  })
}

pub fn state_from_run(run: &Run, view_pos: usize) -> StateOut {
  StateOut {
    level: run.lvl,
    pos: view_pos,
    next: run.next,
    total: QUESTIONS_PER_LEVEL,
    score: run.score,
    done: run.is_done(),
  }
}

/// Render one question. Reveal data (selection, correct id, verdict) only
/// once the position has been answered; attribution is always included.
pub fn question_payload(data: &QuizData, run: &Run, pos: usize) -> Result<QuestionOut, QuizError> {
  let q = run.qs.get(pos).ok_or(QuizError::InvalidPosition)?;
  let ch = data
    .character(&q.cid)
    .ok_or_else(|| QuizError::Dataset("Character not found.".into()))?;

  let options = q
    .opt
    .iter()
    .map(|oid| OptionOut {
      id: oid.clone(),
      text: data
        .character(oid)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| oid.clone()),
    })
    .collect();

  let answered = run.ans[pos].is_some();
  let src = &ch.source;
  Ok(QuestionOut {
    idx: pos + 1,
    pos,
    total: QUESTIONS_PER_LEVEL,
    image_url: format!("/media/{}", ch.image_rel),
    options,
    answered,
    selected_id: run.ans[pos].clone(),
    correct_id: answered.then(|| q.cid.clone()),
    correct: run.ok[pos],
    source: SourceOut {
      attribution: src.attribution.clone(),
      page_url: src.page_url.clone(),
      page_title: src.page_title.clone(),
      text_license_default: src.text_license_default.clone(),
      text_license_url: src.text_license_url.clone(),
      retrieved_at: src.retrieved_at.clone(),
      revision_id: src.revision_id,
      revision_timestamp: src.revision_timestamp.clone(),
    },
    attribution: src.attribution.clone(),
    page_url: src.page_url.clone(),
  })
}

pub fn summary_from_run(run: &Run) -> SummaryOut {
  let correct_n = run.ok.iter().filter(|x| **x == Some(true)).count() as u32;
  SummaryOut {
    level: run.lvl,
    score: run.score,
    correct_n,
    accuracy: f64::from(correct_n) / QUESTIONS_PER_LEVEL as f64,
    // clock skew must not produce a negative duration
    duration_s: (util::now_unix() - run.t0).max(0),
  }
}

fn decode_token(data: &QuizData, token: &str) -> Result<Run, QuizError> {
  if token.trim().is_empty() {
    return Err(QuizError::MissingToken);
  }
  data.signer.decode_run(token.trim())
}

// ---- Operations ----

/// Start(level): build, sign, and present question 0.
#[instrument(level = "info", skip(data))]
pub fn start(data: &QuizData, level: i64) -> Result<StartOut, QuizError> {
  let level = validate_level(data, level)?;
  let run = build_run(data, level)?;
  let token = data.signer.encode_run(&run)?;
  info!(target: "quiz", rid = %run.rid, level, "Run started");
  Ok(StartOut {
    ok: true,
    run: token,
    state: state_from_run(&run, 0),
    question: question_payload(data, &run, 0)?,
  })
}

/// Resume(token): re-validate and show the last answered question (or the
/// first, if none). The token is returned freshly signed.
#[instrument(level = "info", skip(data, token))]
pub fn resume(data: &QuizData, token: &str) -> Result<RunStepOut, QuizError> {
  let run = decode_token(data, token)?;
  let view_pos = run.next.saturating_sub(1);
  let done = run.is_done();
  info!(target: "quiz", rid = %run.rid, level = run.lvl, next = run.next, done, "Run resumed");
  Ok(RunStepOut {
    ok: true,
    updated_run: data.signer.encode_run(&run)?,
    state: state_from_run(&run, view_pos),
    question: question_payload(data, &run, view_pos)?,
    done,
    summary: done.then(|| summary_from_run(&run)),
  })
}

/// View(token, pos): navigation within answered questions plus the current
/// frontier. Never mutates; never allows look-ahead past `next`.
#[instrument(level = "info", skip(data, token))]
pub fn view_question(data: &QuizData, token: &str, pos: i64) -> Result<QuestionStepOut, QuizError> {
  let run = decode_token(data, token)?;
  if pos < 0 || pos > run.next as i64 {
    return Err(QuizError::QuestionLocked);
  }
  let pos = pos as usize;
  if pos >= QUESTIONS_PER_LEVEL {
    return Err(QuizError::InvalidPosition);
  }
  Ok(QuestionStepOut {
    ok: true,
    updated_run: data.signer.encode_run(&run)?,
    state: state_from_run(&run, pos),
    question: question_payload(data, &run, pos)?,
  })
}

/// Answer(token, pos, choice): strictly sequential. Only the frontier
/// position is answerable; past answers are immutable.
#[instrument(level = "info", skip(data, token, choice_id))]
pub fn answer(
  data: &QuizData,
  token: &str,
  pos: i64,
  choice_id: &str,
) -> Result<RunStepOut, QuizError> {
  if !util::is_valid_id(choice_id) {
    return Err(QuizError::InvalidChoice);
  }
  let mut run = decode_token(data, token)?;

  if pos != run.next as i64 {
    return Err(QuizError::NotNextQuestion);
  }
  let pos = pos as usize;
  if pos >= QUESTIONS_PER_LEVEL {
    return Err(QuizError::InvalidPosition);
  }

  let spec = &run.qs[pos];
  if !spec.opt.iter().any(|o| o == choice_id) {
    return Err(QuizError::ChoiceMismatch);
  }
  let is_correct = choice_id == spec.cid;

  run.ans[pos] = Some(choice_id.to_string());
  run.ok[pos] = Some(is_correct);
  if is_correct {
    run.score += 1;
  }
  run.next += 1;

  let done = run.is_done();
  info!(target: "quiz", rid = %run.rid, pos, correct = is_correct, score = run.score, done, "Answer recorded");
  Ok(RunStepOut {
    ok: true,
    updated_run: data.signer.encode_run(&run)?,
    state: state_from_run(&run, pos),
    question: question_payload(data, &run, pos)?,
    done,
    summary: done.then(|| summary_from_run(&run)),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Character, CharacterSource};
  use crate::levels;
  use crate::token::TokenSigner;
  use std::collections::BTreeMap;
  use std::collections::HashSet;

  fn test_data() -> QuizData {
    let characters: Vec<Character> = (0..20)
      .map(|i| Character {
        id: format!("char-{i}"),
        name: format!("Char {i}"),
        image_rel: format!("images/char-{i}.png"),
        profile: BTreeMap::from([("Beruf".to_string(), "Held".to_string())]),
        source: CharacterSource {
          attribution: "Example Wiki".into(),
          page_url: format!("https://example.org/wiki/char-{i}"),
          ..CharacterSource::default()
        },
      })
      .collect();
    let eligible = characters.clone();
    let level_list = levels::build_levels(&eligible, 42);
    QuizData::new(
      characters,
      eligible,
      level_list,
      TokenSigner::new("logic-test-secret", 3600),
    )
  }

  fn correct_id_at(data: &QuizData, token: &str, pos: usize) -> String {
    let run = data.signer.decode_run(token).expect("decode");
    run.qs[pos].cid.clone()
  }

  #[test]
  fn start_presents_question_zero_of_a_fresh_run() {
    let data = test_data();
    let out = start(&data, 1).expect("start");
    assert!(out.ok);
    assert_eq!(out.state.level, 1);
    assert_eq!(out.state.pos, 0);
    assert_eq!(out.state.next, 0);
    assert_eq!(out.state.score, 0);
    assert!(!out.state.done);
    assert!(!out.question.answered);
    assert!(out.question.selected_id.is_none());
    assert!(out.question.correct_id.is_none());
    assert_eq!(out.question.options.len(), 3);
    assert_eq!(out.question.source.attribution, "Example Wiki");
  }

  #[test]
  fn start_rejects_out_of_range_levels() {
    let data = test_data();
    assert_eq!(data.levels.len(), 2);
    assert!(matches!(start(&data, 0), Err(QuizError::InvalidLevel { max: 2 })));
    assert!(matches!(start(&data, 3), Err(QuizError::InvalidLevel { max: 2 })));
  }

  #[test]
  fn every_question_has_three_distinct_options_including_the_answer() {
    let data = test_data();
    let run = build_run(&data, 1).expect("run");
    let eligible: HashSet<&str> = data.eligible.iter().map(|c| c.id.as_str()).collect();
    for q in &run.qs {
      assert_eq!(q.opt.len(), 3);
      let distinct: HashSet<&String> = q.opt.iter().collect();
      assert_eq!(distinct.len(), 3);
      assert_eq!(q.opt.iter().filter(|o| **o == q.cid).count(), 1);
      for o in &q.opt {
        assert!(eligible.contains(o.as_str()));
      }
    }
  }

  #[test]
  fn correct_answer_scores_and_advances_the_frontier() {
    let data = test_data();
    let started = start(&data, 1).expect("start");
    let cid = correct_id_at(&data, &started.run, 0);

    let out = answer(&data, &started.run, 0, &cid).expect("answer");
    assert_eq!(out.state.score, 1);
    assert_eq!(out.state.next, 1);
    assert!(out.question.answered);
    assert_eq!(out.question.correct, Some(true));
    assert_eq!(out.question.correct_id, Some(cid));
    assert!(!out.done);
    assert!(out.summary.is_none());

    // The same position cannot be answered twice.
    let cid_again = correct_id_at(&data, &out.updated_run, 0);
    assert!(matches!(
      answer(&data, &out.updated_run, 0, &cid_again),
      Err(QuizError::NotNextQuestion)
    ));
  }

  #[test]
  fn wrong_answer_records_without_scoring() {
    let data = test_data();
    let started = start(&data, 1).expect("start");
    let run = data.signer.decode_run(&started.run).expect("decode");
    let wrong = run.qs[0]
      .opt
      .iter()
      .find(|o| **o != run.qs[0].cid)
      .expect("a distractor")
      .clone();

    let out = answer(&data, &started.run, 0, &wrong).expect("answer");
    assert_eq!(out.state.score, 0);
    assert_eq!(out.state.next, 1);
    assert_eq!(out.question.correct, Some(false));
    assert_eq!(out.question.selected_id, Some(wrong));
  }

  #[test]
  fn rejected_answers_do_not_mutate_the_run() {
    let data = test_data();
    let started = start(&data, 1).expect("start");
    let run_before = data.signer.decode_run(&started.run).expect("decode");

    // Not the frontier.
    assert!(matches!(
      answer(&data, &started.run, 3, "char-1"),
      Err(QuizError::NotNextQuestion)
    ));
    // Slug-invalid choice.
    assert!(matches!(
      answer(&data, &started.run, 0, "NOT A SLUG"),
      Err(QuizError::InvalidChoice)
    ));
    // Valid slug that is not one of this question's options.
    let outside = data
      .eligible
      .iter()
      .map(|c| c.id.clone())
      .find(|id| !run_before.qs[0].opt.contains(id))
      .expect("an id outside the option set");
    assert!(matches!(
      answer(&data, &started.run, 0, &outside),
      Err(QuizError::ChoiceMismatch)
    ));

    // The old token still decodes to the untouched state.
    let run_after = data.signer.decode_run(&started.run).expect("decode");
    assert_eq!(run_after, run_before);
  }

  #[test]
  fn viewing_never_allows_lookahead_and_never_mutates() {
    let data = test_data();
    let started = start(&data, 1).expect("start");
    assert!(matches!(
      view_question(&data, &started.run, 1),
      Err(QuizError::QuestionLocked)
    ));
    assert!(matches!(
      view_question(&data, &started.run, -1),
      Err(QuizError::QuestionLocked)
    ));

    let cid = correct_id_at(&data, &started.run, 0);
    let answered = answer(&data, &started.run, 0, &cid).expect("answer");

    let v1 = view_question(&data, &answered.updated_run, 0).expect("view");
    let v2 = view_question(&data, &v1.updated_run, 0).expect("view again");
    let r1 = data.signer.decode_run(&v1.updated_run).expect("decode");
    let r2 = data.signer.decode_run(&v2.updated_run).expect("decode");
    assert_eq!(r1, r2);
    assert_eq!(r2.score, 1);
    assert_eq!(r2.next, 1);
    assert!(v2.question.answered);
  }

  #[test]
  fn resume_shows_the_last_answered_question() {
    let data = test_data();
    let started = start(&data, 1).expect("start");

    let fresh = resume(&data, &started.run).expect("resume fresh");
    assert_eq!(fresh.state.pos, 0);
    assert!(!fresh.done);
    assert!(fresh.summary.is_none());

    let mut token = started.run;
    for pos in 0..2 {
      let cid = correct_id_at(&data, &token, pos);
      token = answer(&data, &token, pos as i64, &cid).expect("answer").updated_run;
    }
    let resumed = resume(&data, &token).expect("resume");
    assert_eq!(resumed.state.pos, 1);
    assert_eq!(resumed.state.next, 2);
    assert!(resumed.question.answered);
  }

  #[test]
  fn resume_rejects_tokens_without_content() {
    let data = test_data();
    assert!(matches!(resume(&data, "  "), Err(QuizError::MissingToken)));
    assert!(matches!(
      resume(&data, &"x".repeat(40)),
      Err(QuizError::TokenInvalid)
    ));
  }

  #[test]
  fn completing_all_questions_yields_a_summary() {
    let data = test_data();
    let mut token = start(&data, 2).expect("start").run;
    let mut last = None;
    for pos in 0..QUESTIONS_PER_LEVEL {
      let cid = correct_id_at(&data, &token, pos);
      // miss one on purpose
      let choice = if pos == 4 {
        let run = data.signer.decode_run(&token).expect("decode");
        run.qs[pos].opt.iter().find(|o| **o != cid).expect("distractor").clone()
      } else {
        cid
      };
      let out = answer(&data, &token, pos as i64, &choice).expect("answer");
      token = out.updated_run.clone();
      last = Some(out);
    }

    let out = last.expect("final step");
    assert!(out.done);
    assert!(out.state.done);
    let summary = out.summary.expect("summary");
    assert_eq!(summary.correct_n, 14);
    assert_eq!(summary.score, 14);
    assert!((summary.accuracy - 14.0 / 15.0).abs() < 1e-9);
    assert!(summary.duration_s >= 0);

    // Resuming a complete run reports done + summary, viewed at the last question.
    let resumed = resume(&data, &token).expect("resume complete");
    assert!(resumed.done);
    assert_eq!(resumed.state.pos, QUESTIONS_PER_LEVEL - 1);
    assert!(resumed.summary.is_some());

    // Past the end is never viewable.
    assert!(matches!(
      view_question(&data, &token, QUESTIONS_PER_LEVEL as i64),
      Err(QuizError::InvalidPosition)
    ));
  }
}
