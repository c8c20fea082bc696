//! Signed run-token codec.
//!
//! A token carries the *entire* run state between stateless requests:
//! `base64url(json).base64url(timestamp).base64url(hmac-sha256 signature)`
//! (URL-safe alphabet, no padding). The JSON envelope is `{"k":"run","p":…}`
//! so a token minted for one purpose can never be replayed as another.
//!
//! Decoding checks, in order: token shape, signature (constant time),
//! freshness, kind tag, required payload fields, array lengths, and the
//! `next` cursor range. Each failure class maps to a distinct error so the
//! client can be told "expired" vs "invalid"; there is deliberately no
//! partial recovery of a corrupt token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::domain::{Run, QUESTIONS_PER_LEVEL};
use crate::error::QuizError;
use crate::util;

type HmacSha256 = Hmac<Sha256>;

/// Versioned salt: bump to invalidate every outstanding token at once.
const TOKEN_SALT: &str = "paw-quiz-v2";
const TOKEN_KIND_RUN: &str = "run";

const REQUIRED_RUN_FIELDS: [&str; 8] = ["rid", "lvl", "score", "next", "qs", "ans", "ok", "t0"];

/// Signing secret: the operator-supplied value when present, otherwise the
/// hex digest of the dataset bytes. The fallback means a dataset edit
/// silently invalidates outstanding tokens, which is the accepted tradeoff
/// for zero-config deployment.
pub fn derive_secret(app_secret: Option<&str>, dataset_bytes: &[u8]) -> String {
  match app_secret.map(str::trim).filter(|s| !s.is_empty()) {
    Some(s) => s.to_string(),
    None => {
      let digest = Sha256::digest(dataset_bytes);
      digest.iter().map(|b| format!("{b:02x}")).collect()
    }
  }
}

#[derive(Clone)]
pub struct TokenSigner {
  key: Vec<u8>,
  max_age_s: i64,
}

impl TokenSigner {
  pub fn new(secret: &str, max_age_s: i64) -> Self {
    // Salted key derivation: tokens from other deployments (or other salt
    // versions) never verify here even with the same secret.
    let mut mac =
      HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(TOKEN_SALT.as_bytes());
    let key = mac.finalize().into_bytes().to_vec();
    Self { key, max_age_s }
  }

  /// Encode and sign a run with the current timestamp.
  pub fn encode_run(&self, run: &Run) -> Result<String, QuizError> {
    self.encode_run_at(run, util::now_unix())
  }

  fn encode_run_at(&self, run: &Run, ts: i64) -> Result<String, QuizError> {
    let envelope = serde_json::json!({ "k": TOKEN_KIND_RUN, "p": run });
    let payload = serde_json::to_vec(&envelope)
      .map_err(|e| QuizError::Dataset(format!("run serialization failed: {e}")))?;
    Ok(self.seal(&payload, ts))
  }

  fn seal(&self, payload: &[u8], ts: i64) -> String {
    let body = URL_SAFE_NO_PAD.encode(payload);
    let signed_part = format!("{body}.{}", encode_ts(ts));
    format!("{signed_part}.{}", self.sign(&signed_part))
  }

  fn sign(&self, signed_part: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
    mac.update(signed_part.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
  }

  /// Verify, expire-check, and deserialize a run token.
  pub fn decode_run(&self, token: &str) -> Result<Run, QuizError> {
    if !util::is_token_shaped(token) {
      return Err(QuizError::TokenInvalid);
    }
    let (signed_part, sig_b64) = token.rsplit_once('.').ok_or(QuizError::TokenInvalid)?;
    let (body_b64, ts_b64) = signed_part.rsplit_once('.').ok_or(QuizError::TokenInvalid)?;

    // Signature first: nothing behind it is trusted until it verifies.
    let sig = URL_SAFE_NO_PAD
      .decode(sig_b64)
      .map_err(|_| QuizError::TokenInvalid)?;
    let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
    mac.update(signed_part.as_bytes());
    mac.verify_slice(&sig).map_err(|_| QuizError::TokenInvalid)?;

    let ts = decode_ts(ts_b64)?;
    if util::now_unix() - ts > self.max_age_s {
      return Err(QuizError::TokenExpired);
    }

    let raw = URL_SAFE_NO_PAD
      .decode(body_b64)
      .map_err(|_| QuizError::TokenInvalid)?;
    let envelope: serde_json::Value =
      serde_json::from_slice(&raw).map_err(|_| QuizError::TokenInvalid)?;
    if envelope.get("k").and_then(|k| k.as_str()) != Some(TOKEN_KIND_RUN) {
      return Err(QuizError::TokenInvalid);
    }
    let payload = envelope
      .get("p")
      .and_then(|p| p.as_object())
      .ok_or(QuizError::TokenInvalid)?;
    if REQUIRED_RUN_FIELDS.iter().any(|f| !payload.contains_key(*f)) {
      return Err(QuizError::TokenIncomplete);
    }

    let run: Run = serde_json::from_value(serde_json::Value::Object(payload.clone()))
      .map_err(|_| QuizError::TokenInvalid)?;
    if run.qs.len() != QUESTIONS_PER_LEVEL
      || run.ans.len() != QUESTIONS_PER_LEVEL
      || run.ok.len() != QUESTIONS_PER_LEVEL
      || run.next > QUESTIONS_PER_LEVEL
    {
      return Err(QuizError::TokenInvalid);
    }
    Ok(run)
  }
}

/// Timestamps travel as big-endian bytes with leading zeros stripped.
fn encode_ts(ts: i64) -> String {
  let bytes = ts.to_be_bytes();
  let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
  URL_SAFE_NO_PAD.encode(&bytes[first..])
}

fn decode_ts(s: &str) -> Result<i64, QuizError> {
  let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| QuizError::TokenInvalid)?;
  if bytes.is_empty() || bytes.len() > 8 {
    return Err(QuizError::TokenInvalid);
  }
  let mut buf = [0u8; 8];
  buf[8 - bytes.len()..].copy_from_slice(&bytes);
  Ok(i64::from_be_bytes(buf))
}
