//! Deterministic level construction.
//!
//! Levels must be stable across restarts for a given dataset: the master
//! seed comes from a SHA-256 digest of the dataset bytes, and every shuffle
//! stage draws from its own HMAC-derived stream so one stage cannot disturb
//! another. Any dataset edit reshuffles all levels deterministically.

use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::{Character, Level, QUESTIONS_PER_LEVEL};

/// First 8 digest bytes of the dataset content, big-endian.
pub fn master_seed(dataset_bytes: &[u8]) -> u64 {
  let digest = Sha256::digest(dataset_bytes);
  u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Per-stage RNG, keyed by `(master seed, domain tag)`.
fn stream_rng(master: u64, tag: &str) -> StdRng {
  let mut mac = Hmac::<Sha256>::new_from_slice(&master.to_be_bytes())
    .expect("8-byte seed is a valid hmac key");
  mac.update(tag.as_bytes());
  let digest = mac.finalize().into_bytes();
  let seed = u64::from_be_bytes(digest[..8].try_into().expect("digest slice length"));
  StdRng::seed_from_u64(seed)
}

/// Partition the eligible characters into `ceil(n / 15)` levels of exactly
/// 15 question slots each. The final short chunk is topped up from the
/// unused remainder; only when that pool runs dry are duplicates drawn from
/// the full ordering (tiny datasets: repeats beat a short level).
///
/// Callers guarantee `eligible` is non-empty (the dataset filter enforces a
/// minimum of 3).
pub fn build_levels(eligible: &[Character], master: u64) -> Vec<Level> {
  let n = eligible.len();
  let level_count = ((n + QUESTIONS_PER_LEVEL - 1) / QUESTIONS_PER_LEVEL).max(1);

  let mut ordered: Vec<String> = eligible.iter().map(|c| c.id.clone()).collect();
  ordered.shuffle(&mut stream_rng(master, "global-order"));

  let mut levels = Vec::with_capacity(level_count);
  for lv in 1..=level_count {
    let start = (lv - 1) * QUESTIONS_PER_LEVEL;
    let end = (start + QUESTIONS_PER_LEVEL).min(ordered.len());
    let mut chunk: Vec<String> = ordered[start..end].to_vec();

    if chunk.len() < QUESTIONS_PER_LEVEL {
      let mut pool: Vec<String> = ordered
        .iter()
        .filter(|id| !chunk.contains(id))
        .cloned()
        .collect();
      let mut fill = stream_rng(master, &format!("fill:{lv}"));
      while chunk.len() < QUESTIONS_PER_LEVEL {
        if pool.is_empty() {
          let i = fill.gen_range(0..ordered.len());
          chunk.push(ordered[i].clone());
        } else {
          let i = fill.gen_range(0..pool.len());
          chunk.push(pool.swap_remove(i));
        }
      }
    }

    levels.push(Level {
      level: lv as u32,
      title: format!("Level {lv}"),
      character_ids: chunk,
    });
  }

  info!(target: "quiz", eligible = n, levels = levels.len(), "Levels computed");
  levels
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::CharacterSource;
  use std::collections::BTreeMap;
  use std::collections::HashSet;

  fn characters(n: usize) -> Vec<Character> {
    (0..n)
      .map(|i| Character {
        id: format!("char-{i}"),
        name: format!("Char {i}"),
        image_rel: format!("images/char-{i}.png"),
        profile: BTreeMap::from([("Beruf".to_string(), "Held".to_string())]),
        source: CharacterSource::default(),
      })
      .collect()
  }

  #[test]
  fn level_count_follows_ceil_of_eligible_over_15() {
    for (n, expected) in [(3, 1), (15, 1), (16, 2), (30, 2), (31, 3), (47, 4)] {
      let levels = build_levels(&characters(n), 7);
      assert_eq!(levels.len(), expected, "n={n}");
      for lv in &levels {
        assert_eq!(lv.character_ids.len(), QUESTIONS_PER_LEVEL);
      }
    }
  }

  #[test]
  fn same_dataset_bytes_give_identical_levels() {
    let bytes = b"{\"characters\": [\"fixture\"]}";
    let master = master_seed(bytes);
    assert_eq!(master, master_seed(bytes));

    let chars = characters(40);
    let a = build_levels(&chars, master);
    let b = build_levels(&chars, master);
    assert_eq!(a.len(), b.len());
    for (la, lb) in a.iter().zip(b.iter()) {
      assert_eq!(la.character_ids, lb.character_ids);
    }
  }

  #[test]
  fn different_master_seed_reshuffles() {
    let chars = characters(40);
    let a = build_levels(&chars, 1);
    let b = build_levels(&chars, 2);
    let flat = |ls: &[Level]| -> Vec<String> {
      ls.iter().flat_map(|l| l.character_ids.clone()).collect()
    };
    assert_ne!(flat(&a), flat(&b));
  }

  #[test]
  fn short_final_chunk_is_filled_from_the_unused_pool_first() {
    // 20 eligible: level 2 starts with 5 and must pull its 10 fill ids from
    // the 15 already used by level 1, without duplicating its own 5.
    let levels = build_levels(&characters(20), 99);
    assert_eq!(levels.len(), 2);
    let l2 = &levels[1].character_ids;
    assert_eq!(l2.len(), QUESTIONS_PER_LEVEL);
    let distinct: HashSet<&String> = l2.iter().collect();
    assert_eq!(distinct.len(), QUESTIONS_PER_LEVEL);
  }

  #[test]
  fn tiny_pool_falls_back_to_duplicates() {
    let levels = build_levels(&characters(3), 5);
    assert_eq!(levels.len(), 1);
    let ids = &levels[0].character_ids;
    assert_eq!(ids.len(), QUESTIONS_PER_LEVEL);
    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), 3);
  }
}
