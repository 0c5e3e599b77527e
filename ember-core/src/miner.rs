use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde_json::Value;

use crate::block::{calculate_hash, Block};
use crate::hashing::hash_matches_difficulty;

/// Nonces tried between cancellation checks. Keeps abort latency bounded
/// without paying an atomic load per hash.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Search nonces from zero upward until the digest carries `difficulty`
/// leading zero bits, and return the fully formed block. Expected cost is
/// about 2^difficulty hash evaluations and there is no upper bound, so this
/// belongs on a dedicated blocking thread. Returns `None` once `cancel` is
/// observed raised.
pub fn find_block(
    next_index: u64,
    previous_hash: &str,
    timestamp: i64,
    data: Value,
    difficulty: u32,
    cancel: &AtomicBool,
) -> Option<Block> {
    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            debug!("mining cancelled after {} attempts", nonce);
            return None;
        }
        let hash = calculate_hash(next_index, previous_hash, timestamp, &data, difficulty, nonce);
        if hash_matches_difficulty(&hash, difficulty) {
            debug!("found block {} after {} attempts", next_index, nonce + 1);
            return Some(Block {
                index: next_index,
                previous_hash: previous_hash.to_string(),
                timestamp,
                data,
                hash,
                difficulty,
                nonce,
            });
        }
        nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis_block;
    use crate::validator::validate_successor;
    use serde_json::json;

    #[test]
    fn mined_blocks_meet_the_difficulty_and_extend_the_head() {
        let genesis = genesis_block();
        let difficulty = 8;
        let block = find_block(
            1,
            &genesis.hash,
            genesis.timestamp + 10,
            json!("mined payload"),
            difficulty,
            &AtomicBool::new(false),
        )
        .unwrap();

        assert!(hash_matches_difficulty(&block.hash, difficulty));
        assert_eq!(block.hash, block.hash_for_block());
        assert_eq!(validate_successor(&block, &genesis), Ok(()));
    }

    #[test]
    fn nonce_search_starts_at_zero() {
        // Difficulty zero accepts the very first digest.
        let block = find_block(1, "", 0, json!("x"), 0, &AtomicBool::new(false)).unwrap();
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn a_raised_cancel_flag_stops_the_search() {
        let cancelled = AtomicBool::new(true);
        // Infeasible difficulty; only cancellation can end the loop.
        assert_eq!(find_block(1, "", 0, json!("x"), 250, &cancelled), None);
    }
}
