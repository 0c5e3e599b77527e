use log::debug;

use crate::block::Block;
use crate::{BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL};

/// Difficulty for the next block given the current chain. Re-evaluated only
/// when the head sits on a nonzero adjustment boundary; every other block
/// inherits the head's difficulty. Pure recomputation from chain history.
pub fn next_difficulty(chain: &[Block]) -> u32 {
    let Some(head) = chain.last() else {
        return 0;
    };
    if head.index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 && head.index != 0 {
        adjusted_difficulty(head, chain)
    } else {
        head.difficulty
    }
}

fn adjusted_difficulty(head: &Block, chain: &[Block]) -> u32 {
    let Some(previous_adjustment) = chain
        .len()
        .checked_sub(DIFFICULTY_ADJUSTMENT_INTERVAL as usize)
        .and_then(|i| chain.get(i))
    else {
        return head.difficulty;
    };

    let time_expected = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
    let time_taken = head.timestamp - previous_adjustment.timestamp;

    if time_taken < time_expected / 2 {
        debug!(
            "interval took {}s (expected {}s), raising difficulty to {}",
            time_taken,
            time_expected,
            previous_adjustment.difficulty + 1
        );
        previous_adjustment.difficulty + 1
    } else if time_taken > time_expected * 2 {
        debug!(
            "interval took {}s (expected {}s), lowering difficulty to {}",
            time_taken,
            time_expected,
            previous_adjustment.difficulty.saturating_sub(1)
        );
        previous_adjustment.difficulty.saturating_sub(1)
    } else {
        previous_adjustment.difficulty
    }
}
