use std::fmt;

use log::warn;

use crate::block::{genesis_block, Block};
use crate::hashing::hash_matches_difficulty;

/// Why a candidate block failed successor validation. Reported to the
/// caller for diagnostics, never raised as a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidBlockReason {
    IndexMismatch { expected: u64, got: u64 },
    PreviousHashMismatch,
    HashMismatch { computed: String, declared: String },
    DifficultyNotMet,
}

impl fmt::Display for InvalidBlockReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InvalidBlockReason::IndexMismatch { expected, got } => {
                write!(f, "invalid index: expected {}, got {}", expected, got)
            }
            InvalidBlockReason::PreviousHashMismatch => {
                write!(f, "previous hash does not match the prior block's hash")
            }
            InvalidBlockReason::HashMismatch { computed, declared } => {
                write!(f, "invalid hash: computed {}, declared {}", computed, declared)
            }
            InvalidBlockReason::DifficultyNotMet => {
                write!(f, "hash does not carry the required leading zero bits")
            }
        }
    }
}

/// Check that `candidate` is a well-formed extension of `previous`: the
/// index advances by one, the hash linkage holds, the declared digest equals
/// a fresh recomputation, and the digest satisfies the block's own
/// difficulty. Payload semantics are never inspected and producer timestamps
/// are accepted as-is.
pub fn validate_successor(candidate: &Block, previous: &Block) -> Result<(), InvalidBlockReason> {
    if candidate.index != previous.index + 1 {
        return Err(InvalidBlockReason::IndexMismatch {
            expected: previous.index + 1,
            got: candidate.index,
        });
    }
    if candidate.previous_hash != previous.hash {
        return Err(InvalidBlockReason::PreviousHashMismatch);
    }
    let computed = candidate.hash_for_block();
    if computed != candidate.hash {
        return Err(InvalidBlockReason::HashMismatch {
            computed,
            declared: candidate.hash.clone(),
        });
    }
    if !hash_matches_difficulty(&candidate.hash, candidate.difficulty) {
        return Err(InvalidBlockReason::DifficultyNotMet);
    }
    Ok(())
}

/// A chain is valid when it is non-empty, starts with the exact genesis
/// constant, and every block validates against its predecessor. Stops at the
/// first failure.
pub fn is_valid_chain(chain: &[Block]) -> bool {
    let Some(first) = chain.first() else {
        warn!("empty chain is not valid");
        return false;
    };
    if *first != genesis_block() {
        warn!("chain rejected: first block differs from the genesis constant");
        return false;
    }
    chain
        .windows(2)
        .all(|pair| match validate_successor(&pair[1], &pair[0]) {
            Ok(()) => true,
            Err(reason) => {
                warn!("chain rejected at index {}: {}", pair[1].index, reason);
                false
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::calculate_hash;
    use crate::miner::find_block;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;

    fn next_block(previous: &Block, data: Value) -> Block {
        find_block(
            previous.index + 1,
            &previous.hash,
            previous.timestamp + 10,
            data,
            0,
            &AtomicBool::new(false),
        )
        .unwrap()
    }

    fn two_block_chain() -> Vec<Block> {
        let genesis = genesis_block();
        let next = next_block(&genesis, json!("first"));
        vec![genesis, next]
    }

    #[test]
    fn well_formed_chains_validate() {
        let mut chain = two_block_chain();
        chain.push(next_block(&chain[1], json!({ "payload": 2 })));
        assert!(is_valid_chain(&chain));
    }

    #[test]
    fn mutating_any_field_invalidates_the_chain() {
        let chain = two_block_chain();
        assert!(is_valid_chain(&chain));

        let mutations: Vec<Box<dyn Fn(&mut Block)>> = vec![
            Box::new(|b| b.index += 1),
            Box::new(|b| b.previous_hash = "00".to_string()),
            Box::new(|b| b.timestamp += 1),
            Box::new(|b| b.data = json!("tampered")),
            Box::new(|b| b.hash = "00".to_string()),
            Box::new(|b| b.difficulty += 1),
            Box::new(|b| b.nonce += 1),
        ];
        for mutate in mutations {
            let mut tampered = chain.clone();
            mutate(&mut tampered[1]);
            assert!(!is_valid_chain(&tampered));
        }
    }

    #[test]
    fn chains_with_a_foreign_genesis_are_rejected() {
        let mut chain = two_block_chain();
        chain[0].data = json!("Genesis block?");
        assert!(!is_valid_chain(&chain));
        assert!(!is_valid_chain(&[]));
    }

    #[test]
    fn successor_rejections_carry_the_specific_reason() {
        let genesis = genesis_block();
        let good = next_block(&genesis, json!("ok"));

        let mut wrong_index = good.clone();
        wrong_index.index = 5;
        assert!(matches!(
            validate_successor(&wrong_index, &genesis),
            Err(InvalidBlockReason::IndexMismatch { expected: 1, got: 5 })
        ));

        let mut wrong_link = good.clone();
        wrong_link.previous_hash = "beef".to_string();
        assert_eq!(
            validate_successor(&wrong_link, &genesis),
            Err(InvalidBlockReason::PreviousHashMismatch)
        );

        let mut tampered = good.clone();
        tampered.data = json!("changed after hashing");
        assert!(matches!(
            validate_successor(&tampered, &genesis),
            Err(InvalidBlockReason::HashMismatch { .. })
        ));

        // Correctly hashed but claiming a difficulty the digest cannot meet.
        let mut overstated = good.clone();
        overstated.difficulty = 200;
        overstated.hash = calculate_hash(
            overstated.index,
            &overstated.previous_hash,
            overstated.timestamp,
            &overstated.data,
            overstated.difficulty,
            overstated.nonce,
        );
        assert_eq!(
            validate_successor(&overstated, &genesis),
            Err(InvalidBlockReason::DifficultyNotMet)
        );

        assert_eq!(validate_successor(&good, &genesis), Ok(()));
    }
}
