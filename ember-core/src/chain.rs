use log::{debug, info, warn};

use crate::block::{genesis_block, Block};
use crate::difficulty::next_difficulty;
use crate::validator::{is_valid_chain, validate_successor, InvalidBlockReason};

/// Outcome of applying a received block sequence to the local chain. The
/// caller decides what gossip, if any, to emit in response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The local chain is at least as long; nothing changed.
    KeptLocal,
    /// The received head extended the local chain by one block.
    Appended,
    /// A single disconnected block arrived; the peer's full chain is needed.
    RequestFullChain,
    /// A longer valid chain replaced the local one.
    Replaced,
    /// The candidate was longer but failed validation.
    Rejected,
}

/// Single source of truth for the canonical chain on this node. The chain is
/// replaced wholesale or appended to at the tail, never mutated in place.
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    pub fn new() -> Self {
        let genesis = genesis_block();
        // The one fatal condition in the system: a corrupted genesis constant.
        assert_eq!(
            genesis.hash_for_block(),
            genesis.hash,
            "genesis constant corrupted"
        );
        Blockchain {
            blocks: vec![genesis],
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest_block(&self) -> &Block {
        self.blocks.last().expect("chain holds at least genesis")
    }

    /// Difficulty the next mined block must satisfy.
    pub fn next_difficulty(&self) -> u32 {
        next_difficulty(&self.blocks)
    }

    /// Append a candidate extending the current head. Rejections carry the
    /// specific reason for diagnostics.
    pub fn try_append(&mut self, block: Block) -> Result<(), InvalidBlockReason> {
        validate_successor(&block, self.latest_block())?;
        info!("block {} appended (hash {})", block.index, block.hash);
        self.blocks.push(block);
        Ok(())
    }

    /// Longest-valid-chain replacement: the candidate must validate from
    /// genesis and be strictly longer, or nothing changes. Equal-length
    /// candidates never substitute, and raw length rather than cumulative
    /// difficulty is the metric.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if is_valid_chain(&candidate) && candidate.len() > self.blocks.len() {
            info!(
                "replacing local chain of {} blocks with received chain of {}",
                self.blocks.len(),
                candidate.len()
            );
            self.blocks = candidate;
            true
        } else {
            warn!("received chain rejected: invalid or not longer than local");
            false
        }
    }

    /// Decide what to do with a received candidate block sequence.
    pub fn handle_chain_response(&mut self, mut received: Vec<Block>) -> SyncAction {
        received.sort_by_key(|b| b.index);
        let Some(received_head) = received.last() else {
            warn!("empty chain response ignored");
            return SyncAction::KeptLocal;
        };
        let (local_index, local_hash) = {
            let head = self.latest_block();
            (head.index, head.hash.clone())
        };

        if received_head.index <= local_index {
            debug!("received chain is not longer than local, doing nothing");
            return SyncAction::KeptLocal;
        }
        info!(
            "possibly behind: local head {}, peer head {}",
            local_index, received_head.index
        );

        if received_head.previous_hash == local_hash {
            let head = received.pop().expect("checked non-empty above");
            match self.try_append(head) {
                Ok(()) => SyncAction::Appended,
                Err(reason) => {
                    warn!("received head rejected: {}", reason);
                    SyncAction::Rejected
                }
            }
        } else if received.len() == 1 {
            info!("received a disconnected block, the full peer chain is needed");
            SyncAction::RequestFullChain
        } else if self.replace_chain(received) {
            SyncAction::Replaced
        } else {
            SyncAction::Rejected
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}
