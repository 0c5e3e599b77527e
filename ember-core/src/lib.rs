pub mod block;
pub mod chain;
pub mod difficulty;
pub mod hashing;
pub mod miner;
pub mod network;
pub mod validator;

/// Target seconds between blocks.
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;
/// Difficulty is re-evaluated every this many blocks.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024; // 10 MB
