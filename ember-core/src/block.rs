use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A single ledger entry, immutable once constructed. `hash` must equal a
/// fresh recomputation over the remaining fields for the block to be valid.
/// The serialized field names are the wire schema shared by all peers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    /// Opaque payload, never interpreted by the node.
    pub data: Value,
    pub hash: String,
    /// Required number of leading zero bits in `hash`'s binary expansion.
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// Recompute this block's digest from its own fields.
    pub fn hash_for_block(&self) -> String {
        calculate_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }
}

/// Canonical string rendering of a payload for hashing. JSON strings hash as
/// their raw contents so the fixed genesis digest stays stable across
/// implementations; everything else hashes as compact JSON.
fn canonical_data(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SHA-256 over the concatenated decimal/string renderings of the block
/// fields, as lowercase hex. This function is pinned: changing it invalidates
/// every existing chain.
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    data: &Value,
    difficulty: u32,
    nonce: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string());
    hasher.update(previous_hash);
    hasher.update(timestamp.to_string());
    hasher.update(canonical_data(data));
    hasher.update(difficulty.to_string());
    hasher.update(nonce.to_string());
    hex::encode(hasher.finalize())
}

pub const GENESIS_TIMESTAMP: i64 = 1535165503;

/// The fixed first block every valid chain must share byte for byte.
pub fn genesis_block() -> Block {
    Block {
        index: 0,
        previous_hash: String::new(),
        timestamp: GENESIS_TIMESTAMP,
        data: Value::String("Genesis block".to_string()),
        hash: "1c9c452672569e58c48b50ea4828ea00e4cc2df8c2431f705856b797b1bcb882".to_string(),
        difficulty: 0,
        nonce: 0,
    }
}
