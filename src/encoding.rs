//! Deterministic serialization and hashing.
//!
//! Every hash in the chain is computed over the bincode encoding of the
//! value, so the encoding must stay stable; the codec uses fixed-width
//! little-endian integers and length-prefixed sequences throughout.

use crate::types::{Hash, Transaction};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Encode a value into its canonical byte representation.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("in-memory consensus values always serialize")
}

/// SHA-256 of a byte string.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 of the canonical encoding of a value.
pub fn hash_object<T: Serialize>(value: &T) -> Hash {
    hash_bytes(&encode(value))
}

/// Merkle root over the hashes of the given transactions, in order.
///
/// Levels are built bottom-up; an odd leaf is paired with itself. The root
/// of an empty list is the zero hash.
pub fn transaction_merkle_root(transactions: &[Transaction]) -> Hash {
    let mut level: Vec<Hash> = transactions.iter().map(hash_object).collect();
    if level.is_empty() {
        return [0u8; 32];
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut joined = [0u8; 64];
            joined[..32].copy_from_slice(&left);
            joined[32..].copy_from_slice(&right);
            next.push(hash_bytes(&joined));
        }
        level = next;
    }
    level[0]
}
