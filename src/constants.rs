//! Strata chain constants

use crate::types::{Specifier, Timestamp};

/// Target seconds between blocks: 10 minutes
pub const BLOCK_FREQUENCY: Timestamp = 600;

/// Number of blocks spanned by a difficulty adjustment
pub const TARGET_WINDOW: u64 = 5000;

/// Maximum tolerated clock skew for incoming blocks: 3 hours
pub const FUTURE_THRESHOLD: Timestamp = 3 * 60 * 60;

/// Per-block ceiling on target growth (numerator)
pub const MAX_ADJUSTMENT_UP_NUM: i64 = 10_001;

/// Per-block ceiling on target growth (denominator)
pub const MAX_ADJUSTMENT_UP_DENOM: i64 = 10_000;

/// Per-block floor on target shrinkage (numerator)
pub const MAX_ADJUSTMENT_DOWN_NUM: i64 = 9_999;

/// Per-block floor on target shrinkage (denominator)
pub const MAX_ADJUSTMENT_DOWN_DENOM: i64 = 10_000;

/// Excess weight a fork needs to displace the current tip: 5% (numerator)
pub const SURPASS_THRESHOLD_NUM: u64 = 5;

/// Excess weight a fork needs to displace the current tip: 5% (denominator)
pub const SURPASS_THRESHOLD_DENOM: u64 = 100;

/// Fixed coin inflation added to every miner subsidy
pub const COIN_INFLATION: u64 = 1000;

/// Size of the per-node ring of recent block timestamps
pub const RECENT_TIMESTAMP_COUNT: usize = 11;

/// Index of the median in the sorted timestamp ring
pub const MEDIAN_TIMESTAMP_INDEX: usize = 5;

/// Proof-of-work target assigned to the genesis root
pub const ROOT_TARGET: [u8; 32] = [
    0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Depth assigned to the genesis root: maximal bytes, zero accumulated work
pub const ROOT_DEPTH: [u8; 32] = [0xff; 32];

/// Single-byte kind tag for a broadcast block message
pub const BLOCK_MESSAGE_KIND: u8 = b'B';

/// Response string that signals acceptance during negotiation; any other
/// string is a rejection describing the reason
pub const ACCEPT_RESPONSE: &str = "accept";

/// Maximum number of bytes in a negotiation rejection body
pub const MAX_ERROR_SIZE: usize = 256;

/// Prefix marking a transaction's arbitrary data as a host announcement
pub const PREFIX_HOST_ANNOUNCEMENT: Specifier = *b"HostAnnounce2\0\0\0";

/// Key-algorithm specifier for Ed25519, the only accepted signature scheme
pub const SIGNATURE_ED25519: Specifier = *b"ed25519\0\0\0\0\0\0\0\0\0";

/// Specifier for miner-payout output ids
pub const SPECIFIER_MINER_PAYOUT: Specifier = *b"miner payout\0\0\0\0";

/// Specifier for transaction coin-output ids
pub const SPECIFIER_COIN_OUTPUT: Specifier = *b"coin output\0\0\0\0\0";

/// Specifier for file-contract ids
pub const SPECIFIER_FILE_CONTRACT: Specifier = *b"file contract\0\0\0";

/// Specifier for storage-proof output ids (valid and missed)
pub const SPECIFIER_STORAGE_PROOF: Specifier = *b"storage proof\0\0\0";

/// Specifier for contract-termination output ids
pub const SPECIFIER_TERMINATION: Specifier = *b"termination\0\0\0\0\0";
