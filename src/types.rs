//! Core types for the Strata consensus engine

use crate::constants::*;
use crate::encoding::{hash_object, transaction_merkle_root};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, SubAssign};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Specifier: 16-byte tag identifying the kind of an encoded object
pub type Specifier = [u8; 16];

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Block height
pub type Height = u64;

macro_rules! hash_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub Hash);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

hash_id! {
    /// Identifier of a block: the hash of its header fields
    BlockId
}
hash_id! {
    /// Identifier of a transaction: the hash of the encoded transaction
    TransactionId
}
hash_id! {
    /// Identifier of an unspent output, derived deterministically from its creator
    OutputId
}
hash_id! {
    /// Identifier of a file contract, derived from the creating transaction
    ContractId
}
hash_id! {
    /// Spend-hash of an output and payout address of a miner or host
    Address
}

/// Upper bound that a block id must stay below to prove work.
///
/// Interpreted as a 32-byte big-endian numerator over 2^256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target(pub [u8; 32]);

impl Target {
    /// Returns true if the block id proves enough work for this target.
    pub fn met_by(&self, id: &BlockId) -> bool {
        self.0 >= id.0
    }

    /// Interpret the 32 big-endian bytes as an unsigned integer.
    pub fn to_int(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Re-encode an integer as 32 big-endian bytes, zero-padded on the left.
    /// Values beyond 2^256 - 1 saturate at the maximum representable target.
    pub fn from_int(value: &BigUint) -> Target {
        Target(int_to_bytes(value))
    }
}

/// Encoded cumulative work: the inverse of summed inverse targets.
///
/// The encoding inverts the intuitive ordering, so a *smaller* byte value
/// means a *heavier* chain. Always compare through [`Depth::heavier_than`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth(pub [u8; 32]);

impl Depth {
    /// Returns true if this depth encodes strictly more cumulative work.
    pub fn heavier_than(&self, other: &Depth) -> bool {
        self.0 < other.0
    }

    /// Interpret the 32 big-endian bytes as an unsigned integer.
    pub fn to_int(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Re-encode an integer as 32 big-endian bytes, zero-padded on the left.
    pub fn from_int(value: &BigUint) -> Depth {
        Depth(int_to_bytes(value))
    }
}

fn int_to_bytes(value: &BigUint) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return [0xff; 32];
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Currency: an arbitrary-precision non-negative integer.
///
/// Subtraction panics on underflow, matching primitive integer arithmetic;
/// use [`Currency::checked_sub`] when the balance is not already proven.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(BigUint);

impl Currency {
    /// The zero value.
    pub fn zero() -> Currency {
        Currency(BigUint::default())
    }

    /// Returns true if the value is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Subtraction that returns `None` instead of underflowing.
    pub fn checked_sub(&self, rhs: &Currency) -> Option<Currency> {
        if self.0 >= rhs.0 {
            Some(Currency(&self.0 - &rhs.0))
        } else {
            None
        }
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Currency {
        Currency(BigUint::from(value))
    }
}

impl Add<&Currency> for Currency {
    type Output = Currency;

    fn add(self, rhs: &Currency) -> Currency {
        Currency(self.0 + &rhs.0)
    }
}

impl AddAssign<&Currency> for Currency {
    fn add_assign(&mut self, rhs: &Currency) {
        self.0 += &rhs.0;
    }
}

impl SubAssign<&Currency> for Currency {
    fn sub_assign(&mut self, rhs: &Currency) {
        self.0 -= &rhs.0;
    }
}

impl<'a> Sum<&'a Currency> for Currency {
    fn sum<I: Iterator<Item = &'a Currency>>(iter: I) -> Currency {
        let mut total = Currency::zero();
        for value in iter {
            total += value;
        }
        total
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An unspent output: a value locked to a spend-hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Currency,
    pub spend_hash: Address,
}

/// A transaction input, naming the output it consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub output_id: OutputId,
}

/// Terms of a storage agreement between a renter and a host.
///
/// A contract holds `fund` coins in escrow from `start` to `end`. The host
/// must post a storage proof once per challenge window of
/// `challenge_frequency` blocks; each proven window pays
/// `valid_proof_payout` to `valid_proof_address`, each missed window pays
/// `missed_proof_payout` to `missed_proof_address` and counts as a failure.
/// `tolerance` failures terminate the contract as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContract {
    pub file_merkle_root: Hash,
    pub file_size: u64,
    pub start: Height,
    pub end: Height,
    pub fund: Currency,
    pub challenge_frequency: Height,
    pub tolerance: u64,
    pub valid_proof_payout: Currency,
    pub valid_proof_address: Address,
    pub missed_proof_payout: Currency,
    pub missed_proof_address: Address,
}

/// Proof that a host is still storing contract data for the current window.
///
/// The merkle path itself is checked by the storage collaborator; the
/// consensus core validates the referenced contract and window state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub contract_id: ContractId,
    pub segment: Vec<u8>,
    pub hash_set: Vec<Hash>,
}

/// Replacement terms for an open contract, ordered by revision number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRevision {
    pub contract_id: ContractId,
    pub revision_number: u64,
    pub new_terms: FileContract,
}

/// Transaction: Σ(inputs) = Σ(outputs) + Σ(miner fees) + Σ(new-contract funds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub new_contracts: Vec<FileContract>,
    pub storage_proofs: Vec<StorageProof>,
    pub contract_revisions: Vec<ContractRevision>,
    pub miner_fees: Vec<Currency>,
    /// Opaque payloads; host announcements travel here.
    pub arbitrary_data: Vec<Vec<u8>>,
    /// Opaque signatures; verification belongs to the crypto collaborator.
    pub signatures: Vec<Vec<u8>>,
}

impl Transaction {
    /// Hash of the encoded transaction.
    pub fn id(&self) -> TransactionId {
        TransactionId(hash_object(self))
    }

    /// Deterministic id of the output at `index` created by transaction `id`.
    pub fn output_id(id: &TransactionId, index: u64) -> OutputId {
        OutputId(hash_object(&(SPECIFIER_COIN_OUTPUT, id, index)))
    }

    /// Deterministic id of the file contract at `index` created by
    /// transaction `id`.
    pub fn contract_id(id: &TransactionId, index: u64) -> ContractId {
        ContractId(hash_object(&(SPECIFIER_FILE_CONTRACT, id, index)))
    }
}

/// Block: parent link, header metadata, and an ordered transaction list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub parent_id: BlockId,
    pub timestamp: Timestamp,
    pub nonce: u64,
    pub miner_address: Address,
    pub merkle_root: Hash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// A block with no parent and no transactions, rooting a new chain.
    pub fn genesis(timestamp: Timestamp, miner_address: Address) -> Block {
        Block {
            parent_id: BlockId([0; 32]),
            timestamp,
            nonce: 0,
            miner_address,
            merkle_root: transaction_merkle_root(&[]),
            transactions: Vec::new(),
        }
    }

    /// Hash of the header fields. The merkle root commits to the
    /// transactions, so the id covers the whole block.
    pub fn id(&self) -> BlockId {
        BlockId(hash_object(&(
            self.parent_id,
            self.timestamp,
            self.nonce,
            self.miner_address,
            self.merkle_root,
        )))
    }

    /// Deterministic id of the miner-payout output created when this block
    /// is integrated.
    pub fn subsidy_id(&self) -> OutputId {
        OutputId(hash_object(&(SPECIFIER_MINER_PAYOUT, self.id())))
    }

    /// The merkle root the header must declare: the root over the hashes of
    /// the block's transactions, in order.
    pub fn expected_transaction_merkle_root(&self) -> Hash {
        transaction_merkle_root(&self.transactions)
    }
}
