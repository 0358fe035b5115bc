//! Error types for the consensus engine

use crate::types::{ContractId, Currency, OutputId};
use thiserror::Error;

/// Errors surfaced by block acceptance
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("block is known to be invalid")]
    KnownInvalid,

    #[error("block is already known")]
    AlreadyKnown,

    #[error("block is an orphan")]
    Orphan,

    #[error("block timestamp is too far in the future")]
    TimestampTooFarFuture,

    #[error("block timestamp is not later than the median of recent timestamps")]
    TimestampTooEarly,

    #[error("block merkle root does not match the block's transactions")]
    MerkleMismatch,

    #[error("block id does not meet the required target")]
    TargetNotMet,

    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error("fork integration failed: {0}")]
    ReorgIntegration(Box<ConsensusError>),
}

impl ConsensusError {
    /// Whether the rejected block must be remembered as permanently bad.
    /// Future-dated blocks and insufficient work are retryable; everything
    /// structural is not.
    pub fn marks_block_bad(&self) -> bool {
        matches!(
            self,
            ConsensusError::TimestampTooEarly
                | ConsensusError::MerkleMismatch
                | ConsensusError::InvalidTransaction(_)
        )
    }
}

/// Errors from validating a single transaction against the tip view
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("input {0} is not an unspent output")]
    UnknownInput(OutputId),

    #[error("output {0} is consumed more than once")]
    DoubleSpend(OutputId),

    #[error("inputs total {inputs} but outputs, fees and contract funds total {outflow}")]
    Imbalance { inputs: Currency, outflow: Currency },

    #[error("malformed file contract: {0}")]
    InvalidContract(String),

    #[error("storage proof references unknown contract {0}")]
    UnknownContract(ContractId),

    #[error("contract {0} already has a proof for the current window")]
    WindowAlreadySatisfied(ContractId),

    #[error("more than one storage proof for contract {0}")]
    DuplicateStorageProof(ContractId),

    #[error("revision of contract {0} does not increase the revision number")]
    StaleRevision(ContractId),
}

/// Errors from decoding or verifying a host announcement
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnnouncementError {
    #[error("announcement bytes are malformed: {0}")]
    Malformed(String),

    #[error("provided data does not form a recognized host announcement")]
    NotAnnouncement,

    #[error("the signature algorithm in the host announcement is not recognized")]
    UnrecognizedSignature,

    #[error("announcement signature is invalid: {0}")]
    InvalidSignature(String),
}

/// Errors from reading a negotiation response
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("negotiation response is malformed: {0}")]
    Malformed(String),

    #[error("negotiation response of {0} bytes exceeds the error-size bound")]
    ResponseTooLarge(usize),

    #[error("{0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
