//! Block-level validation, integration and rewind.
//!
//! Integration is the only writer of the tip view and of a node's undo
//! log; rewind is its exact inverse, keyed off that log alone.

use crate::constants::{COIN_INFLATION, FUTURE_THRESHOLD};
use crate::contracts::{apply_contract_maintenance, reverse_contract_maintenance};
use crate::error::{ConsensusError, Result};
use crate::state::State;
use crate::transaction::{
    apply_transaction, reverse_transaction, validate_transaction, TransactionUndo,
};
use crate::tree::{BlockNode, UndoLog};
use crate::types::{Block, BlockId, Currency, Output, Timestamp};
use tracing::debug;

/// ValidateHeader: ℋ × 𝒩 → {ok, err}
///
/// Checks a block header against its parent node, in order:
/// 1. The timestamp is not further than FUTURE_THRESHOLD past `now`
///    (retryable; the block may become valid as the clock advances)
/// 2. The timestamp is later than the median of the parent's ring of
///    recent timestamps
/// 3. The declared merkle root matches the block's transactions
/// 4. The block id meets the parent's target
///
/// All other header fields are structural and assumed well-formed by the
/// codec layer. The caller decides which failures mark the block bad, via
/// [`ConsensusError::marks_block_bad`].
pub fn validate_header(now: Timestamp, parent: &BlockNode, block: &Block) -> Result<()> {
    if block.timestamp - now > FUTURE_THRESHOLD {
        return Err(ConsensusError::TimestampTooFarFuture);
    }

    if block.timestamp <= parent.median_timestamp() {
        return Err(ConsensusError::TimestampTooEarly);
    }

    if block.merkle_root != block.expected_transaction_merkle_root() {
        return Err(ConsensusError::MerkleMismatch);
    }

    if !parent.target.met_by(&block.id()) {
        return Err(ConsensusError::TargetNotMet);
    }

    Ok(())
}

/// IntegrateBlock: ℬ × 𝒮 → 𝒮
///
/// Applies an attached block as the new tip:
/// 1. Validate and apply each transaction in order; on the first failure,
///    reverse the already-applied ones in reverse order and fail
/// 2. Run contract maintenance at the new height
/// 3. Pay the miner: Σ(fees) + COIN_INFLATION at the block's subsidy id
/// 4. Advance the tip and the current path
///
/// The undo log lands on the integrated node itself, so the block can be
/// rewound without ambient state.
pub fn integrate_block(state: &mut State, block_id: &BlockId) -> Result<()> {
    let node = state
        .tree
        .lookup(block_id)
        .expect("integrated blocks were attached to the tree");
    let block = node.block.clone();
    let height = node.height;

    let mut undo = UndoLog::default();
    let mut miner_subsidy = Currency::zero();
    for (index, tx) in block.transactions.iter().enumerate() {
        if let Err(err) = validate_transaction(&state.tip, height, tx) {
            // Unwind the transactions applied so far, newest first.
            for reverse_index in (0..index).rev() {
                let tx_undo = undo
                    .transaction_undos
                    .pop()
                    .expect("one undo was recorded per applied transaction");
                reverse_transaction(&mut state.tip, &block.transactions[reverse_index], tx_undo);
            }
            return Err(ConsensusError::InvalidTransaction(err));
        }
        undo.transaction_undos
            .push(apply_transaction(&mut state.tip, height, tx));
        for fee in &tx.miner_fees {
            miner_subsidy += fee;
        }
    }

    apply_contract_maintenance(&mut state.tip, height, &mut undo);

    miner_subsidy += &Currency::from(COIN_INFLATION);
    state.tip.unspent_outputs.insert(
        block.subsidy_id(),
        Output {
            value: miner_subsidy,
            spend_hash: block.miner_address,
        },
    );

    state.tip.current_tip = *block_id;
    state.tip.current_path.insert(height, *block_id);
    state
        .tree
        .lookup_mut(block_id)
        .expect("integrated blocks were attached to the tree")
        .undo = undo;

    debug!(height, block = %block_id, "integrated block");
    Ok(())
}

/// Remove the current tip block from the tip view, as though it had never
/// been integrated. Steps run in the exact inverse order of
/// [`integrate_block`].
pub fn rewind_block(state: &mut State) {
    let tip_id = state.tip.current_tip;
    let node = state
        .tree
        .lookup_mut(&tip_id)
        .expect("the current tip is always in the tree");
    let mut undo = std::mem::take(&mut node.undo);
    let block = node.block.clone();
    let height = node.height;

    state.tip.unspent_outputs.remove(&block.subsidy_id());

    reverse_contract_maintenance(&mut state.tip, &undo);

    for index in (0..block.transactions.len()).rev() {
        let tx_undo: TransactionUndo = undo
            .transaction_undos
            .pop()
            .expect("one undo was recorded per applied transaction");
        reverse_transaction(&mut state.tip, &block.transactions[index], tx_undo);
    }

    state.tip.current_path.remove(&height);
    state.tip.current_tip = block.parent_id;

    debug!(height, block = %tip_id, "rewound block");
}
