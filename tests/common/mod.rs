//! Shared helpers for the integration tests: a deterministic genesis and a
//! tiny in-process miner.

#![allow(dead_code)]

use strata_consensus::*;

pub const GENESIS_TIMESTAMP: Timestamp = 1_700_000_000;

/// A wall clock far enough ahead of every test timestamp.
pub const NOW: Timestamp = GENESIS_TIMESTAMP + 10_000_000;

pub fn genesis() -> Block {
    Block::genesis(GENESIS_TIMESTAMP, Address([0; 32]))
}

/// Assemble and mine a block on `parent`, searching nonces until the
/// parent's target is met.
pub fn mine(
    state: &State,
    parent: &BlockId,
    timestamp: Timestamp,
    miner: Address,
    transactions: Vec<Transaction>,
) -> Block {
    let target = state.target_of(parent).expect("parent must be known");
    let mut block = Block {
        parent_id: *parent,
        timestamp,
        nonce: 0,
        miner_address: miner,
        merkle_root: transaction_merkle_root(&transactions),
        transactions,
    };
    while !target.met_by(&block.id()) {
        block.nonce += 1;
    }
    block
}

/// Mine and accept an empty block extending the current tip.
pub fn extend_tip(state: &mut State, miner: Address) -> Block {
    let parent = state.current_tip();
    let timestamp = state
        .block_at_height(state.height())
        .expect("tip block is on the path")
        .timestamp
        + 600;
    let block = mine(state, &parent, timestamp, miner, vec![]);
    state
        .accept_block(block.clone(), NOW)
        .expect("empty extension blocks are valid");
    block
}

pub fn bare_transaction() -> Transaction {
    Transaction {
        inputs: vec![],
        outputs: vec![],
        new_contracts: vec![],
        storage_proofs: vec![],
        contract_revisions: vec![],
        miner_fees: vec![],
        arbitrary_data: vec![],
        signatures: vec![],
    }
}

/// A transaction that burns an entire input into miner fees.
pub fn fee_transaction(input: OutputId, value: u64) -> Transaction {
    let mut tx = bare_transaction();
    tx.inputs.push(Input { output_id: input });
    tx.miner_fees.push(Currency::from(value));
    tx
}

/// A transaction that funds a file contract from `input`, returning the
/// change as an output to the renter. `fund` must match the contract's
/// fund amount.
pub fn contract_transaction(
    input: OutputId,
    input_value: u64,
    fund: u64,
    contract: FileContract,
) -> Transaction {
    assert_eq!(contract.fund, Currency::from(fund));
    let mut tx = bare_transaction();
    tx.inputs.push(Input { output_id: input });
    tx.outputs.push(Output {
        value: Currency::from(input_value - fund),
        spend_hash: Address([0xcc; 32]),
    });
    tx.new_contracts.push(contract);
    tx
}

pub fn test_contract(start: Height, end: Height, fund: u64) -> FileContract {
    FileContract {
        file_merkle_root: [0; 32],
        file_size: 4096,
        start,
        end,
        fund: Currency::from(fund),
        challenge_frequency: 2,
        tolerance: 2,
        valid_proof_payout: Currency::from(50),
        valid_proof_address: Address([0xaa; 32]),
        missed_proof_payout: Currency::from(50),
        missed_proof_address: Address([0xbb; 32]),
    }
}

/// Total value held by the ledger: unspent outputs plus contract escrow.
pub fn ledger_total(state: &State) -> Currency {
    let mut total: Currency = state.unspent_outputs().values().map(|o| &o.value).sum();
    let escrow: Currency = state
        .open_contracts()
        .values()
        .map(|c| &c.funds_remaining)
        .sum();
    total += &escrow;
    total
}
