//! Open-contract bookkeeping and per-block maintenance.
//!
//! Maintenance runs once per integrated block, after the block's
//! transactions: challenge windows roll over, missed proofs are charged,
//! and finished contracts terminate. Missed-proof handling must precede
//! termination handling for the same contract in the same pass, because a
//! missed proof can drain the funds or exhaust the tolerance that the
//! termination check looks at.

use crate::constants::{SPECIFIER_STORAGE_PROOF, SPECIFIER_TERMINATION};
use crate::encoding::hash_object;
use crate::state::TipState;
use crate::tree::{MissedStorageProof, UndoLog};
use crate::types::{ContractId, Currency, FileContract, Height, Output, OutputId};
use serde::{Deserialize, Serialize};

/// A file contract currently held open by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenContract {
    pub contract: FileContract,
    pub id: ContractId,
    pub revision_number: u64,
    pub funds_remaining: Currency,
    pub failures: u64,
    pub window_satisfied: bool,
}

impl OpenContract {
    /// Open a newly created contract. The first challenge window starts
    /// unsatisfied, so an unproven first window counts as a miss.
    pub fn new(contract: FileContract, id: ContractId) -> OpenContract {
        let funds_remaining = contract.fund.clone();
        OpenContract {
            contract,
            id,
            revision_number: 0,
            funds_remaining,
            failures: 0,
            window_satisfied: false,
        }
    }

    /// Whether the contract has burned through its failure tolerance.
    pub fn failed(&self) -> bool {
        self.failures == self.contract.tolerance
    }
}

/// Deterministic id of the output paying out one challenge window of
/// `contract_id` at `height`; `proof_valid` separates proven windows from
/// missed ones.
pub fn storage_proof_output_id(
    contract_id: &ContractId,
    height: Height,
    proof_valid: bool,
) -> OutputId {
    OutputId(hash_object(&(
        SPECIFIER_STORAGE_PROOF,
        contract_id,
        height,
        proof_valid,
    )))
}

/// Deterministic id of the output refunding a terminated contract;
/// `status` is true when the contract failed (failures reached tolerance).
pub fn contract_termination_output_id(contract_id: &ContractId, status: bool) -> OutputId {
    OutputId(hash_object(&(SPECIFIER_TERMINATION, contract_id, status)))
}

/// Run contract maintenance for a freshly integrated block at `height`,
/// recording everything it does into the block's undo log.
///
/// 1. A contract's challenge window rolls over when
///    `(height - start) % challenge_frequency == 0` and `height > start`.
///    At a rollover an unsatisfied window pays
///    `min(missed_proof_payout, funds_remaining)` to the missed-proof
///    address, debits the contract and counts a failure; a satisfied
///    window is recorded as a reset. Either way the flag clears.
/// 2. A contract terminates when its funds are gone, its end height is
///    reached, or its failures hit the tolerance. Residual funds are
///    refunded to the valid- or missed-proof address depending on status.
///
/// Terminated contracts are gathered into a side list and deleted after
/// the loop; deleting from the map mid-iteration is not an option.
pub fn apply_contract_maintenance(tip: &mut TipState, height: Height, undo: &mut UndoLog) {
    let TipState {
        unspent_outputs,
        open_contracts,
        ..
    } = tip;

    let mut terminated: Vec<ContractId> = Vec::new();
    for open in open_contracts.values_mut() {
        let start = open.contract.start;
        if height > start && (height - start) % open.contract.challenge_frequency == 0 {
            if !open.window_satisfied {
                let payout = open
                    .contract
                    .missed_proof_payout
                    .clone()
                    .min(open.funds_remaining.clone());
                let output_id = storage_proof_output_id(&open.id, height, false);
                unspent_outputs.insert(
                    output_id,
                    Output {
                        value: payout.clone(),
                        spend_hash: open.contract.missed_proof_address,
                    },
                );
                undo.missed_storage_proofs.push(MissedStorageProof {
                    output_id,
                    contract_id: open.id,
                });
                open.funds_remaining -= &payout;
                open.failures += 1;
            } else {
                undo.window_resets.push(open.id);
            }
            open.window_satisfied = false;
        }

        if open.funds_remaining.is_zero() || open.contract.end == height || open.failed() {
            if !open.funds_remaining.is_zero() {
                let status = open.failed();
                let spend_hash = if status {
                    open.contract.missed_proof_address
                } else {
                    open.contract.valid_proof_address
                };
                unspent_outputs.insert(
                    contract_termination_output_id(&open.id, status),
                    Output {
                        value: open.funds_remaining.clone(),
                        spend_hash,
                    },
                );
            }
            undo.contract_terminations.push(open.clone());
            terminated.push(open.id);
        }
    }

    for id in terminated {
        open_contracts.remove(&id);
    }
}

/// Reverse one block's contract maintenance from its undo log.
///
/// Terminations are reopened first so that missed-proof and window-reset
/// reversals find their contracts; the snapshots already carry the
/// post-rollover failure counts that the later steps unwind.
pub fn reverse_contract_maintenance(tip: &mut TipState, undo: &UndoLog) {
    for open in &undo.contract_terminations {
        tip.open_contracts.insert(open.id, open.clone());
        tip.unspent_outputs
            .remove(&contract_termination_output_id(&open.id, open.failed()));
    }

    for missed in &undo.missed_storage_proofs {
        let value = tip
            .unspent_outputs
            .remove(&missed.output_id)
            .expect("missed-proof outputs persist until their block rewinds")
            .value;
        let open = tip
            .open_contracts
            .get_mut(&missed.contract_id)
            .expect("contracts with missed proofs persist or were reopened above");
        open.funds_remaining += &value;
        open.failures -= 1;
    }

    for contract_id in &undo.window_resets {
        let open = tip
            .open_contracts
            .get_mut(contract_id)
            .expect("contracts with window resets persist or were reopened above");
        open.window_satisfied = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, BlockId};
    use std::collections::HashMap;

    fn empty_tip() -> TipState {
        TipState {
            current_tip: BlockId([0; 32]),
            current_path: HashMap::new(),
            unspent_outputs: HashMap::new(),
            open_contracts: HashMap::new(),
        }
    }

    fn open_contract(fund: u64) -> OpenContract {
        OpenContract::new(
            FileContract {
                file_merkle_root: [0; 32],
                file_size: 4096,
                start: 10,
                end: 100,
                fund: Currency::from(fund),
                challenge_frequency: 5,
                tolerance: 2,
                valid_proof_payout: Currency::from(50),
                valid_proof_address: Address([2; 32]),
                missed_proof_payout: Currency::from(50),
                missed_proof_address: Address([3; 32]),
            },
            ContractId([9; 32]),
        )
    }

    #[test]
    fn test_no_rollover_before_start() {
        let mut tip = empty_tip();
        let open = open_contract(100);
        tip.open_contracts.insert(open.id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 10, &mut undo);

        // Height equals start: no window has elapsed yet.
        assert!(undo.missed_storage_proofs.is_empty());
        assert_eq!(tip.open_contracts[&ContractId([9; 32])].failures, 0);
    }

    #[test]
    fn test_no_rollover_between_windows() {
        let mut tip = empty_tip();
        let open = open_contract(100);
        tip.open_contracts.insert(open.id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 13, &mut undo);

        assert!(undo.missed_storage_proofs.is_empty());
        assert!(tip.unspent_outputs.is_empty());
    }

    #[test]
    fn test_missed_proof_at_window_rollover() {
        let mut tip = empty_tip();
        let open = open_contract(100);
        let id = open.id;
        tip.open_contracts.insert(id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 15, &mut undo);

        let open = &tip.open_contracts[&id];
        assert_eq!(open.failures, 1);
        assert_eq!(open.funds_remaining, Currency::from(50));

        let output = &tip.unspent_outputs[&storage_proof_output_id(&id, 15, false)];
        assert_eq!(output.value, Currency::from(50));
        assert_eq!(output.spend_hash, Address([3; 32]));

        assert_eq!(undo.missed_storage_proofs.len(), 1);
        assert_eq!(undo.missed_storage_proofs[0].contract_id, id);
    }

    #[test]
    fn test_satisfied_window_resets_and_records() {
        let mut tip = empty_tip();
        let mut open = open_contract(100);
        open.window_satisfied = true;
        let id = open.id;
        tip.open_contracts.insert(id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 15, &mut undo);

        let open = &tip.open_contracts[&id];
        assert_eq!(open.failures, 0);
        assert!(!open.window_satisfied);
        assert!(undo.missed_storage_proofs.is_empty());
        assert_eq!(undo.window_resets, vec![id]);
    }

    #[test]
    fn test_termination_on_tolerance() {
        let mut tip = empty_tip();
        let mut open = open_contract(150);
        open.failures = 1;
        open.funds_remaining = Currency::from(100);
        let id = open.id;
        tip.open_contracts.insert(id, open);

        // The second miss reaches the tolerance of 2; the remaining funds
        // refund to the missed-proof address.
        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 15, &mut undo);

        assert!(!tip.open_contracts.contains_key(&id));
        let refund = &tip.unspent_outputs[&contract_termination_output_id(&id, true)];
        assert_eq!(refund.value, Currency::from(50));
        assert_eq!(refund.spend_hash, Address([3; 32]));
        assert_eq!(undo.contract_terminations.len(), 1);
        assert_eq!(undo.contract_terminations[0].failures, 2);
    }

    #[test]
    fn test_termination_at_end_height() {
        let mut tip = empty_tip();
        let mut open = open_contract(100);
        open.contract.end = 13;
        open.window_satisfied = true;
        let id = open.id;
        tip.open_contracts.insert(id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 13, &mut undo);

        assert!(!tip.open_contracts.contains_key(&id));
        let refund = &tip.unspent_outputs[&contract_termination_output_id(&id, false)];
        assert_eq!(refund.value, Currency::from(100));
        assert_eq!(refund.spend_hash, Address([2; 32]));
    }

    #[test]
    fn test_termination_with_no_funds_creates_no_output() {
        let mut tip = empty_tip();
        let mut open = open_contract(100);
        open.funds_remaining = Currency::zero();
        let id = open.id;
        tip.open_contracts.insert(id, open);

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 13, &mut undo);

        assert!(!tip.open_contracts.contains_key(&id));
        assert!(tip.unspent_outputs.is_empty());
        assert_eq!(undo.contract_terminations.len(), 1);
    }

    #[test]
    fn test_maintenance_round_trip() {
        let mut tip = empty_tip();
        let open = open_contract(100);
        tip.open_contracts.insert(open.id, open);
        let before = tip.clone();

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 15, &mut undo);
        assert_ne!(tip, before);

        reverse_contract_maintenance(&mut tip, &undo);
        assert_eq!(tip, before);
    }

    #[test]
    fn test_miss_and_terminate_round_trip() {
        // A single maintenance pass both charges a miss and terminates the
        // contract; reversal must unwind both in the right order.
        let mut tip = empty_tip();
        let mut open = open_contract(150);
        open.failures = 1;
        open.funds_remaining = Currency::from(100);
        tip.open_contracts.insert(open.id, open);
        let before = tip.clone();

        let mut undo = UndoLog::default();
        apply_contract_maintenance(&mut tip, 15, &mut undo);
        assert!(tip.open_contracts.is_empty());

        reverse_contract_maintenance(&mut tip, &undo);
        assert_eq!(tip, before);
    }
}
