//! Transaction validation, application and reversal.
//!
//! Validation is a pure check against the tip view; application mutates the
//! view and returns a [`TransactionUndo`] that makes the reversal exact.

use crate::error::TransactionError;
use crate::state::TipState;
use crate::types::{
    ContractId, Currency, FileContract, Height, Output, OutputId, Transaction,
};
use crate::contracts::{storage_proof_output_id, OpenContract};
use std::collections::HashSet;

/// Everything needed to reverse one transaction's application exactly
#[derive(Debug, Default)]
pub struct TransactionUndo {
    /// Outputs consumed by the transaction's inputs.
    pub spent_outputs: Vec<(OutputId, Output)>,
    /// Storage-proof payouts: contract debited, output created, amount.
    pub proof_credits: Vec<(ContractId, OutputId, Currency)>,
    /// Contract terms and revision numbers before a revision replaced them.
    pub prior_revisions: Vec<(ContractId, FileContract, u64)>,
}

/// CheckTransaction: 𝒯𝒳 × 𝒮 → {valid, invalid}
///
/// A transaction is valid against the tip view at `height` iff:
/// 1. Every input names a distinct unspent output
/// 2. Every new contract is well-formed and starts after `height`
/// 3. Every storage proof names a distinct open contract whose current
///    window is not already satisfied
/// 4. Every revision names an open contract and increases its revision
///    number
/// 5. Σ(inputs) = Σ(outputs) + Σ(miner fees) + Σ(new-contract funds)
///
/// Signature and merkle-proof verification belong to the crypto
/// collaborator and are not re-checked here.
pub fn validate_transaction(
    tip: &TipState,
    height: Height,
    tx: &Transaction,
) -> Result<(), TransactionError> {
    // 1. Inputs exist and are not spent twice within the transaction.
    let mut input_total = Currency::zero();
    let mut seen = HashSet::new();
    for input in &tx.inputs {
        if !seen.insert(input.output_id) {
            return Err(TransactionError::DoubleSpend(input.output_id));
        }
        let output = tip
            .unspent_outputs
            .get(&input.output_id)
            .ok_or(TransactionError::UnknownInput(input.output_id))?;
        input_total += &output.value;
    }

    // 2. New contracts are well-formed.
    for contract in &tx.new_contracts {
        validate_contract_terms(contract)?;
        if contract.start <= height {
            return Err(TransactionError::InvalidContract(format!(
                "contract starts at height {} but the chain is at {}",
                contract.start, height
            )));
        }
    }

    // 3. Storage proofs reference distinct, unsatisfied contracts.
    let mut proven = HashSet::new();
    for proof in &tx.storage_proofs {
        if !proven.insert(proof.contract_id) {
            return Err(TransactionError::DuplicateStorageProof(proof.contract_id));
        }
        let open = tip
            .open_contracts
            .get(&proof.contract_id)
            .ok_or(TransactionError::UnknownContract(proof.contract_id))?;
        if open.window_satisfied {
            return Err(TransactionError::WindowAlreadySatisfied(proof.contract_id));
        }
    }

    // 4. Revisions are monotone.
    for revision in &tx.contract_revisions {
        let open = tip
            .open_contracts
            .get(&revision.contract_id)
            .ok_or(TransactionError::UnknownContract(revision.contract_id))?;
        if revision.revision_number <= open.revision_number {
            return Err(TransactionError::StaleRevision(revision.contract_id));
        }
        validate_contract_terms(&revision.new_terms)?;
    }

    // 5. Conservation.
    let mut outflow: Currency = tx.outputs.iter().map(|o| &o.value).sum();
    let fees: Currency = tx.miner_fees.iter().sum();
    let funds: Currency = tx.new_contracts.iter().map(|c| &c.fund).sum();
    outflow += &fees;
    outflow += &funds;
    if input_total != outflow {
        return Err(TransactionError::Imbalance {
            inputs: input_total,
            outflow,
        });
    }

    Ok(())
}

fn validate_contract_terms(contract: &FileContract) -> Result<(), TransactionError> {
    if contract.challenge_frequency == 0 {
        return Err(TransactionError::InvalidContract(
            "challenge frequency must be nonzero".to_string(),
        ));
    }
    if contract.end <= contract.start {
        return Err(TransactionError::InvalidContract(format!(
            "contract ends at height {} but starts at {}",
            contract.end, contract.start
        )));
    }
    Ok(())
}

/// Apply a validated transaction to the tip view at `height`, returning the
/// undo record for exact reversal.
pub fn apply_transaction(tip: &mut TipState, height: Height, tx: &Transaction) -> TransactionUndo {
    let tx_id = tx.id();
    let mut undo = TransactionUndo::default();

    // Consume inputs.
    for input in &tx.inputs {
        let output = tip
            .unspent_outputs
            .remove(&input.output_id)
            .expect("inputs were validated against the ledger");
        undo.spent_outputs.push((input.output_id, output));
    }

    // Create outputs.
    for (index, output) in tx.outputs.iter().enumerate() {
        let id = Transaction::output_id(&tx_id, index as u64);
        tip.unspent_outputs.insert(id, output.clone());
    }

    // Open new contracts.
    for (index, contract) in tx.new_contracts.iter().enumerate() {
        let id = Transaction::contract_id(&tx_id, index as u64);
        tip.open_contracts
            .insert(id, OpenContract::new(contract.clone(), id));
    }

    // Record contract revisions.
    for revision in &tx.contract_revisions {
        let open = tip
            .open_contracts
            .get_mut(&revision.contract_id)
            .expect("revisions were validated against the ledger");
        undo.prior_revisions.push((
            revision.contract_id,
            open.contract.clone(),
            open.revision_number,
        ));
        open.contract = revision.new_terms.clone();
        open.revision_number = revision.revision_number;
    }

    // Credit storage-proof outputs.
    for proof in &tx.storage_proofs {
        let open = tip
            .open_contracts
            .get_mut(&proof.contract_id)
            .expect("proofs were validated against the ledger");
        let payout = open
            .contract
            .valid_proof_payout
            .clone()
            .min(open.funds_remaining.clone());
        let output_id = storage_proof_output_id(&proof.contract_id, height, true);
        tip.unspent_outputs.insert(
            output_id,
            Output {
                value: payout.clone(),
                spend_hash: open.contract.valid_proof_address,
            },
        );
        open.funds_remaining -= &payout;
        open.window_satisfied = true;
        undo.proof_credits
            .push((proof.contract_id, output_id, payout));
    }

    undo
}

/// Reverse an applied transaction, consuming its undo record. The steps
/// run in the exact inverse order of [`apply_transaction`].
pub fn reverse_transaction(tip: &mut TipState, tx: &Transaction, undo: TransactionUndo) {
    let tx_id = tx.id();

    // Un-credit storage proofs.
    for (contract_id, output_id, payout) in undo.proof_credits.into_iter().rev() {
        tip.unspent_outputs.remove(&output_id);
        let open = tip
            .open_contracts
            .get_mut(&contract_id)
            .expect("a proven contract is reopened before its proofs reverse");
        open.funds_remaining += &payout;
        open.window_satisfied = false;
    }

    // Restore pre-revision terms.
    for (contract_id, terms, revision_number) in undo.prior_revisions.into_iter().rev() {
        let open = tip
            .open_contracts
            .get_mut(&contract_id)
            .expect("a revised contract is reopened before its revisions reverse");
        open.contract = terms;
        open.revision_number = revision_number;
    }

    // Delete created contracts.
    for index in (0..tx.new_contracts.len()).rev() {
        tip.open_contracts
            .remove(&Transaction::contract_id(&tx_id, index as u64));
    }

    // Delete created outputs.
    for index in (0..tx.outputs.len()).rev() {
        tip.unspent_outputs
            .remove(&Transaction::output_id(&tx_id, index as u64));
    }

    // Restore consumed outputs.
    for (id, output) in undo.spent_outputs.into_iter().rev() {
        tip.unspent_outputs.insert(id, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, BlockId, Input};
    use std::collections::HashMap;

    fn empty_tip() -> TipState {
        TipState {
            current_tip: BlockId([0; 32]),
            current_path: HashMap::new(),
            unspent_outputs: HashMap::new(),
            open_contracts: HashMap::new(),
        }
    }

    fn funded_tip(id: OutputId, value: u64) -> TipState {
        let mut tip = empty_tip();
        tip.unspent_outputs.insert(
            id,
            Output {
                value: Currency::from(value),
                spend_hash: Address([1; 32]),
            },
        );
        tip
    }

    fn bare_transaction() -> Transaction {
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

    fn test_contract(start: Height, end: Height, fund: u64) -> FileContract {
        FileContract {
            file_merkle_root: [0; 32],
            file_size: 4096,
            start,
            end,
            fund: Currency::from(fund),
            challenge_frequency: 5,
            tolerance: 2,
            valid_proof_payout: Currency::from(10),
            valid_proof_address: Address([2; 32]),
            missed_proof_payout: Currency::from(10),
            missed_proof_address: Address([3; 32]),
        }
    }

    #[test]
    fn test_validate_missing_input() {
        let tip = empty_tip();
        let mut tx = bare_transaction();
        tx.inputs.push(Input {
            output_id: OutputId([5; 32]),
        });

        assert_eq!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::UnknownInput(OutputId([5; 32])))
        );
    }

    #[test]
    fn test_validate_double_spend_within_transaction() {
        let id = OutputId([5; 32]);
        let tip = funded_tip(id, 100);
        let mut tx = bare_transaction();
        tx.inputs.push(Input { output_id: id });
        tx.inputs.push(Input { output_id: id });

        assert_eq!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::DoubleSpend(id))
        );
    }

    #[test]
    fn test_validate_imbalance() {
        let id = OutputId([5; 32]);
        let tip = funded_tip(id, 100);
        let mut tx = bare_transaction();
        tx.inputs.push(Input { output_id: id });
        tx.outputs.push(Output {
            value: Currency::from(60),
            spend_hash: Address([7; 32]),
        });
        tx.miner_fees.push(Currency::from(39));

        // 100 != 60 + 39.
        assert!(matches!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::Imbalance { .. })
        ));

        tx.miner_fees[0] = Currency::from(40);
        assert_eq!(validate_transaction(&tip, 1, &tx), Ok(()));
    }

    #[test]
    fn test_validate_contract_funds_count_toward_balance() {
        let id = OutputId([5; 32]);
        let tip = funded_tip(id, 100);
        let mut tx = bare_transaction();
        tx.inputs.push(Input { output_id: id });
        tx.new_contracts.push(test_contract(5, 20, 100));

        assert_eq!(validate_transaction(&tip, 1, &tx), Ok(()));
    }

    #[test]
    fn test_validate_contract_must_start_in_future() {
        let id = OutputId([5; 32]);
        let tip = funded_tip(id, 100);
        let mut tx = bare_transaction();
        tx.inputs.push(Input { output_id: id });
        tx.new_contracts.push(test_contract(5, 20, 100));

        assert!(matches!(
            validate_transaction(&tip, 5, &tx),
            Err(TransactionError::InvalidContract(_))
        ));
    }

    #[test]
    fn test_validate_contract_rejects_zero_frequency() {
        let id = OutputId([5; 32]);
        let tip = funded_tip(id, 100);
        let mut tx = bare_transaction();
        tx.inputs.push(Input { output_id: id });
        let mut contract = test_contract(5, 20, 100);
        contract.challenge_frequency = 0;
        tx.new_contracts.push(contract);

        assert!(matches!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::InvalidContract(_))
        ));
    }

    #[test]
    fn test_validate_unknown_contract_proof() {
        let tip = empty_tip();
        let mut tx = bare_transaction();
        tx.storage_proofs.push(crate::types::StorageProof {
            contract_id: ContractId([9; 32]),
            segment: vec![],
            hash_set: vec![],
        });

        assert_eq!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::UnknownContract(ContractId([9; 32])))
        );
    }

    #[test]
    fn test_validate_stale_revision() {
        let mut tip = empty_tip();
        let contract_id = ContractId([9; 32]);
        let mut open = OpenContract::new(test_contract(5, 20, 100), contract_id);
        open.revision_number = 3;
        tip.open_contracts.insert(contract_id, open);

        let mut tx = bare_transaction();
        tx.contract_revisions.push(crate::types::ContractRevision {
            contract_id,
            revision_number: 3,
            new_terms: test_contract(5, 20, 100),
        });

        assert_eq!(
            validate_transaction(&tip, 1, &tx),
            Err(TransactionError::StaleRevision(contract_id))
        );
    }

    #[test]
    fn test_apply_reverse_round_trip() {
        let spent_id = OutputId([5; 32]);
        let mut tip = funded_tip(spent_id, 100);
        let before = tip.clone();

        let mut tx = bare_transaction();
        tx.inputs.push(Input {
            output_id: spent_id,
        });
        tx.outputs.push(Output {
            value: Currency::from(30),
            spend_hash: Address([7; 32]),
        });
        tx.miner_fees.push(Currency::from(20));
        tx.new_contracts.push(test_contract(5, 20, 50));
        assert_eq!(validate_transaction(&tip, 1, &tx), Ok(()));

        let undo = apply_transaction(&mut tip, 1, &tx);
        let tx_id = tx.id();
        assert!(!tip.unspent_outputs.contains_key(&spent_id));
        assert!(tip
            .unspent_outputs
            .contains_key(&Transaction::output_id(&tx_id, 0)));
        assert_eq!(tip.open_contracts.len(), 1);

        reverse_transaction(&mut tip, &tx, undo);
        assert_eq!(tip, before);
    }

    #[test]
    fn test_proof_credit_and_reversal() {
        let contract_id = ContractId([9; 32]);
        let mut tip = empty_tip();
        tip.open_contracts
            .insert(contract_id, OpenContract::new(test_contract(1, 20, 100), contract_id));
        let before = tip.clone();

        let mut tx = bare_transaction();
        tx.storage_proofs.push(crate::types::StorageProof {
            contract_id,
            segment: vec![1, 2, 3],
            hash_set: vec![],
        });
        assert_eq!(validate_transaction(&tip, 3, &tx), Ok(()));

        let undo = apply_transaction(&mut tip, 3, &tx);
        {
            let open = &tip.open_contracts[&contract_id];
            assert!(open.window_satisfied);
            assert_eq!(open.funds_remaining, Currency::from(90));
        }
        let proof_output = tip
            .unspent_outputs
            .get(&storage_proof_output_id(&contract_id, 3, true))
            .unwrap();
        assert_eq!(proof_output.value, Currency::from(10));
        assert_eq!(proof_output.spend_hash, Address([2; 32]));

        // A second proof for the same window no longer validates.
        assert_eq!(
            validate_transaction(&tip, 3, &tx),
            Err(TransactionError::WindowAlreadySatisfied(contract_id))
        );

        reverse_transaction(&mut tip, &tx, undo);
        assert_eq!(tip, before);
    }

    #[test]
    fn test_proof_payout_capped_by_remaining_funds() {
        let contract_id = ContractId([9; 32]);
        let mut contract = test_contract(1, 20, 4);
        contract.valid_proof_payout = Currency::from(10);
        let mut tip = empty_tip();
        tip.open_contracts
            .insert(contract_id, OpenContract::new(contract, contract_id));

        let mut tx = bare_transaction();
        tx.storage_proofs.push(crate::types::StorageProof {
            contract_id,
            segment: vec![],
            hash_set: vec![],
        });

        apply_transaction(&mut tip, 3, &tx);
        let proof_output = tip
            .unspent_outputs
            .get(&storage_proof_output_id(&contract_id, 3, true))
            .unwrap();
        assert_eq!(proof_output.value, Currency::from(4));
        assert!(tip.open_contracts[&contract_id].funds_remaining.is_zero());
    }
}
