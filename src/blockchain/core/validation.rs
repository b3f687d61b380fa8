//! Block validity engine: a pure function of a candidate block and the ledger's
//! admitted state. Checks run in a fixed order and the first failure is reported.

use super::chain::{Block, GENESIS_PARENT, MAX_TRANSACTIONS_PER_BLOCK};
use super::state::Ledger;
use crate::consensus::SealStrategy;
use crate::encoding::HexHash;
use crate::transaction::{OutputRef, Transaction, TransactionOutput};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a block was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Rejection {
    #[error("Merkle root failed to match")]
    MerkleMismatch,
    #[error("Hash failed to match")]
    HashMismatch,
    #[error("Too many transactions")]
    TooManyTransactions,
    #[error("Invalid genesis")]
    InvalidGenesis,
    #[error("Nonexistent parent")]
    NonexistentParent,
    #[error("Invalid height")]
    InvalidHeight,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Invalid seal")]
    InvalidSeal,
    #[error("Malformed transaction included")]
    MalformedTransaction,
    #[error("Double transaction inclusion")]
    DoubleTransactionInclusion,
    #[error("Required output not found")]
    RequiredOutputNotFound,
    #[error("User inconsistencies")]
    UserInconsistencies,
    #[error("Double-spent input")]
    DoubleSpentInput,
    #[error("Input transaction not found")]
    InputTransactionNotFound,
    #[error("Creating money")]
    CreatingMoney,
}

/// Outputs consumed by each transaction of the block, in transaction order.
type ConsumedOutputs<'a> = Vec<Vec<&'a TransactionOutput>>;

pub fn validate_block(block: &Block, ledger: &Ledger) -> Result<(), Rejection> {
    if block.merkle != Block::calculate_merkle_root(&block.transactions) {
        return Err(Rejection::MerkleMismatch);
    }
    if block.hash != block.calculate_hash() {
        return Err(Rejection::HashMismatch);
    }
    if block.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK {
        return Err(Rejection::TooManyTransactions);
    }

    if block.is_genesis {
        if block.height != 0 || block.parent_hash != GENESIS_PARENT {
            return Err(Rejection::InvalidGenesis);
        }
        return Ok(());
    }

    let parent = ledger
        .block(&block.parent_hash)
        .ok_or(Rejection::NonexistentParent)?;
    if block.height != parent.height + 1 {
        return Err(Rejection::InvalidHeight);
    }
    if block.timestamp < parent.timestamp {
        return Err(Rejection::InvalidTimestamp);
    }
    if !ledger.seal().seal_is_valid(block) {
        return Err(Rejection::InvalidSeal);
    }
    if !block.transactions.iter().all(Transaction::is_valid) {
        return Err(Rejection::MalformedTransaction);
    }

    // Fork-specific rules only consider blocks on this block's own ancestor chain.
    let ancestors: HashSet<HexHash> = ledger
        .get_chain_ending_with(&block.parent_hash)
        .into_iter()
        .collect();
    let in_block: HashMap<&str, &Transaction> = block
        .transactions
        .iter()
        .map(|tx| (tx.hash(), tx))
        .collect();

    check_no_double_inclusion(block, ledger, &ancestors)?;
    let consumed = resolve_inputs(block, ledger, &in_block)?;
    check_user_consistency(block, &consumed)?;
    check_no_double_spend(block, ledger, &ancestors)?;
    check_inputs_on_chain(block, ledger, &in_block, &ancestors)?;
    check_value_conservation(block, &consumed)
}

fn on_chain(holders: &[HexHash], ancestors: &HashSet<HexHash>) -> bool {
    holders.iter().any(|hash| ancestors.contains(hash))
}

fn check_no_double_inclusion(
    block: &Block,
    ledger: &Ledger,
    ancestors: &HashSet<HexHash>,
) -> Result<(), Rejection> {
    let mut seen = HashSet::new();
    for tx in &block.transactions {
        if !seen.insert(tx.hash()) || on_chain(ledger.blocks_containing_tx(tx.hash()), ancestors) {
            return Err(Rejection::DoubleTransactionInclusion);
        }
    }
    Ok(())
}

/// Looks up every referenced output, in this block first and then globally.
fn resolve_inputs<'a>(
    block: &'a Block,
    ledger: &'a Ledger,
    in_block: &HashMap<&str, &'a Transaction>,
) -> Result<ConsumedOutputs<'a>, Rejection> {
    block
        .transactions
        .iter()
        .map(|tx| {
            tx.input_refs()
                .iter()
                .map(|input| {
                    in_block
                        .get(input.tx_hash.as_str())
                        .copied()
                        .or_else(|| ledger.transaction(&input.tx_hash))
                        .and_then(|source| source.output(input.index))
                        .ok_or(Rejection::RequiredOutputNotFound)
                })
                .collect()
        })
        .collect()
}

/// All consumed outputs must belong to one receiver, who must be the only sender
/// of the new outputs.
fn check_user_consistency(block: &Block, consumed: &ConsumedOutputs<'_>) -> Result<(), Rejection> {
    for (tx, spent) in block.transactions.iter().zip(consumed) {
        let owners: HashSet<&str> = spent.iter().map(|out| out.receiver.as_str()).collect();
        let senders: HashSet<&str> = tx.outputs().iter().map(|out| out.sender.as_str()).collect();
        if owners.len() != 1 || senders != owners {
            return Err(Rejection::UserInconsistencies);
        }
    }
    Ok(())
}

fn check_no_double_spend(
    block: &Block,
    ledger: &Ledger,
    ancestors: &HashSet<HexHash>,
) -> Result<(), Rejection> {
    let mut spent_here: HashSet<&OutputRef> = HashSet::new();
    for input in block.transactions.iter().flat_map(|tx| tx.input_refs()) {
        if !spent_here.insert(input) || on_chain(ledger.blocks_spending_input(input), ancestors) {
            return Err(Rejection::DoubleSpentInput);
        }
    }
    Ok(())
}

/// Sources outside this block must sit on an ancestor; a sibling fork does not count.
fn check_inputs_on_chain(
    block: &Block,
    ledger: &Ledger,
    in_block: &HashMap<&str, &Transaction>,
    ancestors: &HashSet<HexHash>,
) -> Result<(), Rejection> {
    for input in block.transactions.iter().flat_map(|tx| tx.input_refs()) {
        let reachable = in_block.contains_key(input.tx_hash.as_str())
            || on_chain(ledger.blocks_containing_tx(&input.tx_hash), ancestors);
        if !reachable {
            return Err(Rejection::InputTransactionNotFound);
        }
    }
    Ok(())
}

/// Each consumed output caps what its receiver may send out of the spending transaction.
fn check_value_conservation(block: &Block, consumed: &ConsumedOutputs<'_>) -> Result<(), Rejection> {
    for (tx, spent) in block.transactions.iter().zip(consumed) {
        for out in spent {
            match tx.total_sent_by(&out.receiver) {
                Some(sent) if sent <= out.amount => {}
                _ => return Err(Rejection::CreatingMoney),
            }
        }
    }
    Ok(())
}
