/// Transaction types for CornellChain
use crate::encoding::{encode_as_str, sha256_2_string, HexHash};
use crate::error::ChainError;
use fixed::types::I64F64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point amount; fractional values are allowed.
pub type Amount = I64F64;

/// Reference to output `index` (0-based) of the transaction identified by `tx_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_hash: HexHash,
    pub index: usize,
}

impl OutputRef {
    pub fn new(tx_hash: impl Into<HexHash>, index: usize) -> Self {
        OutputRef {
            tx_hash: tx_hash.into(),
            index,
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

impl FromStr for OutputRef {
    type Err = ChainError;

    /// Parses the `tx_hash:index` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx_hash, index) = s
            .rsplit_once(':')
            .ok_or_else(|| ChainError::InvalidInputRef(format!("missing ':' in {:?}", s)))?;
        let index = index
            .parse::<usize>()
            .map_err(|e| ChainError::InvalidInputRef(format!("bad output index in {:?}: {}", s, e)))?;
        Ok(OutputRef::new(tx_hash, index))
    }
}

/// An output in the UTXO model; addressed by its position in the owning transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Account creating the output.
    pub sender: String,
    /// Account that may later spend the output.
    pub receiver: String,
    pub amount: Amount,
}

impl TransactionOutput {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: Amount) -> Self {
        TransactionOutput {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }
}

impl fmt::Display for TransactionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: [&dyn fmt::Display; 3] = [&self.sender, &self.receiver, &self.amount];
        f.write_str(&encode_as_str(fields, "~"))
    }
}

/// A transaction consumes a list of outputs and creates a new list of outputs.
/// Its identity is the digest of its header, computed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionParts")]
pub struct Transaction {
    input_refs: Vec<OutputRef>,
    outputs: Vec<TransactionOutput>,
    hash: HexHash,
}

/// Deserialization shape; the hash is always recomputed rather than trusted.
#[derive(Deserialize)]
struct TransactionParts {
    input_refs: Vec<OutputRef>,
    outputs: Vec<TransactionOutput>,
}

impl From<TransactionParts> for Transaction {
    fn from(parts: TransactionParts) -> Self {
        Transaction::new(parts.input_refs, parts.outputs)
    }
}

impl Transaction {
    pub fn new(input_refs: Vec<OutputRef>, outputs: Vec<TransactionOutput>) -> Self {
        let mut tx = Transaction {
            input_refs,
            outputs,
            hash: HexHash::new(),
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    pub fn input_refs(&self) -> &[OutputRef] {
        &self.input_refs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&TransactionOutput> {
        self.outputs.get(index)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `inputs-outputs`, each side joined with `;`.
    pub fn header(&self) -> String {
        encode_as_str(
            [
                encode_as_str(&self.input_refs, ";"),
                encode_as_str(&self.outputs, ";"),
            ],
            "-",
        )
    }

    pub fn calculate_hash(&self) -> HexHash {
        sha256_2_string(&self.header())
    }

    /// Total amount this transaction sends out on behalf of `sender`.
    /// `None` if the sum does not fit the amount type.
    pub fn total_sent_by(&self, sender: &str) -> Option<Amount> {
        self.outputs
            .iter()
            .filter(|out| out.sender == sender)
            .try_fold(Amount::ZERO, |acc, out| acc.checked_add(out.amount))
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_as_str([self.hash.clone(), self.header()], "-"))
    }
}
