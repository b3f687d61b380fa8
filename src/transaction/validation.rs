/// Syntactic checks for transactions; ledger-contextual checks live in the block validator.
use crate::transaction::types::{Amount, Transaction};

/// Upper bound (inclusive) on input references per transaction.
pub const MAX_INPUTS: usize = 9;
/// Upper bound (inclusive) on outputs per transaction.
pub const MAX_OUTPUTS: usize = 9;

impl Transaction {
    /// Well-formedness only: 1..=9 inputs, 1..=9 outputs, no negative amounts.
    /// Does not check that inputs exist or that value balances.
    pub fn is_valid(&self) -> bool {
        let inputs = self.input_refs().len();
        let outputs = self.outputs().len();
        (1..=MAX_INPUTS).contains(&inputs)
            && (1..=MAX_OUTPUTS).contains(&outputs)
            && self.outputs().iter().all(|out| out.amount >= Amount::ZERO)
    }
}
