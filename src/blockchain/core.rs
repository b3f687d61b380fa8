// Blocks, their validity rules and the ledger of admitted blocks.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
