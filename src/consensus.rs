//! Seal strategies: the consensus proof attached to every block.
//!
//! The set of seals is closed (proof-of-work, proof-of-authority), so dispatch goes
//! through the [`Seal`] enum rather than trait objects.

pub mod poa;
pub mod pow;

pub use poa::ProofOfAuthority;
pub use pow::ProofOfWork;

use crate::blockchain::{Block, Ledger};
use crate::error::Result;
use crate::miner::CancelToken;
use primitive_types::U512;

/// Capabilities every seal provides.
pub trait SealStrategy {
    /// Target a new child of `parent_hash` must carry.
    fn calculate_appropriate_target(&self, ledger: &Ledger, parent_hash: &str) -> U512;

    /// True only if the block's seal data forms a valid seal.
    fn seal_is_valid(&self, block: &Block) -> bool;

    /// Consensus weight contributed by the block itself.
    fn get_weight(&self, block: &Block) -> U512;

    /// Produces seal data for `block`, updating its hash.
    fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum Seal {
    Work(ProofOfWork),
    Authority(ProofOfAuthority),
}

impl Seal {
    pub fn name(&self) -> &'static str {
        match self {
            Seal::Work(_) => "proof-of-work",
            Seal::Authority(_) => "proof-of-authority",
        }
    }
}

impl SealStrategy for Seal {
    fn calculate_appropriate_target(&self, ledger: &Ledger, parent_hash: &str) -> U512 {
        match self {
            Seal::Work(pow) => pow.calculate_appropriate_target(ledger, parent_hash),
            Seal::Authority(poa) => poa.calculate_appropriate_target(ledger, parent_hash),
        }
    }

    fn seal_is_valid(&self, block: &Block) -> bool {
        match self {
            Seal::Work(pow) => pow.seal_is_valid(block),
            Seal::Authority(poa) => poa.seal_is_valid(block),
        }
    }

    fn get_weight(&self, block: &Block) -> U512 {
        match self {
            Seal::Work(pow) => pow.get_weight(block),
            Seal::Authority(poa) => poa.get_weight(block),
        }
    }

    fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<()> {
        match self {
            Seal::Work(pow) => pow.mine(block, cancel),
            Seal::Authority(poa) => poa.mine(block, cancel),
        }
    }
}

impl From<ProofOfWork> for Seal {
    fn from(pow: ProofOfWork) -> Self {
        Seal::Work(pow)
    }
}

impl From<ProofOfAuthority> for Seal {
    fn from(poa: ProofOfAuthority) -> Self {
        Seal::Authority(poa)
    }
}
