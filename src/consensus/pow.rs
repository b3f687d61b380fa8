//! Proof-of-work: a block is sealed when its header hash, read as an integer, is at
//! most the block's target.

use super::SealStrategy;
use crate::blockchain::{Block, Ledger};
use crate::encoding::sha256_2_string;
use crate::error::{ChainError, Result};
use crate::miner::CancelToken;
use primitive_types::U512;
use tracing::debug;

/// Number of blocks between difficulty adjustments.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
/// Desired seconds between blocks.
pub const TARGET_BLOCK_TIME: u64 = 30;
/// Mining checks for cancellation once per this many nonces.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// 2^248: hashes need two leading zero hex digits; a block at this target weighs 256.
pub fn initial_target() -> U512 {
    U512::one() << 248
}

/// 2^256, the weight of a block whose target is zero.
pub fn max_weight() -> U512 {
    U512::one() << 256
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    pub initial_target: U512,
    /// Retargeting never produces a target above this.
    pub max_target: U512,
    pub retarget_window: u64,
    pub target_block_time: u64,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self {
            initial_target: initial_target(),
            max_target: max_weight(),
            retarget_window: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_time: TARGET_BLOCK_TIME,
        }
    }
}

impl ProofOfWork {
    pub fn with_initial_target(initial_target: U512) -> Self {
        Self {
            initial_target,
            ..Self::default()
        }
    }

    /// `floor(2^256 / target)`; a zero target is maximal difficulty and weighs exactly 2^256.
    pub fn weight_for_target(target: U512) -> U512 {
        if target.is_zero() {
            max_weight()
        } else {
            max_weight() / target
        }
    }

    fn hash_meets_target(hash_hex: &str, target: &U512) -> bool {
        match hex::decode(hash_hex) {
            Ok(bytes) if bytes.len() <= 64 => U512::from_big_endian(&bytes) <= *target,
            _ => false,
        }
    }

    /// `parent.target * actual / expected`, with `actual` clamped to a factor of four
    /// either side of `expected`, and the result clamped to `[1, max_target]`.
    fn retarget(&self, parent: &Block, window_start: &Block) -> U512 {
        let expected = self.retarget_window.saturating_mul(self.target_block_time).max(1);
        let actual = parent
            .timestamp
            .saturating_sub(window_start.timestamp)
            .clamp((expected / 4).max(1), expected.saturating_mul(4));

        let scaled = parent
            .target
            .checked_mul(U512::from(actual))
            .map(|t| t / U512::from(expected))
            .unwrap_or(self.max_target);

        let new_target = scaled.max(U512::one()).min(self.max_target);
        debug!(
            height = parent.height + 1,
            actual_secs = actual,
            expected_secs = expected,
            %new_target,
            "retargeted proof-of-work difficulty"
        );
        new_target
    }
}

impl SealStrategy for ProofOfWork {
    fn calculate_appropriate_target(&self, ledger: &Ledger, parent_hash: &str) -> U512 {
        let window = self.retarget_window.max(1);
        let Some(parent) = ledger.block(parent_hash) else {
            return self.initial_target;
        };
        let chain = ledger.get_chain_ending_with(parent_hash);
        if (chain.len() as u64) <= window {
            return self.initial_target;
        }

        let height = parent.height + 1;
        if height % window != 0 {
            return parent.target;
        }

        match ledger.block(&chain[window as usize]) {
            Some(window_start) => self.retarget(parent, window_start),
            None => parent.target,
        }
    }

    fn seal_is_valid(&self, block: &Block) -> bool {
        Self::hash_meets_target(&block.calculate_hash(), &block.target)
    }

    fn get_weight(&self, block: &Block) -> U512 {
        Self::weight_for_target(block.target)
    }

    /// Brute-force nonce search starting from zero.
    fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<()> {
        let prefix = format!("{}`", block.unsealed_header());
        let mut nonce = U512::zero();
        let mut attempts: u64 = 0;
        loop {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ChainError::MiningCancelled);
            }
            let hash = sha256_2_string(&format!("{}{}", prefix, nonce));
            if Self::hash_meets_target(&hash, &block.target) {
                block.set_seal_data(nonce);
                debug!(height = block.height, attempts, "found proof-of-work nonce");
                return Ok(());
            }
            nonce = nonce.overflowing_add(U512::one()).0;
            attempts = attempts.wrapping_add(1);
        }
    }
}
