//! Sealing driver: blocking and background mining with cooperative cancellation.
//!
//! Proof-of-work search is CPU-bound and unbounded, so it runs off the thread that
//! serves admission. A [`CancelToken`] lets a caller abandon the search, e.g. after
//! learning about a competing block at the same height.

use crate::blockchain::Block;
use crate::consensus::{Seal, SealStrategy};
use crate::error::{ChainError, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Seals `block` on the calling thread and returns it.
pub fn mine_block(seal: &Seal, block: Block) -> Result<Block> {
    mine_block_with_cancel(seal, block, &CancelToken::new())
}

pub fn mine_block_with_cancel(seal: &Seal, mut block: Block, cancel: &CancelToken) -> Result<Block> {
    let start = Instant::now();
    seal.mine(&mut block, cancel)?;
    info!(
        height = block.height,
        hash = %block.hash,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sealed block"
    );
    Ok(block)
}

/// A sealing search running on its own thread.
pub struct MiningJob {
    cancel: CancelToken,
    result: Receiver<Result<Block>>,
    handle: Option<JoinHandle<()>>,
}

/// Starts sealing `block` on a dedicated thread.
pub fn spawn_miner(seal: Seal, block: Block) -> MiningJob {
    spawn_job(move |token| {
        let height = block.height;
        let outcome = mine_block_with_cancel(&seal, block, token);
        if matches!(outcome, Err(ChainError::MiningCancelled)) {
            debug!(height, "mining cancelled");
        }
        outcome
    })
}

fn spawn_job<F>(work: F) -> MiningJob
where
    F: FnOnce(&CancelToken) -> Result<Block> + Send + 'static,
{
    let cancel = CancelToken::new();
    let (tx, rx) = bounded(1);
    let token = cancel.clone();
    let handle = thread::spawn(move || {
        // receiver may already be gone
        let _ = tx.send(work(&token));
    });

    MiningJob {
        cancel,
        result: rx,
        handle: Some(handle),
    }
}

impl MiningJob {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Requests the search to stop; `wait` then yields `ChainError::MiningCancelled`
    /// unless a seal was already found.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking poll for the outcome.
    pub fn try_result(&mut self) -> Option<Result<Block>> {
        match self.result.try_recv() {
            Ok(outcome) => {
                self.join();
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.lost_outcome())),
        }
    }

    /// Blocks until the search finishes or is cancelled.
    pub fn wait(mut self) -> Result<Block> {
        match self.result.recv() {
            Ok(outcome) => {
                self.join();
                outcome
            }
            Err(_) => Err(self.lost_outcome()),
        }
    }

    /// Error for a thread that ended without reporting.
    fn lost_outcome(&mut self) -> ChainError {
        if self.join() {
            ChainError::MiningCancelled
        } else {
            ChainError::MiningFailed("mining thread panicked".to_string())
        }
    }

    /// `false` if the mining thread panicked.
    fn join(&mut self) -> bool {
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(_)) => {
                error!("mining thread panicked");
                false
            }
            _ => true,
        }
    }
}

impl Drop for MiningJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            let _ = self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProofOfWork;
    use primitive_types::U512;

    #[test]
    fn test_mine_block_trivial_target() {
        let seal = Seal::Work(ProofOfWork::default());
        let block = Block::genesis(U512::one() << 256, vec![]);
        let mined = mine_block(&seal, block).unwrap();
        assert!(seal.seal_is_valid(&mined));
        assert_eq!(mined.seal_data, U512::zero());
    }

    #[test]
    fn test_spawned_miner_finds_easy_seal() {
        let seal = Seal::Work(ProofOfWork::default());
        let block = Block::genesis(U512::one() << 252, vec![]);
        let mined = spawn_miner(seal.clone(), block).wait().unwrap();
        assert!(seal.seal_is_valid(&mined));
        assert_eq!(mined.hash, mined.calculate_hash());
    }

    #[test]
    fn test_cancel_impossible_search() {
        let seal = Seal::Work(ProofOfWork::default());
        // no hash is <= 0 in practice
        let block = Block::genesis(U512::zero(), vec![]);
        let job = spawn_miner(seal, block);
        job.cancel();
        assert_eq!(job.wait().unwrap_err(), ChainError::MiningCancelled);
    }

    #[test]
    fn test_pre_cancelled_token() {
        let seal = Seal::Work(ProofOfWork::default());
        let token = CancelToken::new();
        token.cancel();
        let result = mine_block_with_cancel(&seal, Block::genesis(U512::zero(), vec![]), &token);
        assert!(matches!(result, Err(ChainError::MiningCancelled)));
    }

    #[test]
    fn test_panicking_miner_reports_failure() {
        let job = spawn_job(|_| panic!("sealing backend crashed"));
        assert_eq!(
            job.wait().unwrap_err(),
            ChainError::MiningFailed("mining thread panicked".to_string())
        );

        let mut job = spawn_job(|_| panic!("sealing backend crashed"));
        let outcome = loop {
            if let Some(outcome) = job.try_result() {
                break outcome;
            }
            thread::yield_now();
        };
        assert!(matches!(outcome, Err(ChainError::MiningFailed(_))));
    }
}
