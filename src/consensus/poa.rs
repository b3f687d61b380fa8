//! Proof-of-authority: a block is sealed by the designated authority's signature over
//! its unsealed header. Every block weighs the same.

use super::SealStrategy;
use crate::blockchain::{Block, Ledger};
use crate::crypto::{public_key_from_bytes, verify_signature, KeyPair, SIGNATURE_SIZE};
use crate::error::{ChainError, Result};
use crate::miner::CancelToken;
use primitive_types::U512;
use secp256k1::constants::PUBLIC_KEY_SIZE;
use tracing::warn;

/// Signing is deterministic, but the produced seal is still re-verified and retried.
pub const MAX_SIGNING_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ProofOfAuthority {
    public_key: [u8; PUBLIC_KEY_SIZE],
    signer: Option<KeyPair>,
}

impl ProofOfAuthority {
    /// Verification-only authority.
    pub fn new(public_key: &[u8]) -> Result<Self> {
        Ok(Self {
            public_key: public_key_from_bytes(public_key)?,
            signer: None,
        })
    }

    /// Authority able to seal blocks.
    pub fn with_signer(keypair: KeyPair) -> Self {
        Self {
            public_key: keypair.public_key_bytes(),
            signer: Some(keypair),
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    fn signature_bytes(seal_data: &U512) -> [u8; SIGNATURE_SIZE] {
        let mut bytes = [0u8; SIGNATURE_SIZE];
        seal_data.to_big_endian(&mut bytes);
        bytes
    }
}

impl SealStrategy for ProofOfAuthority {
    /// Targets carry no meaning under proof-of-authority.
    fn calculate_appropriate_target(&self, _ledger: &Ledger, _parent_hash: &str) -> U512 {
        U512::zero()
    }

    fn seal_is_valid(&self, block: &Block) -> bool {
        if block.seal_data.is_zero() {
            return false;
        }
        let signature = Self::signature_bytes(&block.seal_data);
        verify_signature(&self.public_key, block.unsealed_header().as_bytes(), &signature).is_ok()
    }

    fn get_weight(&self, _block: &Block) -> U512 {
        U512::one()
    }

    fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<()> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ChainError::CryptoError("no authority signing key configured".to_string())
        })?;

        let header = block.unsealed_header();
        for attempt in 1..=MAX_SIGNING_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(ChainError::MiningCancelled);
            }
            let signature = signer.sign(header.as_bytes())?;
            block.set_seal_data(U512::from_big_endian(&signature));
            if self.seal_is_valid(block) {
                return Ok(());
            }
            warn!(height = block.height, attempt, "authority signature did not verify, retrying");
        }
        Err(ChainError::CryptoError(format!(
            "authority seal failed verification after {} attempts",
            MAX_SIGNING_ATTEMPTS
        )))
    }
}
