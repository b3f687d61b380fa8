use crate::blockchain::{Block, Ledger, Rejection};
use crate::config::Config;
use crate::consensus::Seal;
use crate::encoding::HexHash;
use crate::error::ChainError;
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-filtered fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Owns the ledger and its store. Block admission is serialized through the write
/// lock; readers share the read lock.
pub struct Node {
    pub config: Config,
    ledger: Arc<RwLock<Ledger>>,
    persistence: Box<dyn Persistence>,
}

impl Node {
    pub fn open(config: &Config) -> Result<Self, ChainError> {
        let seal = config.consensus.build_seal()?;
        info!("Starting node ({}, database = {})", seal.name(), config.database.path);

        let persistence: Box<dyn Persistence> = match open_database(&config.database.path) {
            Ok(db) => Box::new(db),
            Err(e) => {
                warn!(
                    "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                    config.database.path, e
                );
                Box::new(InMemoryPersistence::new())
            }
        };
        Self::with_persistence(config.clone(), seal, persistence)
    }

    pub fn with_persistence(
        config: Config,
        seal: Seal,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        let ledger = persistence.load_or_initialize(seal)?;
        info!(blocks = ledger.len(), "ledger ready");
        Ok(Self {
            config,
            ledger: Arc::new(RwLock::new(ledger)),
            persistence,
        })
    }

    /// Shared handle for readers on other threads.
    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.ledger.read())
    }

    /// Admits a block and commits it. A failed commit is logged; the block stays admitted.
    pub fn submit_block(&self, block: Block) -> Result<HexHash, ChainError> {
        let mut ledger = self.ledger.write();
        let hash = ledger.try_add_block(block)?;
        if let Err(e) = self.persistence.commit_block(&ledger, &hash) {
            warn!("Failed to persist block {}: {}", hash, e);
        }
        Ok(hash)
    }

    /// Unsealed child of `parent_hash`, or of the heaviest tip when none is given.
    pub fn candidate_block(
        &self,
        parent_hash: Option<&str>,
        transactions: Vec<Transaction>,
    ) -> Result<Block, ChainError> {
        let ledger = self.ledger.read();
        let parent = match parent_hash {
            Some(hash) => hash.to_string(),
            None => ledger
                .get_heaviest_chain_tip()
                .map(|tip| tip.hash.clone())
                .ok_or(ChainError::InvalidBlock(Rejection::NonexistentParent))?,
        };
        ledger.candidate_block(&parent, transactions)
    }

    pub fn seal(&self) -> Seal {
        self.ledger.read().seal().clone()
    }
}

fn open_database(path: &str) -> Result<Database, ChainError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Database::open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::GENESIS_PARENT;
    use crate::config::{AuthorityConfig, SealKind};
    use crate::consensus::ProofOfWork;
    use crate::crypto::KeyPair;
    use crate::miner::mine_block;
    use primitive_types::U512;

    fn trivial_genesis() -> Block {
        Block::new_at(0, GENESIS_PARENT, 1, U512::one() << 256, true, vec![])
    }

    #[test]
    fn test_submit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("nested/chain.db").to_string_lossy().into_owned();

        let genesis = trivial_genesis();
        {
            let node = Node::open(&config).unwrap();
            assert_eq!(node.submit_block(genesis.clone()).unwrap(), genesis.hash);
            assert!(matches!(
                node.submit_block(genesis.clone()),
                Err(ChainError::BlockAlreadyExists(_))
            ));

            let candidate = node.candidate_block(None, vec![]).unwrap();
            assert_eq!(candidate.parent_hash, genesis.hash);
            let sealed = mine_block(&node.seal(), candidate).unwrap();
            node.submit_block(sealed).unwrap();
        }

        let reopened = Node::open(&config).unwrap();
        assert_eq!(reopened.with_ledger(|l| l.len()), 2);
        assert_eq!(reopened.with_ledger(|l| l.heaviest_chain().len()), 2);
    }

    #[test]
    fn test_open_with_changed_seal_keeps_stored_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("chain.db").to_string_lossy().into_owned();
        Node::open(&config).unwrap().submit_block(trivial_genesis()).unwrap();

        let authority = KeyPair::generate();
        let mut authority_config = config.clone();
        authority_config.consensus.kind = SealKind::Authority;
        authority_config.consensus.authority = Some(AuthorityConfig {
            public_key: hex::encode(authority.public_key_bytes()),
            secret_key: None,
        });
        assert!(matches!(Node::open(&authority_config), Err(ChainError::DatabaseError(_))));

        let reopened = Node::open(&config).unwrap();
        assert_eq!(reopened.with_ledger(|l| l.len()), 1);
    }

    #[test]
    fn test_in_memory_node() {
        let node = Node::with_persistence(
            Config::default(),
            ProofOfWork::default().into(),
            Box::new(InMemoryPersistence::new()),
        )
        .unwrap();
        assert!(node.candidate_block(None, vec![]).is_err());
        node.submit_block(trivial_genesis()).unwrap();
        let shared = node.ledger();
        assert_eq!(shared.read().len(), 1);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
