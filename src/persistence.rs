//! Durable storage for admitted blocks.
//!
//! Only blocks are stored. Indices and weights are derived state: loading replays the
//! stored blocks through full validation, so a corrupted store cannot smuggle an
//! invalid block into the ledger.

use crate::blockchain::{Block, Ledger};
use crate::consensus::Seal;
use crate::error::ChainError;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tracing::{debug, info};

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    /// Rebuilds a ledger from the stored blocks.
    fn load(&self, seal: Seal) -> Result<Ledger, ChainError>;

    /// Discards any stored blocks and returns an empty ledger.
    fn initialize(&self, seal: Seal) -> Result<Ledger, ChainError>;

    /// Stores every block of `ledger` not yet stored. Already stored blocks are kept as is.
    fn commit(&self, ledger: &Ledger) -> Result<(), ChainError>;

    /// Stores the single admitted block `hash` of `ledger`, if not stored yet.
    fn commit_block(&self, ledger: &Ledger, hash: &str) -> Result<(), ChainError>;

    fn block_count(&self) -> Result<usize, ChainError>;

    /// Loads the stored ledger, or starts an empty one when nothing is stored. A store
    /// that holds blocks but fails to load is reported and left untouched.
    fn load_or_initialize(&self, seal: Seal) -> Result<Ledger, ChainError> {
        if self.block_count()? == 0 {
            self.initialize(seal)
        } else {
            self.load(seal)
        }
    }
}

fn replay(seal: Seal, blocks: impl IntoIterator<Item = Block>) -> Result<Ledger, ChainError> {
    let mut ledger = Ledger::new(seal);
    for block in blocks {
        let hash = block.hash.clone();
        ledger.try_add_block(block).map_err(|e| {
            ChainError::DatabaseError(format!("Stored block {} failed to replay: {}", hash, e))
        })?;
    }
    Ok(ledger)
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                hash TEXT PRIMARY KEY,
                height INTEGER NOT NULL,
                position INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        debug!(path, "opened block store");
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn load_blocks(&self) -> Result<Vec<Block>, ChainError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT body FROM blocks ORDER BY height ASC, position ASC")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let body = row.map_err(|e| ChainError::DatabaseError(format!("Failed to read row: {}", e)))?;
            let block: Block = serde_json::from_str(&body).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to deserialize block: {}", e))
            })?;
            blocks.push(block);
        }
        Ok(blocks)
    }
}

fn insert_block(conn: &Connection, position: usize, block: &Block) -> Result<usize, ChainError> {
    let body = serde_json::to_string(block)
        .map_err(|e| ChainError::DatabaseError(format!("Failed to serialize block: {}", e)))?;
    conn.execute(
        "INSERT OR IGNORE INTO blocks (hash, height, position, body) VALUES (?1, ?2, ?3, ?4)",
        params![block.hash, block.height as i64, position as i64, body],
    )
    .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))
}

fn unknown_block(hash: &str) -> ChainError {
    ChainError::DatabaseError(format!("Block {} is not in the ledger", hash))
}

impl Persistence for Database {
    fn load(&self, seal: Seal) -> Result<Ledger, ChainError> {
        let blocks = self.load_blocks()?;
        let count = blocks.len();
        let ledger = replay(seal, blocks)?;
        info!(blocks = count, "loaded ledger from database");
        Ok(ledger)
    }

    fn initialize(&self, seal: Seal) -> Result<Ledger, ChainError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear blocks: {}", e)))?;
        Ok(Ledger::new(seal))
    }

    /// All new blocks land in one SQLite transaction.
    fn commit(&self, ledger: &Ledger) -> Result<(), ChainError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        let mut inserted = 0usize;
        for (position, block) in ledger.blocks_in_order() {
            inserted += insert_block(&tx, position, block)?;
        }

        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;
        debug!(inserted, "committed ledger to database");
        Ok(())
    }

    fn commit_block(&self, ledger: &Ledger, hash: &str) -> Result<(), ChainError> {
        let (position, block) = ledger.positioned_block(hash).ok_or_else(|| unknown_block(hash))?;
        let inserted = insert_block(&self.conn.lock(), position, block)?;
        debug!(hash, height = block.height, inserted, "committed block to database");
        Ok(())
    }

    fn block_count(&self) -> Result<usize, ChainError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to count blocks: {}", e)))?;
        Ok(count as usize)
    }
}

/// In-memory persistence for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn load(&self, seal: Seal) -> Result<Ledger, ChainError> {
        let blocks = self.blocks.lock().clone();
        replay(seal, blocks)
    }

    fn initialize(&self, seal: Seal) -> Result<Ledger, ChainError> {
        self.blocks.lock().clear();
        Ok(Ledger::new(seal))
    }

    fn commit(&self, ledger: &Ledger) -> Result<(), ChainError> {
        let snapshot = ledger.blocks_in_order().map(|(_, block)| block.clone()).collect();
        *self.blocks.lock() = snapshot;
        Ok(())
    }

    fn commit_block(&self, ledger: &Ledger, hash: &str) -> Result<(), ChainError> {
        let (_, block) = ledger.positioned_block(hash).ok_or_else(|| unknown_block(hash))?;
        let mut blocks = self.blocks.lock();
        if !blocks.iter().any(|stored| stored.hash == block.hash) {
            blocks.push(block.clone());
        }
        Ok(())
    }

    fn block_count(&self) -> Result<usize, ChainError> {
        Ok(self.blocks.lock().len())
    }
}
