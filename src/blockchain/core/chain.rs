use crate::encoding::{encode_as_str, sha256_2_string, HexHash};
use crate::transaction::Transaction;
use primitive_types::U512;
use std::fmt;

/// Parent hash carried by every root block.
pub const GENESIS_PARENT: &str = "genesis";
/// Maximum number of transactions a block may carry.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 900;

/// A block of transactions. `merkle` and `hash` are caches of values derivable from the
/// other fields; anything that changes a header field must recompute `hash`.
/// Blocks are never mutated once a ledger has admitted them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub height: u64,
    pub transactions: Vec<Transaction>,
    pub parent_hash: HexHash,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Seal-specific difficulty value (unused by proof-of-authority).
    pub target: U512,
    pub is_genesis: bool,
    pub merkle: HexHash,
    /// Nonce for proof-of-work, integer-encoded signature for proof-of-authority.
    pub seal_data: U512,
    pub hash: HexHash,
}

impl Block {
    /// Unsealed block template stamped with the current time.
    pub fn new(height: u64, parent_hash: impl Into<HexHash>, target: U512, transactions: Vec<Transaction>) -> Self {
        Block::new_at(height, parent_hash, now_secs(), target, false, transactions)
    }

    /// Unsealed root block template stamped with the current time.
    pub fn genesis(target: U512, transactions: Vec<Transaction>) -> Self {
        Block::new_at(0, GENESIS_PARENT, now_secs(), target, true, transactions)
    }

    pub fn new_at(
        height: u64,
        parent_hash: impl Into<HexHash>,
        timestamp: u64,
        target: U512,
        is_genesis: bool,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle = Block::calculate_merkle_root(&transactions);
        let mut block = Block {
            height,
            transactions,
            parent_hash: parent_hash.into(),
            timestamp,
            target,
            is_genesis,
            merkle,
            seal_data: U512::zero(),
            hash: HexHash::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Pairwise double-SHA256 tree over the transactions' full encodings. An odd level
    /// pairs its last node with itself; an empty list yields the empty string.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> HexHash {
        let mut level: Vec<HexHash> = transactions
            .iter()
            .map(|tx| sha256_2_string(&tx.to_string()))
            .collect();

        if level.is_empty() {
            return HexHash::new();
        }

        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    sha256_2_string(&format!("{}{}", left, right))
                })
                .collect();
        }
        level.swap_remove(0)
    }

    /// The portion of the header covered by the seal.
    pub fn unsealed_header(&self) -> String {
        let is_genesis = if self.is_genesis { "True" } else { "False" };
        let fields: [&dyn fmt::Display; 6] = [
            &self.height,
            &self.timestamp,
            &self.target,
            &self.parent_hash,
            &is_genesis,
            &self.merkle,
        ];
        encode_as_str(fields, "`")
    }

    /// Header string for a given seal value.
    pub fn header_with_seal(&self, seal_data: &U512) -> String {
        encode_as_str([self.unsealed_header(), seal_data.to_string()], "`")
    }

    pub fn header(&self) -> String {
        self.header_with_seal(&self.seal_data)
    }

    pub fn calculate_hash(&self) -> HexHash {
        sha256_2_string(&self.header())
    }

    /// Replaces the seal and recomputes the hash. Never call on an admitted block.
    pub fn set_seal_data(&mut self, seal_data: U512) {
        self.seal_data = seal_data;
        self.hash = self.calculate_hash();
    }

    /// Integer value of the block hash, `None` if the hash is not valid hex.
    pub fn hash_value(&self) -> Option<U512> {
        let bytes = hex::decode(&self.hash).ok()?;
        if bytes.len() > 64 {
            return None;
        }
        Some(U512::from_big_endian(&bytes))
    }
}

impl fmt::Display for Block {
    /// Full representation including every transaction, for debugging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_as_str(
            [self.header(), encode_as_str(&self.transactions, "!")],
            "`",
        ))
    }
}

pub(crate) fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
