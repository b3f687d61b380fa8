use super::chain::Block;
use super::validation::{validate_block, Rejection};
use crate::consensus::{Seal, SealStrategy};
use crate::encoding::HexHash;
use crate::error::{ChainError, Result};
use crate::transaction::{OutputRef, Transaction};
use primitive_types::U512;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Every admitted block across every fork, plus the indices validation needs.
///
/// Transaction and spent-input indices are global: they record knowledge from all
/// forks, and fork exclusivity is decided by intersecting them with a block's own
/// ancestor chain. `add_block` is the only mutating operation; callers sharing a
/// ledger between threads must serialize it.
#[derive(Debug, Clone)]
pub struct Ledger {
    seal: Seal,
    blocks: HashMap<HexHash, Block>,
    /// Block hashes per height, in admission order.
    chain: BTreeMap<u64, Vec<HexHash>>,
    all_transactions: HashMap<HexHash, Transaction>,
    blocks_containing_tx: HashMap<HexHash, Vec<HexHash>>,
    blocks_spending_input: HashMap<OutputRef, Vec<HexHash>>,
    /// Cumulative weight: own seal weight plus the parent's cumulative weight.
    weights: HashMap<HexHash, U512>,
}

impl Ledger {
    pub fn new(seal: Seal) -> Self {
        Ledger {
            seal,
            blocks: HashMap::new(),
            chain: BTreeMap::new(),
            all_transactions: HashMap::new(),
            blocks_containing_tx: HashMap::new(),
            blocks_spending_input: HashMap::new(),
            weights: HashMap::new(),
        }
    }

    pub fn seal(&self) -> &Seal {
        &self.seal
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, hash: &str) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains_block(&self, hash: &str) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Any transaction admitted on any fork.
    pub fn transaction(&self, hash: &str) -> Option<&Transaction> {
        self.all_transactions.get(hash)
    }

    pub fn blocks_containing_tx(&self, tx_hash: &str) -> &[HexHash] {
        self.blocks_containing_tx
            .get(tx_hash)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn blocks_spending_input(&self, input: &OutputRef) -> &[HexHash] {
        self.blocks_spending_input
            .get(input)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Validates `block` against the currently admitted state without admitting it.
    pub fn is_valid(&self, block: &Block) -> std::result::Result<(), Rejection> {
        validate_block(block, self)
    }

    /// Admits a block, or leaves the ledger untouched and reports why not.
    pub fn try_add_block(&mut self, block: Block) -> Result<HexHash> {
        if let Err(reason) = validate_block(&block, self) {
            debug!(height = block.height, hash = %block.hash, %reason, "rejected block");
            return Err(reason.into());
        }
        if self.blocks.contains_key(&block.hash) {
            debug!(hash = %block.hash, "block already admitted");
            return Err(ChainError::BlockAlreadyExists(block.hash));
        }

        let own_weight = self.seal.get_weight(&block);
        let weight = if block.is_genesis {
            own_weight
        } else {
            self.weights
                .get(&block.parent_hash)
                .copied()
                .unwrap_or_default()
                .saturating_add(own_weight)
        };

        let hash = block.hash.clone();
        for tx in &block.transactions {
            self.all_transactions
                .entry(tx.hash().to_string())
                .or_insert_with(|| tx.clone());
            self.blocks_containing_tx
                .entry(tx.hash().to_string())
                .or_default()
                .push(hash.clone());
            for input in tx.input_refs() {
                self.blocks_spending_input
                    .entry(input.clone())
                    .or_default()
                    .push(hash.clone());
            }
        }
        self.chain.entry(block.height).or_default().push(hash.clone());
        self.weights.insert(hash.clone(), weight);

        info!(
            height = block.height,
            hash = %hash,
            txs = block.transactions.len(),
            %weight,
            "admitted block"
        );
        self.blocks.insert(hash.clone(), block);
        Ok(hash)
    }

    /// Admits a block; `false` if it was rejected (the ledger is then unchanged).
    pub fn add_block(&mut self, block: Block) -> bool {
        self.try_add_block(block).is_ok()
    }

    /// Hashes from `hash` back to its genesis, inclusive; empty if `hash` is unknown.
    pub fn get_chain_ending_with(&self, hash: &str) -> Vec<HexHash> {
        let mut chain = Vec::new();
        let mut current = self.blocks.get(hash);
        while let Some(block) = current {
            chain.push(block.hash.clone());
            if block.is_genesis {
                break;
            }
            current = self.blocks.get(&block.parent_hash);
        }
        chain
    }

    /// Block with the greatest cumulative weight; ties go to the smallest hash.
    pub fn get_heaviest_chain_tip(&self) -> Option<&Block> {
        self.weights
            .iter()
            .max_by(|(hash_a, weight_a), (hash_b, weight_b)| {
                weight_a.cmp(weight_b).then_with(|| hash_b.cmp(hash_a))
            })
            .and_then(|(hash, _)| self.blocks.get(hash))
    }

    /// The chain ending at the heaviest tip, tip first.
    pub fn heaviest_chain(&self) -> Vec<HexHash> {
        self.get_heaviest_chain_tip()
            .map(|tip| self.get_chain_ending_with(&tip.hash))
            .unwrap_or_default()
    }

    /// Heights holding at least one block, ascending.
    pub fn get_heights_with_blocks(&self) -> Vec<u64> {
        self.chain.keys().copied().collect()
    }

    pub fn get_blockhashes_at_height(&self, height: u64) -> &[HexHash] {
        self.chain
            .get(&height)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get_all_block_weights(&self) -> &HashMap<HexHash, U512> {
        &self.weights
    }

    pub fn weight_of(&self, hash: &str) -> Option<U512> {
        self.weights.get(hash).copied()
    }

    /// Blocks ordered by height, then admission order within a height. Parents always
    /// precede their children, so replaying this sequence rebuilds the ledger.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = (usize, &Block)> + '_ {
        self.chain.values().flat_map(move |hashes| {
            hashes
                .iter()
                .enumerate()
                .filter_map(move |(position, hash)| self.blocks.get(hash).map(|b| (position, b)))
        })
    }

    /// An admitted block with its admission position within its height.
    pub fn positioned_block(&self, hash: &str) -> Option<(usize, &Block)> {
        let block = self.blocks.get(hash)?;
        let position = self.chain.get(&block.height)?.iter().position(|h| h == hash)?;
        Some((position, block))
    }

    /// Unsealed child of `parent_hash` carrying the seal's appropriate target, stamped
    /// no earlier than its parent.
    pub fn candidate_block(&self, parent_hash: &str, transactions: Vec<Transaction>) -> Result<Block> {
        let parent = self
            .block(parent_hash)
            .ok_or(ChainError::InvalidBlock(Rejection::NonexistentParent))?;
        let target = self.seal.calculate_appropriate_target(self, parent_hash);
        let timestamp = super::chain::now_secs().max(parent.timestamp);
        Ok(Block::new_at(
            parent.height + 1,
            parent_hash,
            timestamp,
            target,
            false,
            transactions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::GENESIS_PARENT;
    use crate::consensus::ProofOfWork;

    fn trivial_target() -> U512 {
        U512::one() << 256
    }

    fn ledger() -> Ledger {
        Ledger::new(ProofOfWork::default().into())
    }

    fn genesis() -> Block {
        Block::new_at(0, GENESIS_PARENT, 100, trivial_target(), true, vec![])
    }

    fn child(parent: &Block, seal: u64) -> Block {
        let mut block = Block::new_at(parent.height + 1, parent.hash.clone(), parent.timestamp, trivial_target(), false, vec![]);
        block.set_seal_data(U512::from(seal));
        block
    }

    #[test]
    fn test_get_chain_emptychain() {
        assert!(ledger().get_chain_ending_with("test").is_empty());
        assert!(ledger().get_heaviest_chain_tip().is_none());
    }

    #[test]
    fn test_get_chain_genesisonly() {
        let mut ledger = ledger();
        let block = genesis();
        assert!(ledger.add_block(block.clone()));
        assert!(ledger.get_chain_ending_with("test").is_empty());
        assert_eq!(ledger.get_chain_ending_with(&block.hash), vec![block.hash.clone()]);
    }

    #[test]
    fn test_cumulative_weights_and_tip() {
        let mut ledger = ledger();
        let g = genesis();
        let a = child(&g, 0);
        let b = child(&g, 5);
        let c = child(&a, 0);
        for block in [&g, &a, &b, &c] {
            assert!(ledger.add_block(block.clone()));
        }

        assert_eq!(ledger.weight_of(&g.hash), Some(U512::one()));
        assert_eq!(ledger.weight_of(&a.hash), Some(U512::from(2u8)));
        assert_eq!(ledger.weight_of(&b.hash), Some(U512::from(2u8)));
        assert_eq!(ledger.weight_of(&c.hash), Some(U512::from(3u8)));
        assert_eq!(ledger.get_heaviest_chain_tip().unwrap().hash, c.hash);
        assert_eq!(ledger.heaviest_chain(), vec![c.hash.clone(), a.hash.clone(), g.hash.clone()]);

        assert_eq!(ledger.get_heights_with_blocks(), vec![0, 1, 2]);
        assert_eq!(ledger.get_blockhashes_at_height(1), &[a.hash.clone(), b.hash.clone()]);
        assert!(ledger.get_blockhashes_at_height(7).is_empty());
        assert_eq!(ledger.get_all_block_weights().len(), 4);
    }

    #[test]
    fn test_tie_break_prefers_smallest_hash() {
        let mut ledger = ledger();
        let g = genesis();
        let a = child(&g, 1);
        let b = child(&g, 2);
        assert!(ledger.add_block(g));
        assert!(ledger.add_block(a.clone()));
        assert!(ledger.add_block(b.clone()));
        let expected = a.hash.clone().min(b.hash.clone());
        assert_eq!(ledger.get_heaviest_chain_tip().unwrap().hash, expected);
    }

    #[test]
    fn test_duplicate_block_rejected_without_changes() {
        let mut ledger = ledger();
        let g = genesis();
        assert!(ledger.add_block(g.clone()));
        let err = ledger.try_add_block(g.clone()).unwrap_err();
        assert_eq!(err, ChainError::BlockAlreadyExists(g.hash.clone()));
        assert_eq!(ledger.get_blockhashes_at_height(0).len(), 1);
    }

    #[test]
    fn test_rejected_block_leaves_indices_untouched() {
        let mut ledger = ledger();
        let mut orphan = Block::new_at(1, "unknown", 100, trivial_target(), false, vec![]);
        orphan.set_seal_data(U512::one());
        assert_eq!(
            ledger.try_add_block(orphan).unwrap_err(),
            ChainError::InvalidBlock(Rejection::NonexistentParent)
        );
        assert!(ledger.is_empty());
        assert!(ledger.get_heights_with_blocks().is_empty());
        assert!(ledger.get_all_block_weights().is_empty());
    }

    #[test]
    fn test_candidate_block_uses_parent() {
        let mut ledger = ledger();
        let g = genesis();
        assert!(ledger.add_block(g.clone()));
        let candidate = ledger.candidate_block(&g.hash, vec![]).unwrap();
        assert_eq!(candidate.height, 1);
        assert_eq!(candidate.parent_hash, g.hash);
        assert_eq!(candidate.target, ProofOfWork::default().initial_target);
        assert!(candidate.timestamp >= g.timestamp);
        assert!(ledger.candidate_block("missing", vec![]).is_err());
    }

    #[test]
    fn test_blocks_in_order_puts_parents_first() {
        let mut ledger = ledger();
        let g = genesis();
        let a = child(&g, 1);
        let b = child(&g, 2);
        let c = child(&b, 0);
        for block in [&g, &a, &b, &c] {
            assert!(ledger.add_block(block.clone()));
        }
        let order: Vec<(usize, String)> = ledger
            .blocks_in_order()
            .map(|(pos, block)| (pos, block.hash.clone()))
            .collect();
        assert_eq!(
            order,
            vec![(0, g.hash.clone()), (0, a.hash.clone()), (1, b.hash.clone()), (0, c.hash.clone())]
        );
        assert_eq!(ledger.positioned_block(&b.hash).map(|(pos, _)| pos), Some(1));
        assert_eq!(ledger.positioned_block(&c.hash).map(|(_, block)| block), Some(&c));
        assert!(ledger.positioned_block("missing").is_none());
    }
}
