//! In-memory reference ledger

use crate::{
    block::{Block, BlockId, ConsensusChange},
    errors::{ChainError, ChainResult},
    ledger::Ledger,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

#[derive(Default)]
struct ChainState {
    /// Every block ever accepted, including ones reorganized away
    blocks: HashMap<BlockId, Block>,

    /// Current chain, index == height
    chain: Vec<BlockId>,
}

impl ChainState {
    fn tip(&self) -> Option<&Block> {
        self.chain.last().and_then(|id| self.blocks.get(id))
    }

    fn is_on_chain(&self, id: &BlockId) -> bool {
        self.blocks
            .get(id)
            .map(|block| self.chain.get(block.height as usize) == Some(id))
            .unwrap_or(false)
    }

    /// Check that `blocks` form a chain extending `parent`
    fn check_extends(parent: Option<&Block>, blocks: &[Block]) -> ChainResult<()> {
        let (mut expected_id, mut expected_height) = match parent {
            Some(parent) => (parent.id(), parent.height + 1),
            None => (BlockId::default(), 0),
        };

        for block in blocks {
            if block.height != expected_height {
                return Err(ChainError::InvalidHeight {
                    expected: expected_height,
                    got: block.height,
                });
            }
            if block.parent_id != expected_id {
                return Err(ChainError::InvalidParent {
                    height: block.height,
                    expected: expected_id,
                    got: block.parent_id,
                });
            }
            expected_id = block.id();
            expected_height += 1;
        }
        Ok(())
    }

    fn append(&mut self, block: Block) {
        let id = block.id();
        self.chain.push(id);
        self.blocks.insert(id, block);
    }
}

/// Ledger kept entirely in memory.
///
/// Every accepted block or reorganization is broadcast as a
/// [`ConsensusChange`] to all live subscribers.
pub struct MemoryLedger {
    state: RwLock<ChainState>,
    subscribers: Mutex<Vec<UnboundedSender<ConsensusChange>>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Create an empty ledger (no genesis)
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ChainState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Create a ledger holding only `genesis`
    pub fn with_genesis(genesis: Block) -> ChainResult<Self> {
        let ledger = Self::new();
        ledger.push_block(genesis)?;
        Ok(ledger)
    }

    /// Current tip
    pub fn tip(&self) -> Option<Block> {
        self.state.read().tip().cloned()
    }

    /// Register a subscriber. Changes made after this call are delivered in
    /// order; dropping the receiver ends the subscription.
    pub fn subscribe(&self) -> UnboundedReceiver<ConsensusChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Drop all subscriber channels, closing every subscription
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().clear();
    }

    /// Append a block to the tip
    pub fn push_block(&self, block: Block) -> ChainResult<ConsensusChange> {
        let mut state = self.state.write();
        ChainState::check_extends(state.tip(), std::slice::from_ref(&block))?;
        debug!("Ledger: appending block {} at height {}", block.id(), block.height);
        state.append(block.clone());

        // Broadcast under the state lock so delivery order is chain order
        let change = ConsensusChange::apply(vec![block]);
        self.broadcast(&change);
        Ok(change)
    }

    /// Replace every block above `fork_height` with `blocks`.
    ///
    /// `blocks` must extend the block at `fork_height`. The returned change
    /// lists the abandoned blocks and the new branch, both oldest first.
    pub fn reorg(&self, fork_height: u64, blocks: Vec<Block>) -> ChainResult<ConsensusChange> {
        let mut state = self.state.write();
        let tip_height = state.tip().map(|b| b.height).ok_or(ChainError::EmptyChain)?;
        if fork_height > tip_height {
            return Err(ChainError::ForkAboveTip { fork_height, tip_height });
        }

        let fork_id = state.chain[fork_height as usize];
        ChainState::check_extends(state.blocks.get(&fork_id), &blocks)?;

        let reverted_ids = state.chain.split_off(fork_height as usize + 1);
        let reverted_blocks: Vec<Block> = reverted_ids
            .iter()
            .filter_map(|id| state.blocks.get(id).cloned())
            .collect();
        for block in &blocks {
            state.append(block.clone());
        }

        info!(
            "Ledger: reorganized at height {} (reverted {}, applied {})",
            fork_height,
            reverted_blocks.len(),
            blocks.len()
        );

        let change = ConsensusChange {
            reverted_blocks,
            applied_blocks: blocks,
        };
        self.broadcast(&change);
        Ok(change)
    }

    /// Must be called with the state write lock held
    fn broadcast(&self, change: &ConsensusChange) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl Ledger for MemoryLedger {
    fn block_at_height(&self, height: u64) -> Option<Block> {
        let state = self.state.read();
        state
            .chain
            .get(height as usize)
            .and_then(|id| state.blocks.get(id))
            .cloned()
    }

    fn block(&self, id: &BlockId) -> Option<Block> {
        self.state.read().blocks.get(id).cloned()
    }

    fn height(&self) -> Option<u64> {
        self.state.read().tip().map(|b| b.height)
    }

    fn changes_since(&self, id: &BlockId) -> Option<ConsensusChange> {
        let state = self.state.read();

        // Walk back from `id` to the first ancestor on the current chain
        let mut reverted_blocks = Vec::new();
        let mut cursor = *id;
        while !state.is_on_chain(&cursor) {
            let block = state.blocks.get(&cursor)?;
            cursor = block.parent_id;
            reverted_blocks.push(block.clone());
        }
        reverted_blocks.reverse();

        let ancestor_height = state.blocks.get(&cursor)?.height as usize;
        let applied_blocks = state.chain[ancestor_height + 1..]
            .iter()
            .filter_map(|id| state.blocks.get(id).cloned())
            .collect();

        Some(ConsensusChange {
            reverted_blocks,
            applied_blocks,
        })
    }
}
