//! Block structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block identifier (blake3 digest of the block header and transaction ids)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

/// Transaction identifier
pub type TxId = [u8; 32];

impl BlockId {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell blocks apart in logs
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self)
    }
}

/// Transaction as seen by the host database: only the arbitrary data
/// section matters, everything else is the ledger's business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Arbitrary payloads attached to the transaction
    pub arbitrary_data: Vec<Vec<u8>>,

    /// Sender-chosen nonce, keeps otherwise identical transactions distinct
    pub nonce: u64,
}

impl Transaction {
    /// Create a transaction carrying the given payloads
    pub fn new(arbitrary_data: Vec<Vec<u8>>, nonce: u64) -> Self {
        Self { arbitrary_data, nonce }
    }

    /// Calculate transaction id
    pub fn id(&self) -> TxId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.nonce.to_le_bytes());
        hasher.update(&(self.arbitrary_data.len() as u64).to_le_bytes());
        for data in &self.arbitrary_data {
            hasher.update(&(data.len() as u64).to_le_bytes());
            hasher.update(data);
        }
        *hasher.finalize().as_bytes()
    }
}

/// Block in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Id of the parent block (all zeroes for genesis)
    pub parent_id: BlockId,

    /// Block height
    pub height: u64,

    /// Timestamp
    pub timestamp: u64,

    /// Transactions in this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create genesis block
    pub fn genesis(timestamp: u64) -> Self {
        Self {
            parent_id: BlockId::default(),
            height: 0,
            timestamp,
            transactions: vec![],
        }
    }

    /// Create a block extending `parent`
    pub fn child_of(parent: &Block, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            parent_id: parent.id(),
            height: parent.height + 1,
            timestamp,
            transactions,
        }
    }

    /// Calculate block id
    pub fn id(&self) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.parent_id.as_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        for tx in &self.transactions {
            hasher.update(&tx.id());
        }
        BlockId(*hasher.finalize().as_bytes())
    }
}

/// Ordered change notification delivered by the ledger.
///
/// Both lists are oldest-first. Consumers unwind `reverted_blocks` newest
/// first, then walk `applied_blocks` in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsensusChange {
    /// Blocks removed from the current chain
    pub reverted_blocks: Vec<Block>,

    /// Blocks added to the current chain
    pub applied_blocks: Vec<Block>,
}

impl ConsensusChange {
    /// Change that only appends blocks
    pub fn apply(blocks: Vec<Block>) -> Self {
        Self {
            reverted_blocks: vec![],
            applied_blocks: blocks,
        }
    }

    /// Whether the change carries no blocks at all
    pub fn is_empty(&self) -> bool {
        self.reverted_blocks.is_empty() && self.applied_blocks.is_empty()
    }

    /// Number of blocks unwound before the new branch is walked
    pub fn reorg_depth(&self) -> usize {
        self.reverted_blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_depends_on_transactions() {
        let genesis = Block::genesis(1_700_000_000);
        let a = Block::child_of(&genesis, 1_700_000_010, vec![Transaction::new(vec![b"a".to_vec()], 0)]);
        let b = Block::child_of(&genesis, 1_700_000_010, vec![Transaction::new(vec![b"b".to_vec()], 0)]);

        assert_eq!(a.parent_id, genesis.id());
        assert_eq!(a.height, 1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_transaction_id_frames_payloads() {
        // ["ab"] and ["a", "b"] must not collide
        let joined = Transaction::new(vec![b"ab".to_vec()], 0);
        let split = Transaction::new(vec![b"a".to_vec(), b"b".to_vec()], 0);
        assert_ne!(joined.id(), split.id());
    }

    #[test]
    fn test_block_id_display_is_short_hex() {
        let id = Block::genesis(0).id();
        assert_eq!(id.to_string().len(), 16);
        assert!(id.to_hex().starts_with(&id.to_string()));
    }
}
