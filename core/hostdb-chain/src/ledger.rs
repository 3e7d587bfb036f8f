//! Ledger trait consumed by the host database

use crate::block::{Block, BlockId, ConsensusChange};

/// Read access to a ledger's current chain.
///
/// Implementations are expected to be internally synchronized; the host
/// database only calls these outside its own catalog lock or during
/// construction.
pub trait Ledger: Send + Sync {
    /// Block on the current chain at `height`
    fn block_at_height(&self, height: u64) -> Option<Block>;

    /// Any block the ledger has seen, on the current chain or not
    fn block(&self, id: &BlockId) -> Option<Block>;

    /// Height of the current tip, `None` for an empty ledger
    fn height(&self) -> Option<u64>;

    /// Batch that moves a consumer whose last processed block is `id` onto
    /// the current tip. `None` when `id` is unknown to the ledger.
    fn changes_since(&self, id: &BlockId) -> Option<ConsensusChange>;
}
