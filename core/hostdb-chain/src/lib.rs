//! Ledger collaborator interface for the host database
//!
//! This crate defines the block and transaction shapes the host database
//! consumes, the ordered revert/apply batches a ledger delivers, and an
//! in-memory reference ledger used to drive the database in tests and
//! embedded setups.

pub mod block;
pub mod errors;
pub mod ledger;
pub mod memory;

pub use block::{Block, BlockId, ConsensusChange, Transaction, TxId};
pub use errors::{ChainError, ChainResult};
pub use ledger::Ledger;
pub use memory::MemoryLedger;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        Block, BlockId, ConsensusChange, Transaction,
        ChainError, ChainResult,
        Ledger, MemoryLedger,
    };
}
