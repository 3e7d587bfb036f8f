//! Error types for the ledger interface

use crate::block::BlockId;
use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Block does not extend the expected parent
    #[error("Invalid parent for block at height {height}: expected {expected}, got {got}")]
    InvalidParent { height: u64, expected: BlockId, got: BlockId },

    /// Block height does not follow its parent
    #[error("Invalid height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },

    /// Reorganization point is not on the current chain
    #[error("Fork height {fork_height} is above the chain tip {tip_height}")]
    ForkAboveTip { fork_height: u64, tip_height: u64 },

    /// Ledger holds no blocks yet
    #[error("Ledger is empty")]
    EmptyChain,
}

/// Result type for ledger operations
pub type ChainResult<T> = Result<T, ChainError>;
