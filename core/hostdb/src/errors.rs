//! Error types for host database operations

use hostdb_chain::BlockId;
use thiserror::Error;

/// Host database errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostDbError {
    /// Constructed without a ledger
    #[error("hostdb can't use a nil ledger")]
    NilLedger,

    /// Ledger has no block at height zero
    #[error("ledger doesn't have a genesis block")]
    MissingGenesis,

    /// Change batch does not link to the synchronized state
    #[error("Desync detected at cursor {cursor}: {reason}")]
    DesyncDetected { cursor: BlockId, reason: String },

    /// Host is not known
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Selection tree failure
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

/// Selection tree errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Identity is not in the tree
    #[error("Not found in tree: {0}")]
    NotFound(String),

    /// Identity is already in the tree
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// Ineligible entries are never inserted
    #[error("Zero weight for {0}")]
    ZeroWeight(String),

    /// Total weight would exceed the representable range
    #[error("Weight overflow: total {total} + {added}")]
    WeightOverflow { total: u64, added: u64 },

    /// Structural invariant violated
    #[error("Inconsistent tree: {0}")]
    Inconsistent(String),
}

/// Announcement extraction errors. None of these abort a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementError {
    /// Payload is not tagged as an announcement
    #[error("Not an announcement")]
    NotAnAnnouncement,

    /// Tagged payload whose body does not decode
    #[error("Malformed announcement: {0}")]
    Malformed(String),

    /// Embedded public key is not a valid ed25519 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature does not verify against the embedded key
    #[error("Invalid signature")]
    InvalidSignature,

    /// Identity is held under a different key
    #[error("Public key mismatch for {0}")]
    PublicKeyMismatch(String),
}

/// Result type for host database operations
pub type HostDbResult<T> = Result<T, HostDbError>;

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
