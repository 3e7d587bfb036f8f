//! Host entries and the terms hosts advertise

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selection weight of a host
pub type Weight = u64;

/// Network address a host is reachable at, the unique host identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetAddress(pub String);

impl NetAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetAddress {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// Ed25519 verifying key bytes of a host
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPublicKey(pub [u8; 32]);

impl fmt::Debug for HostPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostPublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl From<&ed25519_dalek::VerifyingKey> for HostPublicKey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

/// Storage terms advertised in an announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HostTerms {
    /// Total storage offered, in bytes
    pub total_storage: u64,

    /// Largest file accepted, in bytes
    pub max_filesize: u64,

    /// Shortest contract accepted, in blocks
    pub min_duration: u64,

    /// Longest contract accepted, in blocks
    pub max_duration: u64,

    /// Price per byte per block
    pub price: u64,

    /// Collateral offered per byte per block
    pub collateral: u64,
}

/// The database's record of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub identity: NetAddress,
    pub public_key: HostPublicKey,
    pub terms: HostTerms,

    /// Height of the block holding the first announcement
    pub first_seen_height: u64,

    /// Height of the block holding the latest announcement
    pub last_announced_height: u64,

    /// Score of `terms`, zero when the terms are invalid
    pub weight: Weight,

    /// Liveness as last reported by the scanner
    pub online: bool,

    /// Whether the entry currently sits in the selection tree
    pub active: bool,
}

impl HostEntry {
    /// Entry for a host first announced at `height`. Weight and activity are
    /// assigned by the store.
    pub fn announced(identity: NetAddress, public_key: HostPublicKey, terms: HostTerms, height: u64) -> Self {
        Self {
            identity,
            public_key,
            terms,
            first_seen_height: height,
            last_announced_height: height,
            weight: 0,
            online: true,
            active: false,
        }
    }

    /// Weight the entry contributes to the selection tree
    pub fn selection_weight(&self) -> Weight {
        if self.online {
            self.weight
        } else {
            0
        }
    }
}
