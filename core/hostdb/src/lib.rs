//! Host database for a decentralized storage marketplace
//!
//! Hosts announce themselves on the ledger; the database verifies those
//! announcements, scores the advertised terms and keeps a weighted
//! selection tree of eligible hosts, following the ledger through
//! reorganizations.

pub mod announcement;
pub mod config;
pub mod entry;
pub mod errors;
pub mod hostdb;
pub mod metrics;
pub mod scoring;
pub mod store;
pub mod sync;
pub mod tree;

pub use announcement::{Announcement, ANNOUNCEMENT_PREFIX};
pub use config::{HostDbConfig, ScoringConfig};
pub use entry::{HostEntry, HostPublicKey, HostTerms, NetAddress, Weight};
pub use errors::{AnnouncementError, HostDbError, HostDbResult, TreeError, TreeResult};
pub use hostdb::HostDb;
pub use scoring::{DefaultScorer, HostScorer};
pub use store::{EligibilityChange, HostStore};
pub use sync::{Catalog, SyncState};
pub use tree::WeightedTree;

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        HostDb,
        HostDbConfig,
        HostDbError,
        HostDbResult,
        HostEntry,
        HostTerms,
        NetAddress,
        Announcement,
        SyncState,
    };
}
