//! Host database facade

use crate::config::HostDbConfig;
use crate::entry::{HostEntry, NetAddress, Weight};
use crate::errors::{HostDbError, HostDbResult};
use crate::scoring::{DefaultScorer, HostScorer};
use crate::sync::{Catalog, SyncState};
use hostdb_chain::{BlockId, ConsensusChange, Ledger};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The HostDb is a database of potential hosts. It assigns a weight to each
/// host based on its advertised terms and hands out weighted random samples.
///
/// All state sits behind one read-write lock: lookups and selection share
/// it, every consensus change holds it exclusively for the whole batch.
pub struct HostDb {
    ledger: Arc<dyn Ledger>,
    catalog: RwLock<Catalog>,
}

impl HostDb {
    /// Create an empty database synchronized to the ledger's genesis block
    pub fn new(ledger: Option<Arc<dyn Ledger>>, config: HostDbConfig) -> HostDbResult<Self> {
        let scorer = Arc::new(DefaultScorer::new(config.scoring.clone()));
        Self::with_scorer(ledger, config, scorer)
    }

    /// Create an empty database with a custom scoring policy
    pub fn with_scorer(
        ledger: Option<Arc<dyn Ledger>>,
        config: HostDbConfig,
        scorer: Arc<dyn HostScorer>,
    ) -> HostDbResult<Self> {
        let ledger = ledger.ok_or(HostDbError::NilLedger)?;
        let genesis = ledger.block_at_height(0).ok_or(HostDbError::MissingGenesis)?;

        info!(
            "HostDB created at genesis {} (max reorg depth {})",
            genesis.id(),
            config.max_reorg_depth
        );

        Ok(Self {
            catalog: RwLock::new(Catalog::new(genesis.id(), config.max_reorg_depth, scorer)),
            ledger,
        })
    }

    /// Up to `n` distinct active hosts, drawn by weight, none in `exclude`
    pub fn random_hosts(&self, n: usize, exclude: &[NetAddress]) -> Vec<HostEntry> {
        let catalog = self.catalog.read();
        catalog
            .tree()
            .select_random(n, exclude)
            .iter()
            .filter_map(|identity| catalog.store().get(identity).cloned())
            .collect()
    }

    /// Snapshot of every host eligible for selection
    pub fn active_hosts(&self) -> Vec<HostEntry> {
        self.catalog.read().store().active().cloned().collect()
    }

    /// Snapshot of every known host
    pub fn all_hosts(&self) -> Vec<HostEntry> {
        self.catalog.read().store().iter().cloned().collect()
    }

    /// Look up a single host
    pub fn host(&self, identity: &NetAddress) -> Option<HostEntry> {
        self.catalog.read().store().get(identity).cloned()
    }

    /// Last block folded into the database
    pub fn cursor(&self) -> BlockId {
        self.catalog.read().cursor()
    }

    pub fn sync_state(&self) -> SyncState {
        self.catalog.read().state()
    }

    /// Sum of the weights of all active hosts
    pub fn total_weight(&self) -> Weight {
        self.catalog.read().tree().total_weight()
    }

    /// Apply one revert/apply batch from the ledger
    pub fn process_consensus_change(&self, change: &ConsensusChange) -> HostDbResult<()> {
        self.catalog.write().process_consensus_change(change)
    }

    /// Feed a liveness result for a host
    pub fn set_host_online(&self, identity: &NetAddress, online: bool) -> HostDbResult<()> {
        self.catalog.write().set_host_online(identity, online)
    }

    /// Catch up with the ledger from the current cursor.
    ///
    /// This is the way back after `DesyncDetected`: the ledger computes the
    /// batch leading from our cursor to its tip, including any blocks we
    /// hold that it has since abandoned.
    pub fn resync(&self) -> HostDbResult<()> {
        let cursor = self.cursor();
        let change = self
            .ledger
            .changes_since(&cursor)
            .ok_or_else(|| HostDbError::DesyncDetected {
                cursor,
                reason: "ledger does not know the cursor block".to_string(),
            })?;
        self.process_consensus_change(&change)
    }

    /// Consume a ledger subscription on a background task.
    ///
    /// The task ends with `Ok(())` when the subscription channel closes. It
    /// ends with the error on the first batch that fails for any reason: a
    /// `DesyncDetected` refusal, or a `Tree` error such as `WeightOverflow`
    /// after which the batch was unwound. The owner of the subscription
    /// decides whether to `resync`, resubscribe or rebuild.
    pub fn spawn_sync(self: Arc<Self>, mut changes: UnboundedReceiver<ConsensusChange>) -> JoinHandle<HostDbResult<()>> {
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                if let Err(e) = self.process_consensus_change(&change) {
                    warn!("HostDB subscription stopped: {}", e);
                    return Err(e);
                }
            }
            info!("HostDB subscription closed at {}", self.cursor());
            Ok(())
        })
    }

    /// Check that the tree and the store agree
    pub fn check_consistency(&self) -> HostDbResult<()> {
        self.catalog.read().check_consistency()
    }
}
