//! Ledger synchronization
//!
//! The [`Catalog`] is everything the host database knows: the entry store,
//! the selection tree over active entries, and the cursor naming the last
//! block folded in. It consumes [`ConsensusChange`] batches from the
//! ledger, unwinding reverted blocks newest first and then walking applied
//! blocks oldest first.
//!
//! Every applied block leaves a journal record holding, for each host the
//! block touched, the entry as it was before (or `None` if the block
//! created it). Reverting a block replays its record backwards. Records
//! older than `max_reorg_depth` blocks are dropped.

use crate::announcement::{self, Announcement};
use crate::entry::{HostEntry, NetAddress};
use crate::errors::{AnnouncementError, HostDbError, HostDbResult, TreeError, TreeResult};
use crate::metrics;
use crate::scoring::HostScorer;
use crate::store::{EligibilityChange, HostStore};
use crate::tree::WeightedTree;
use hostdb_chain::{Block, BlockId, ConsensusChange};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Cursor at the latest processed block
    Idle,
    /// Walking the applied half of a batch
    Applying,
    /// Unwinding the reverted half of a batch
    Reverting,
}

/// Undo record of one applied block
#[derive(Debug, Clone)]
struct BlockJournal {
    block_id: BlockId,
    parent_id: BlockId,
    height: u64,
    /// Pre-images in the order the block produced them
    changes: Vec<(NetAddress, Option<HostEntry>)>,
}

/// Host entries, selection tree and ledger cursor, kept in step
pub struct Catalog {
    store: HostStore,
    tree: WeightedTree<NetAddress>,
    cursor: BlockId,
    journal: VecDeque<BlockJournal>,
    max_reorg_depth: usize,
    state: SyncState,
}

impl Catalog {
    /// Create an empty catalog synchronized to `genesis`
    pub fn new(genesis: BlockId, max_reorg_depth: usize, scorer: Arc<dyn HostScorer>) -> Self {
        Self {
            store: HostStore::new(scorer),
            tree: WeightedTree::new(),
            cursor: genesis,
            journal: VecDeque::with_capacity(max_reorg_depth.min(1024)),
            max_reorg_depth,
            state: SyncState::Idle,
        }
    }

    pub fn store(&self) -> &HostStore {
        &self.store
    }

    pub fn tree(&self) -> &WeightedTree<NetAddress> {
        &self.tree
    }

    /// Last fully processed block
    pub fn cursor(&self) -> BlockId {
        self.cursor
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Number of blocks that can currently be reverted
    pub fn journal_depth(&self) -> usize {
        self.journal.len()
    }

    /// Process one revert/apply batch atomically.
    ///
    /// A batch that does not link to the cursor is refused with
    /// `DesyncDetected` before anything changes. If a later step fails, the
    /// blocks this batch applied are unwound and the blocks it reverted are
    /// applied again, so the catalog is back where it started. Should that
    /// unwinding fail too, the catalog is left partially unwound and the
    /// error is `TreeError::Inconsistent`.
    pub fn process_consensus_change(&mut self, change: &ConsensusChange) -> HostDbResult<()> {
        if let Err(e) = self.check_linkage(change) {
            metrics::record_desync();
            warn!("Refusing consensus change: {}", e);
            return Err(e);
        }

        let mut reverted = 0;
        let mut applied = 0;
        let mut outcome = Ok(());

        self.state = SyncState::Reverting;
        for block in change.reverted_blocks.iter().rev() {
            if let Err(e) = self.revert_block(block) {
                outcome = Err(e);
                break;
            }
            reverted += 1;
        }

        if outcome.is_ok() {
            self.state = SyncState::Applying;
            for block in &change.applied_blocks {
                if let Err(e) = self.apply_block(block) {
                    outcome = Err(e);
                    break;
                }
                applied += 1;
            }
        }

        if let Err(e) = outcome {
            error!(
                "Consensus change failed after reverting {} and applying {} blocks: {}",
                reverted, applied, e
            );
            let unwound = self.unwind(change, reverted, applied);
            self.state = SyncState::Idle;
            if let Err(unwind_err) = unwound {
                metrics::update_catalog(self.store.len(), self.tree.len(), self.tree.total_weight());
                return Err(TreeError::Inconsistent(format!(
                    "batch failed ({}) and could not be unwound ({}); catalog needs a rebuild",
                    e, unwind_err
                ))
                .into());
            }
            return Err(e);
        }

        while self.journal.len() > self.max_reorg_depth {
            self.journal.pop_front();
        }
        self.state = SyncState::Idle;
        metrics::update_catalog(self.store.len(), self.tree.len(), self.tree.total_weight());

        if !change.is_empty() {
            info!(
                "HostDB synced to {} (reverted {}, applied {}, {} active of {} hosts)",
                self.cursor,
                reverted,
                applied,
                self.tree.len(),
                self.store.len()
            );
        }
        Ok(())
    }

    /// Mark a host as reachable or not. Offline hosts stay in the store but
    /// leave the selection tree.
    pub fn set_host_online(&mut self, identity: &NetAddress, online: bool) -> HostDbResult<()> {
        let previous = self
            .store
            .get(identity)
            .cloned()
            .ok_or_else(|| HostDbError::HostNotFound(identity.to_string()))?;
        if previous.online == online {
            return Ok(());
        }

        let mut entry = previous.clone();
        entry.online = online;
        entry.active = entry.selection_weight() > 0;
        let change = self.store.restore(entry);
        if let Err(e) = self.sync_tree(identity, change) {
            self.store.restore(previous);
            return Err(e.into());
        }

        debug!("Host {} is now {}", identity, if online { "online" } else { "offline" });
        metrics::update_catalog(self.store.len(), self.tree.len(), self.tree.total_weight());
        Ok(())
    }

    /// Verify the tree's invariants and that its keys are exactly the
    /// active entries of the store, with matching weights.
    pub fn check_consistency(&self) -> HostDbResult<()> {
        self.tree.check_invariants()?;

        let active: HashSet<&NetAddress> = self.store.active().map(|e| &e.identity).collect();
        let in_tree: HashSet<&NetAddress> = self.tree.keys().collect();
        if active != in_tree {
            return Err(TreeError::Inconsistent(format!(
                "{} active entries, {} tree leaves",
                active.len(),
                in_tree.len()
            ))
            .into());
        }
        for entry in self.store.active() {
            if self.tree.weight_of(&entry.identity) != Some(entry.selection_weight()) {
                return Err(TreeError::Inconsistent(format!(
                    "weight of {} differs between store and tree",
                    entry.identity
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Dry run of the batch against the cursor and the journal
    fn check_linkage(&self, change: &ConsensusChange) -> HostDbResult<()> {
        let desync = |reason: String| HostDbError::DesyncDetected {
            cursor: self.cursor,
            reason,
        };

        let mut cursor = self.cursor;
        let mut depth = self.journal.len();
        for block in change.reverted_blocks.iter().rev() {
            let id = block.id();
            if id != cursor {
                return Err(desync(format!("reverted block {} is not the current block {}", id, cursor)));
            }
            if depth == 0 {
                return Err(desync(format!(
                    "revert of block {} at height {} reaches past the {} retained blocks",
                    id,
                    block.height,
                    self.journal.len()
                )));
            }
            if self.journal[depth - 1].block_id != id {
                return Err(desync(format!("no undo record for reverted block {}", id)));
            }
            depth -= 1;
            cursor = block.parent_id;
        }

        for block in &change.applied_blocks {
            if block.parent_id != cursor {
                return Err(desync(format!(
                    "block at height {} builds on {}, expected {}",
                    block.height, block.parent_id, cursor
                )));
            }
            cursor = block.id();
        }
        Ok(())
    }

    fn apply_block(&mut self, block: &Block) -> HostDbResult<()> {
        let mut record = BlockJournal {
            block_id: block.id(),
            parent_id: block.parent_id,
            height: block.height,
            changes: Vec::new(),
        };

        for tx in &block.transactions {
            for announcement in announcement::extract(tx) {
                if let Err(e) = self.apply_announcement(announcement, block.height, &mut record.changes) {
                    // Leave no trace of the half-applied block
                    self.undo_changes(std::mem::take(&mut record.changes))?;
                    return Err(e);
                }
            }
        }

        debug!(
            "Applied block {} at height {} ({} host changes)",
            record.block_id,
            record.height,
            record.changes.len()
        );
        self.cursor = record.block_id;
        self.journal.push_back(record);
        metrics::record_block("applied");
        Ok(())
    }

    fn revert_block(&mut self, block: &Block) -> HostDbResult<()> {
        let id = block.id();
        let record = match self.journal.pop_back() {
            Some(record) if record.block_id == id => record,
            other => {
                if let Some(record) = other {
                    self.journal.push_back(record);
                }
                return Err(HostDbError::DesyncDetected {
                    cursor: self.cursor,
                    reason: format!("no undo record for reverted block {}", id),
                });
            }
        };

        debug!(
            "Reverting block {} at height {} ({} host changes)",
            record.block_id,
            record.height,
            record.changes.len()
        );
        self.undo_changes(record.changes)?;
        self.cursor = record.parent_id;
        metrics::record_block("reverted");
        Ok(())
    }

    fn apply_announcement(
        &mut self,
        announcement: Announcement,
        height: u64,
        changes: &mut Vec<(NetAddress, Option<HostEntry>)>,
    ) -> HostDbResult<()> {
        let previous = self.store.get(&announcement.identity).cloned();
        let entry = match &previous {
            Some(prev) if prev.public_key != announcement.public_key => {
                let refused = AnnouncementError::PublicKeyMismatch(announcement.identity.to_string());
                warn!("Ignoring announcement: {}", refused);
                metrics::record_announcement("key_mismatch");
                return Ok(());
            }
            Some(prev) => HostEntry {
                terms: announcement.terms,
                last_announced_height: height,
                ..prev.clone()
            },
            None => HostEntry::announced(announcement.identity, announcement.public_key, announcement.terms, height),
        };

        let identity = entry.identity.clone();
        let change = self.store.upsert(entry);
        if let Err(e) = self.sync_tree(&identity, change) {
            match previous {
                Some(prev) => {
                    self.store.restore(prev);
                }
                None => {
                    self.store.remove(&identity);
                }
            }
            return Err(e.into());
        }

        debug!("Host {} announced at height {} ({:?})", identity, height, change);
        metrics::record_announcement("accepted");
        changes.push((identity, previous));
        Ok(())
    }

    /// Replay pre-images newest first
    fn undo_changes(&mut self, changes: Vec<(NetAddress, Option<HostEntry>)>) -> HostDbResult<()> {
        for (identity, previous) in changes.into_iter().rev() {
            match previous {
                None => {
                    let was_active = self.store.remove(&identity).map(|e| e.active).unwrap_or(false);
                    if was_active {
                        self.tree.remove(&identity)?;
                    }
                }
                Some(mut prev) => {
                    // Liveness comes from the network, not the ledger
                    if let Some(current) = self.store.get(&identity) {
                        prev.online = current.online;
                    }
                    prev.active = prev.selection_weight() > 0;
                    let change = self.store.restore(prev);
                    self.sync_tree(&identity, change)?;
                }
            }
        }
        Ok(())
    }

    /// Bring the tree in line with the stored entry for `identity`
    fn sync_tree(&mut self, identity: &NetAddress, change: EligibilityChange) -> TreeResult<()> {
        let (active, weight) = self
            .store
            .get(identity)
            .map(|e| (e.active, e.selection_weight()))
            .unwrap_or((false, 0));

        match change {
            EligibilityChange::NewlyEligible => self.tree.insert(identity.clone(), weight),
            EligibilityChange::NowIneligible => self.tree.remove(identity).map(|_| ()),
            EligibilityChange::Unchanged if active => self.tree.reweight(identity, weight),
            EligibilityChange::Unchanged => Ok(()),
        }
    }

    /// Undo the completed part of a failed batch
    fn unwind(&mut self, change: &ConsensusChange, reverted: usize, applied: usize) -> HostDbResult<()> {
        for block in change.applied_blocks[..applied].iter().rev() {
            if let Err(e) = self.revert_block(block) {
                error!("Failed to unwind applied block at height {}: {}", block.height, e);
                return Err(e);
            }
        }

        let total = change.reverted_blocks.len();
        for block in &change.reverted_blocks[total - reverted..] {
            if let Err(e) = self.apply_block(block) {
                error!("Failed to reapply reverted block at height {}: {}", block.height, e);
                return Err(e);
            }
        }
        Ok(())
    }
}
