//! Host entry store

use crate::entry::{HostEntry, NetAddress};
use crate::scoring::HostScorer;
use std::collections::HashMap;
use std::sync::Arc;

/// How an upsert changed an entry's eligibility for selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityChange {
    /// Entry was absent or inactive and is now active
    NewlyEligible,
    /// Entry was active and no longer is
    NowIneligible,
    /// Active flag did not flip (weight may still have changed)
    Unchanged,
}

/// Every known host, selectable or not, keyed by identity.
///
/// The store only scores and records entries; keeping the selection tree
/// in step is the caller's job.
pub struct HostStore {
    entries: HashMap<NetAddress, HostEntry>,
    scorer: Arc<dyn HostScorer>,
}

impl HostStore {
    /// Create new store
    pub fn new(scorer: Arc<dyn HostScorer>) -> Self {
        Self {
            entries: HashMap::new(),
            scorer,
        }
    }

    /// Score `entry`, then insert or replace it
    pub fn upsert(&mut self, mut entry: HostEntry) -> EligibilityChange {
        entry.weight = self.scorer.score(&entry.terms);
        entry.active = entry.selection_weight() > 0;
        self.put(entry)
    }

    /// Reinstate an exact snapshot, without rescoring
    pub fn restore(&mut self, entry: HostEntry) -> EligibilityChange {
        self.put(entry)
    }

    pub fn get(&self, identity: &NetAddress) -> Option<&HostEntry> {
        self.entries.get(identity)
    }

    /// Delete the record entirely
    pub fn remove(&mut self, identity: &NetAddress) -> Option<HostEntry> {
        self.entries.remove(identity)
    }

    /// Number of known hosts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of hosts currently eligible for selection
    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.active).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostEntry> {
        self.entries.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &HostEntry> {
        self.entries.values().filter(|e| e.active)
    }

    fn put(&mut self, entry: HostEntry) -> EligibilityChange {
        let was_active = self
            .entries
            .get(&entry.identity)
            .map(|e| e.active)
            .unwrap_or(false);
        let is_active = entry.active;
        self.entries.insert(entry.identity.clone(), entry);

        match (was_active, is_active) {
            (false, true) => EligibilityChange::NewlyEligible,
            (true, false) => EligibilityChange::NowIneligible,
            _ => EligibilityChange::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{HostPublicKey, HostTerms, Weight};

    /// Scores terms by price alone
    struct PriceScorer;

    impl HostScorer for PriceScorer {
        fn score(&self, terms: &HostTerms) -> Weight {
            terms.price
        }
    }

    fn entry(address: &str, price: u64) -> HostEntry {
        let terms = HostTerms { price, ..Default::default() };
        HostEntry::announced(NetAddress::from(address), HostPublicKey([1; 32]), terms, 1)
    }

    #[test]
    fn test_upsert_reports_eligibility_transitions() {
        let mut store = HostStore::new(Arc::new(PriceScorer));

        assert_eq!(store.upsert(entry("a:1", 0)), EligibilityChange::Unchanged);
        assert!(!store.get(&"a:1".into()).unwrap().active);

        assert_eq!(store.upsert(entry("a:1", 5)), EligibilityChange::NewlyEligible);
        assert_eq!(store.get(&"a:1".into()).unwrap().weight, 5);

        assert_eq!(store.upsert(entry("a:1", 7)), EligibilityChange::Unchanged);
        assert_eq!(store.get(&"a:1".into()).unwrap().weight, 7);

        assert_eq!(store.upsert(entry("a:1", 0)), EligibilityChange::NowIneligible);
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_offline_entries_are_inactive() {
        let mut store = HostStore::new(Arc::new(PriceScorer));
        let mut offline = entry("b:1", 9);
        offline.online = false;

        assert_eq!(store.upsert(offline), EligibilityChange::Unchanged);
        let stored = store.get(&"b:1".into()).unwrap();
        assert_eq!(stored.weight, 9);
        assert!(!stored.active);
    }

    #[test]
    fn test_restore_keeps_snapshot_verbatim() {
        let mut store = HostStore::new(Arc::new(PriceScorer));
        store.upsert(entry("c:1", 3));
        let snapshot = store.get(&"c:1".into()).unwrap().clone();

        store.upsert(entry("c:1", 8));
        assert_eq!(store.restore(snapshot.clone()), EligibilityChange::Unchanged);
        assert_eq!(store.get(&"c:1".into()), Some(&snapshot));

        assert_eq!(store.remove(&"c:1".into()), Some(snapshot));
        assert!(store.is_empty());
    }
}
