//! Host scoring

use crate::config::ScoringConfig;
use crate::entry::{HostTerms, Weight};

/// Maps advertised terms to a selection weight. Zero means ineligible.
pub trait HostScorer: Send + Sync {
    /// Calculate weight for a set of terms
    fn score(&self, terms: &HostTerms) -> Weight;
}

/// Default scorer: cheaper hosts and hosts putting up more collateral
/// score higher.
#[derive(Debug, Clone)]
pub struct DefaultScorer {
    config: ScoringConfig,
}

impl DefaultScorer {
    /// Create new scorer
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Whether the terms describe a host a renter could contract with
    pub fn terms_valid(&self, terms: &HostTerms) -> bool {
        terms.total_storage >= self.config.min_total_storage
            && terms.price > 0
            && terms.max_duration > 0
            && terms.max_duration >= terms.min_duration
    }
}

impl HostScorer for DefaultScorer {
    fn score(&self, terms: &HostTerms) -> Weight {
        if !self.terms_valid(terms) {
            return 0;
        }

        let raw = (terms.collateral as u128 + 1) * self.config.weight_scale as u128 / terms.price as u128;
        raw.clamp(1, self.config.max_host_weight as u128) as Weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> DefaultScorer {
        DefaultScorer::new(ScoringConfig {
            min_total_storage: 1_000,
            weight_scale: 1_000,
            max_host_weight: 1_000_000,
        })
    }

    fn terms(price: u64, collateral: u64) -> HostTerms {
        HostTerms {
            total_storage: 10_000,
            max_filesize: 1_000,
            min_duration: 10,
            max_duration: 100,
            price,
            collateral,
        }
    }

    #[test]
    fn test_invalid_terms_score_zero() {
        let scorer = scorer();
        assert_eq!(scorer.score(&terms(0, 5)), 0);
        assert_eq!(scorer.score(&HostTerms { total_storage: 999, ..terms(1, 0) }), 0);
        assert_eq!(scorer.score(&HostTerms { max_duration: 0, min_duration: 0, ..terms(1, 0) }), 0);
        assert_eq!(scorer.score(&HostTerms { min_duration: 101, ..terms(1, 0) }), 0);
    }

    #[test]
    fn test_score_is_monotonic() {
        let scorer = scorer();
        assert_eq!(scorer.score(&terms(10, 9)), 1_000);
        assert!(scorer.score(&terms(5, 9)) > scorer.score(&terms(10, 9)));
        assert!(scorer.score(&terms(10, 19)) > scorer.score(&terms(10, 9)));
    }

    #[test]
    fn test_score_is_bounded_and_positive() {
        let scorer = scorer();
        // Huge price still yields a positive weight
        assert_eq!(scorer.score(&terms(u64::MAX, 0)), 1);
        // Huge collateral cannot exceed the cap or overflow
        assert_eq!(scorer.score(&terms(1, u64::MAX)), 1_000_000);
    }
}
