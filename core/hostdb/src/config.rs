//! Configuration for the host database

use serde::{Deserialize, Serialize};

/// Host database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDbConfig {
    /// Number of applied blocks whose undo records are retained. Reverting
    /// deeper than this is reported as a desync.
    pub max_reorg_depth: usize,

    /// Scoring parameters
    pub scoring: ScoringConfig,
}

impl Default for HostDbConfig {
    fn default() -> Self {
        let max_reorg_depth = std::env::var("HOSTDB_MAX_REORG_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(144); // ~1 day of 10 minute blocks

        Self {
            max_reorg_depth,
            scoring: ScoringConfig::default(),
        }
    }
}

/// Parameters of the default scoring policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Hosts offering less storage than this (bytes) are ineligible
    pub min_total_storage: u64,

    /// Multiplier applied before dividing by price
    pub weight_scale: u64,

    /// Upper bound of a single host's weight
    pub max_host_weight: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let min_total_storage = std::env::var("HOSTDB_MIN_TOTAL_STORAGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1 << 30); // 1 GiB

        let max_host_weight = std::env::var("HOSTDB_MAX_HOST_WEIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|w: &u64| *w > 0)
            .unwrap_or(1 << 40); // leaves room for 2^24 hosts in a u64 sum

        Self {
            min_total_storage,
            weight_scale: 1_000_000,
            max_host_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde() {
        let config = HostDbConfig {
            max_reorg_depth: 6,
            scoring: ScoringConfig {
                min_total_storage: 1,
                weight_scale: 10,
                max_host_weight: 100,
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: HostDbConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_weight_bound_is_positive() {
        assert!(ScoringConfig::default().max_host_weight > 0);
    }
}
