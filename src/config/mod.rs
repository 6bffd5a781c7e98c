use std::time::Duration;

use crate::storage::index::IndexType;

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

pub struct DbConfig {
    pub chunk_capacity: usize,
    pub tuner: TunerConfig,
}

impl DbConfig {
    pub fn new() -> DbConfig {
        DbConfig {
            chunk_capacity: env_parsed("CHERTDB_CHUNK_CAPACITY").unwrap_or(65_536),
            tuner: TunerConfig::from_env(),
        }
    }
}

/// Options of the index tuning control loop.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// Hard upper bound on total index memory after a pass, in MiB.
    pub memory_budget_mib: f32,
    /// Cap on index creations emitted per pass. None means unbounded.
    pub max_new_indexes_per_pass: Option<u32>,
    /// Index type proposed for candidates that do not exist yet.
    pub default_index_type: IndexType,
    /// Break saved-work ties between choices by evaluator confidence.
    pub confidence_tiebreak: bool,
    /// Soft time budget for the cache walk. Exceeding it truncates the
    /// traversal; the pass continues with the records gathered so far.
    pub cache_walk_budget: Option<Duration>,
    /// Maintenance penalty per MiB of index memory, subtracted from a
    /// choice's saved work. Zero keeps cold indexes until budget pressure.
    pub maintenance_weight: f32,
}

impl Default for TunerConfig {
    fn default() -> TunerConfig {
        TunerConfig {
            memory_budget_mib: 100.0,
            max_new_indexes_per_pass: None,
            default_index_type: IndexType::GroupKey,
            confidence_tiebreak: true,
            cache_walk_budget: None,
            maintenance_weight: 0.0,
        }
    }
}

impl TunerConfig {
    pub fn from_env() -> TunerConfig {
        let defaults = TunerConfig::default();
        TunerConfig {
            memory_budget_mib: env_parsed("CHERTDB_MEMORY_BUDGET_MIB")
                .unwrap_or(defaults.memory_budget_mib),
            max_new_indexes_per_pass: env_parsed("CHERTDB_MAX_NEW_INDEXES"),
            default_index_type: env_parsed("CHERTDB_DEFAULT_INDEX_TYPE")
                .unwrap_or(defaults.default_index_type),
            confidence_tiebreak: env_parsed("CHERTDB_CONFIDENCE_TIEBREAK")
                .unwrap_or(defaults.confidence_tiebreak),
            cache_walk_budget: env_parsed::<u64>("CHERTDB_CACHE_WALK_BUDGET_MS")
                .map(Duration::from_millis),
            maintenance_weight: env_parsed("CHERTDB_MAINTENANCE_WEIGHT")
                .unwrap_or(defaults.maintenance_weight),
        }
    }
}
