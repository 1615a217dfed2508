use thiserror::Error;

use crate::core::grid::GridError;
use crate::core::io::TableIoError;
use crate::core::pair::PairKey;
use crate::engine::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("State '{state}' failed {count} consecutive iterations")]
    RepeatedStateFailure { state: String, count: usize },

    #[error("Pair '{pair}' received no valid update for {count} consecutive iterations")]
    StuckPair { pair: PairKey, count: usize },

    #[error("Failed to write iteration artifacts: {0}")]
    Artifacts(#[from] TableIoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal grid inconsistency: {0}")]
    Grid(#[from] GridError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
