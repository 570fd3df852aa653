//! Engine configuration.

use crate::chain::{Priority, DEFAULT_RANK_BAND};
use thiserror::Error;

/// Errors from configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Rank band must be positive, got {0}")]
    InvalidRankBand(Priority),
}

/// Settings shared by chains and codecs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Spacing between automatically assigned priorities.
    pub rank_band: Priority,

    /// Pretty-print serialized characters.
    pub pretty: bool,

    /// Fail the whole import on an unregistered link type instead of
    /// substituting an identity link.
    pub strict_link_types: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rank_band: DEFAULT_RANK_BAND,
            pretty: false,
            strict_link_types: false,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rank band used for priority-less insertions.
    pub fn with_rank_band(mut self, rank_band: Priority) -> Self {
        self.rank_band = rank_band;
        self
    }

    /// Toggle pretty-printed output.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Toggle rejection of unknown link types.
    pub fn with_strict_link_types(mut self, strict: bool) -> Self {
        self.strict_link_types = strict;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rank_band <= 0 {
            return Err(ConfigError::InvalidRankBand(self.rank_band));
        }
        Ok(())
    }
}
