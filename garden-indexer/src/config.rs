//! Indexer configuration

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use garden_store::Address;
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// SQLite database file; in-memory store when absent
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// One indexed chain and the registry factory its communities come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub factory: Address,

    /// Events before this block are ignored
    #[serde(default)]
    pub start_block: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            database: None,
            log_filter: default_log_filter(),
            chains: Vec::new(),
        }
    }
}

fn default_log_filter() -> String {
    "garden_indexer=info".to_string()
}

impl IndexerConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Reject configurations the router cannot start from.
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(IndexerError::Config("at least one chain must be configured".to_string()));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(IndexerError::Config(format!(
                    "chain {} is configured more than once",
                    chain.chain_id
                )));
            }
            if chain.factory.is_zero() {
                return Err(IndexerError::Config(format!(
                    "chain {} has the zero address as factory",
                    chain.chain_id
                )));
            }
        }
        Ok(())
    }
}
