//! # Engine Configuration
//!
//! A single configuration object, built once by the host and cloned into each
//! component. Every field has a default so a partial YAML/JSON document (or none
//! at all) still yields a working engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_CACHE_TTL_SECS, MAX_PAGE_SIZE, MAX_SCAN_ROWS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Time-to-live applied to every cached page and record.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Page sizes above this are clamped.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Safety bound on rows scanned and counted by a listing.
    #[serde(default = "default_max_scan_rows")]
    pub max_scan_rows: usize,
    /// When set, causes of external failures are logged in full.
    #[serde(default)]
    pub debug: bool,
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_max_scan_rows() -> usize {
    MAX_SCAN_ROWS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_page_size: default_max_page_size(),
            max_scan_rows: default_max_scan_rows(),
            debug: false,
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
