//! # Cache Capability
//!
//! A string key/value cache with per-entry time-to-live. The cache only ever
//! holds data derived from the backing table, so every caller treats an error
//! here as a miss and carries on.

pub mod memory;

pub use memory::{MemoryCache, UnavailableCache};

use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CacheBackend: Send + Sync + Debug + DynClone {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value`. A `None` TTL keeps the entry until overwritten.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
}

dyn_clone::clone_trait_object!(CacheBackend);
