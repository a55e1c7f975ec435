//! # Shared Constants
//!
//! Labels, limits and cache key prefixes shared by the store, the render engine
//! and the plugin crates. Keeping them here avoids "magic strings" drifting
//! between the writer and the reader of the backing table.

/// Default time-to-live for cached pages and records, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Entry count at which the in-memory cache first sweeps expired entries.
pub const CACHE_SWEEP_THRESHOLD: usize = 1024;

/// Largest page a caller may request from `list_page`.
pub const MAX_PAGE_SIZE: usize = 10;

/// Upper bound on data rows scanned (and counted) by a listing.
pub const MAX_SCAN_ROWS: usize = 200;

/// Header labels of the meta columns, in the order a fresh table is laid out.
pub const META_RECORD_ID: &str = "Record ID";
pub const META_CREATED_AT: &str = "Created At";
pub const META_UPDATED_AT: &str = "Updated At";
pub const META_LANGUAGE: &str = "Language";
pub const META_STATUS: &str = "Status";
pub const META_PDF_URL: &str = "PDF URL";

/// Language used when a record carries none, and the label fallback chain.
pub const DEFAULT_LANGUAGE: &str = "EN";
pub const LABEL_FALLBACK_LANGUAGES: [&str; 3] = ["EN", "FR", "NL"];

/// Cache key holding the current store version. Stored without a TTL.
pub const STORE_VERSION_KEY: &str = "anyform:store_version";

/// Rendered when a consolidated aggregation has nothing to show.
pub const CONSOLIDATED_EMPTY: &str = "None";
