//! Capabilities the engine depends on but does not own: the backing table,
//! the derived-data cache and the template document store.

pub mod cache;
pub mod documents;
pub mod table;
