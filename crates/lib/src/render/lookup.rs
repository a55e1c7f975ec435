//! External reference data used to enrich placeholders and resolve recipients.

use std::collections::HashMap;
use std::fmt::Debug;
use thiserror::Error;

use crate::providers::table::{TableAccessor, TableError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Unknown reference source '{0}'")]
    UnknownSource(String),
    #[error("Reference source '{source_name}' has no column '{column}'")]
    UnknownColumn { source_name: String, column: String },
}

/// A matched reference row as `(header, value)` pairs in column order.
pub type ReferenceRow = Vec<(String, String)>;

pub trait ReferenceLookup: Send + Sync + Debug {
    /// Finds the first row of `source` whose `key_column` equals `key`, ignoring case.
    fn find_row(
        &self,
        source: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<ReferenceRow>, LookupError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ReferenceTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Reads a whole reference table; row 1 is the header.
    pub async fn load(table: &dyn TableAccessor) -> Result<Self, TableError> {
        let (rows, cols) = table.extent().await?;
        if rows == 0 || cols == 0 {
            return Ok(Self::default());
        }
        let mut cells = table.get_range(1, 1, rows, cols).await?.into_iter();
        let headers = cells.next().unwrap_or_default();
        Ok(Self::new(headers, cells.collect()))
    }

    fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    fn find(&self, source: &str, key_column: &str, key: &str) -> Result<Option<ReferenceRow>, LookupError> {
        let col = self.column(key_column).ok_or_else(|| LookupError::UnknownColumn {
            source_name: source.to_string(),
            column: key_column.to_string(),
        })?;
        let key = key.trim().to_lowercase();
        let row = self.rows.iter().find(|row| {
            row.get(col)
                .is_some_and(|cell| cell.trim().to_lowercase() == key)
        });
        Ok(row.map(|row| {
            self.headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        }))
    }
}

/// Named reference tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    sources: HashMap<String, ReferenceTable>,
}

impl ReferenceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: &str, table: ReferenceTable) -> Self {
        self.sources.insert(name.to_string(), table);
        self
    }
}

impl ReferenceLookup for ReferenceTables {
    fn find_row(
        &self,
        source: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<ReferenceRow>, LookupError> {
        self.sources
            .get(source)
            .ok_or_else(|| LookupError::UnknownSource(source.to_string()))?
            .find(source, key_column, key)
    }
}

/// Header text as a token segment: uppercase, non-alphanumerics collapsed to `_`.
pub fn column_token(header: &str) -> String {
    crate::model::slugify(header)
}
