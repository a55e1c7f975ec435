//! # Table Capability
//!
//! The backing store of submissions is an opaque table addressed by 1-based
//! (row, column) coordinates. Every component talks to it through
//! `TableAccessor`, never through a concrete spreadsheet API, so the same store
//! logic runs over Google Sheets, a CSV file or an in-memory table.

pub mod memory;

pub use memory::MemoryTable;

use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Range out of bounds: {0}")]
    OutOfBounds(String),
    #[error("Table backend failed: {0}")]
    Backend(String),
    #[error("Failed to read CSV table: {0}")]
    Csv(#[from] csv::Error),
}

/// A rectangular table of text cells with row 1 as the header.
#[async_trait]
pub trait TableAccessor: Send + Sync + Debug + DynClone {
    /// A stable name for the table (spreadsheet id + sheet, file path, ...).
    fn identity(&self) -> String;

    /// Number of rows and columns currently in use, header included.
    async fn extent(&self) -> Result<(usize, usize), TableError>;

    /// Reads a block of cells. Missing cells inside the block come back as empty strings.
    async fn get_range(
        &self,
        row: usize,
        col: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Result<Vec<Vec<String>>, TableError>;

    /// Overwrites a block of cells starting at (row, col), growing the table if needed.
    async fn set_range(
        &self,
        row: usize,
        col: usize,
        values: Vec<Vec<String>>,
    ) -> Result<(), TableError>;

    /// Appends one row after the last used row and returns its row number.
    async fn append_row(&self, values: Vec<String>) -> Result<usize, TableError>;
}

dyn_clone::clone_trait_object!(TableAccessor);

/// Rejects 0 coordinates, which every 1-based implementation must refuse.
pub fn check_origin(row: usize, col: usize) -> Result<(), TableError> {
    if row == 0 || col == 0 {
        return Err(TableError::OutOfBounds(format!(
            "coordinates are 1-based, got ({row}, {col})"
        )));
    }
    Ok(())
}
