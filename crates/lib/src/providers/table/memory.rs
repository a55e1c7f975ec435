use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{check_origin, TableAccessor, TableError};

/// An in-process table.
///
/// Clones share the same cells, mirroring how a real spreadsheet is one shared
/// resource seen by many handles. Also the fake used throughout the test suites.
#[derive(Clone)]
pub struct MemoryTable {
    name: String,
    cells: Arc<RwLock<Vec<Vec<String>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryTable {
    pub fn new(name: &str) -> Self {
        Self::from_rows(name, Vec::new())
    }

    pub fn from_rows(name: &str, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            cells: Arc::new(RwLock::new(rows)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loads a table from CSV text. The first record is kept as the header row.
    pub fn from_csv(name: &str, data: &str) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_bytes());
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(Self::from_rows(name, rows))
    }

    /// Serializes the current cells back to CSV.
    pub async fn to_csv(&self) -> Result<String, TableError> {
        let cells = self.cells.read().await;
        let width = cells.iter().map(Vec::len).max().unwrap_or(0);
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        for row in cells.iter() {
            let mut padded = row.clone();
            padded.resize(width, String::new());
            writer.write_record(&padded)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| TableError::Backend(format!("CSV flush failed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| TableError::Backend(e.to_string()))
    }

    /// Snapshot of all cells, for assertions.
    pub async fn rows(&self) -> Vec<Vec<String>> {
        self.cells.read().await.clone()
    }

    /// Number of successful `set_range`/`append_row` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Debug for MemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TableAccessor for MemoryTable {
    fn identity(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn extent(&self) -> Result<(usize, usize), TableError> {
        let cells = self.cells.read().await;
        let cols = cells.iter().map(Vec::len).max().unwrap_or(0);
        Ok((cells.len(), cols))
    }

    async fn get_range(
        &self,
        row: usize,
        col: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Result<Vec<Vec<String>>, TableError> {
        check_origin(row, col)?;
        let cells = self.cells.read().await;
        let block = (row - 1..row - 1 + num_rows)
            .map(|r| {
                (col - 1..col - 1 + num_cols)
                    .map(|c| {
                        cells
                            .get(r)
                            .and_then(|cells_row| cells_row.get(c))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        Ok(block)
    }

    async fn set_range(
        &self,
        row: usize,
        col: usize,
        values: Vec<Vec<String>>,
    ) -> Result<(), TableError> {
        check_origin(row, col)?;
        let mut cells = self.cells.write().await;
        for (offset, new_row) in values.into_iter().enumerate() {
            let r = row - 1 + offset;
            if cells.len() <= r {
                cells.resize(r + 1, Vec::new());
            }
            let target = &mut cells[r];
            if target.len() < col - 1 + new_row.len() {
                target.resize(col - 1 + new_row.len(), String::new());
            }
            for (c, value) in new_row.into_iter().enumerate() {
                target[col - 1 + c] = value;
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append_row(&self, values: Vec<String>) -> Result<usize, TableError> {
        let mut cells = self.cells.write().await;
        cells.push(values);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(cells.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_range_grows_and_get_range_pads() {
        let table = MemoryTable::new("grow");
        table
            .set_range(2, 2, vec![vec!["b2".into(), "c2".into()]])
            .await
            .unwrap();

        assert_eq!(table.extent().await.unwrap(), (2, 3));
        let block = table.get_range(1, 1, 2, 3).await.unwrap();
        assert_eq!(block[0], vec!["", "", ""]);
        assert_eq!(block[1], vec!["", "b2", "c2"]);
    }

    #[tokio::test]
    async fn test_csv_round_trip_keeps_header() {
        let table = MemoryTable::from_csv("csv", "Record ID,Name\nr1,\"Soup, hot\"\n").unwrap();
        assert_eq!(table.extent().await.unwrap(), (2, 2));
        let csv = table.to_csv().await.unwrap();
        assert!(csv.starts_with("Record ID,Name"));
        assert!(csv.contains("\"Soup, hot\""));
    }

    #[tokio::test]
    async fn test_zero_coordinates_are_rejected() {
        let table = MemoryTable::new("zero");
        let result = table.get_range(0, 1, 1, 1).await;
        assert!(matches!(result, Err(TableError::OutOfBounds(_))));
    }
}
