//! Table fingerprints: a compact digest of current table state used in cache keys.
//!
//! The fingerprint covers the table identity, its extent, a marker taken from the
//! last row, and digests of the *whole* record-id and updated-at columns, so an
//! edit anywhere (not only an append) yields a new fingerprint.

use super::columns::{ColumnMap, MetaColumn};
use crate::errors::FormError;
use crate::providers::table::TableAccessor;

fn digest(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

async fn column_digest(
    table: &dyn TableAccessor,
    col: Option<usize>,
    data_rows: usize,
) -> Result<String, FormError> {
    let Some(col) = col else {
        return Ok(String::from("-"));
    };
    if data_rows == 0 {
        return Ok(digest(""));
    }
    let cells = table.get_range(2, col, data_rows, 1).await?;
    let joined = cells
        .iter()
        .map(|row| row.first().map(String::as_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(digest(&joined))
}

/// Computes the fingerprint for a table of `rows` x `cols` (header included).
pub async fn compute(
    table: &dyn TableAccessor,
    columns: &ColumnMap,
    rows: usize,
    cols: usize,
) -> Result<String, FormError> {
    let data_rows = rows.saturating_sub(1);
    let id_col = columns.meta(MetaColumn::RecordId);
    let updated_col = columns.meta(MetaColumn::UpdatedAt);

    let last_marker = if data_rows > 0 && cols > 0 {
        let last = table.get_range(rows, 1, 1, cols).await?;
        let last = last.first().cloned().unwrap_or_default();
        let pick = |col: Option<usize>| {
            col.and_then(|c| last.get(c - 1).cloned())
                .unwrap_or_default()
        };
        format!("{}@{}", pick(id_col), pick(updated_col))
    } else {
        String::new()
    };

    let parts = [
        table.identity(),
        format!("{rows}x{cols}"),
        last_marker,
        column_digest(table, updated_col, data_rows).await?,
        column_digest(table, id_col, data_rows).await?,
    ];
    Ok(digest(&parts.join("|")))
}
