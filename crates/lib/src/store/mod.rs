//! # Submission Store
//!
//! Reads and writes records in the backing table and keeps a derived cache in
//! front of it. The table is always authoritative: cache keys embed a
//! fingerprint of the table, so a stale entry is simply never looked up again,
//! and every cache failure degrades to a miss.
//!
//! Invalidation is coarse on purpose. `bump_version` moves every reader to a new
//! key namespace; nothing is evicted one entry at a time.

pub mod codec;
pub mod columns;
pub mod fingerprint;
pub mod pagination;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::STORE_VERSION_KEY;
use crate::dedup;
use crate::errors::FormError;
use crate::model::{FormDefinition, QuestionSchema, Record};
use crate::providers::cache::CacheBackend;
use crate::providers::table::TableAccessor;
use columns::{field_header, ColumnMap, MetaColumn};

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub total_count: usize,
}

/// Metadata returned by a successful upsert.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub id: String,
    /// `true` when a new row was appended, `false` when a row was overwritten.
    pub created: bool,
    pub row: usize,
    pub record: Record,
}

/// Current shape and fingerprint of the table, read once per operation.
#[derive(Debug, Clone)]
struct TableSnapshot {
    rows: usize,
    cols: usize,
    columns: ColumnMap,
    fingerprint: String,
}

/// Store over one backing table.
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    table: Box<dyn TableAccessor>,
    cache: Box<dyn CacheBackend>,
    config: EngineConfig,
}

fn check_schema(schema: &QuestionSchema) -> Result<(), FormError> {
    if schema.form_key.trim().is_empty() || schema.questions.is_empty() {
        return Err(FormError::NotFound(format!(
            "schema for form '{}'",
            schema.form_key
        )));
    }
    Ok(())
}

fn cache_key(parts: &[&str]) -> String {
    format!("anyform:{:x}", md5::compute(parts.join("|").as_bytes()))
}

impl SubmissionStore {
    pub fn new(
        table: Box<dyn TableAccessor>,
        cache: Box<dyn CacheBackend>,
        config: EngineConfig,
    ) -> Self {
        Self {
            table,
            cache,
            config,
        }
    }

    pub fn table(&self) -> &dyn TableAccessor {
        self.table.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Cache helpers: every failure is a logged miss ---

    async fn cache_get(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!("cache get degraded to miss: {e}");
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, value: &str) {
        if let Err(e) = self
            .cache
            .put(key, value, Some(self.config.cache_ttl()))
            .await
        {
            debug!("cache put skipped: {e}");
        }
    }

    /// The current store version; 0 when none was ever written or the cache is down.
    pub async fn store_version(&self) -> u64 {
        self.cache_get(STORE_VERSION_KEY)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Orphans every cached page and record by moving to a new key namespace.
    pub async fn bump_version(&self) -> u64 {
        let next = self.store_version().await + 1;
        if let Err(e) = self
            .cache
            .put(STORE_VERSION_KEY, &next.to_string(), None)
            .await
        {
            warn!("store version bump not persisted: {e}");
        }
        info!("store version bumped to {next}");
        next
    }

    fn record_key(&self, version: u64, id: &str, fingerprint: &str) -> String {
        cache_key(&[
            "record",
            &version.to_string(),
            &self.table.identity(),
            id,
            fingerprint,
        ])
    }

    // --- Table helpers ---

    async fn snapshot(&self, schema: &QuestionSchema) -> Result<TableSnapshot, FormError> {
        let (rows, cols) = self.table.extent().await?;
        let header = if rows > 0 && cols > 0 {
            self.table
                .get_range(1, 1, 1, cols)
                .await?
                .into_iter()
                .next()
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let columns = ColumnMap::discover(&header, schema)?;
        let fingerprint = fingerprint::compute(self.table.as_ref(), &columns, rows, cols).await?;
        Ok(TableSnapshot {
            rows,
            cols,
            columns,
            fingerprint,
        })
    }

    /// Makes sure the header row has a column for every meta value and data field,
    /// appending missing ones. Returns the resulting column map.
    async fn ensure_header(&self, schema: &QuestionSchema) -> Result<ColumnMap, FormError> {
        let (rows, cols) = self.table.extent().await?;
        let mut header = if rows > 0 && cols > 0 {
            self.table
                .get_range(1, 1, 1, cols)
                .await?
                .into_iter()
                .next()
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let columns = ColumnMap::discover(&header, schema)?;

        let before = header.len();
        for meta in MetaColumn::ALL {
            if columns.meta(meta).is_none() {
                header.push(meta.label().to_string());
            }
        }
        for field in schema.data_fields() {
            if columns.field(&field.id).is_none() {
                header.push(field_header(field));
            }
        }
        if header.len() == before {
            return Ok(columns);
        }

        info!(
            "Writing header for form '{}' ({} new columns)",
            schema.form_key,
            header.len() - before
        );
        self.table.set_range(1, 1, vec![header.clone()]).await?;
        ColumnMap::discover(&header, schema)
    }

    async fn read_data_rows(
        &self,
        limit: usize,
        cols: usize,
    ) -> Result<Vec<Vec<String>>, FormError> {
        if limit == 0 || cols == 0 {
            return Ok(Vec::new());
        }
        Ok(self.table.get_range(2, 1, limit, cols).await?)
    }

    /// Linear scan of the id column. Returns the 1-based table row.
    async fn find_row(&self, snapshot: &TableSnapshot, id: &str) -> Result<Option<usize>, FormError> {
        let Some(id_col) = snapshot.columns.meta(MetaColumn::RecordId) else {
            return Ok(None);
        };
        let data_rows = snapshot.rows.saturating_sub(1);
        if data_rows == 0 {
            return Ok(None);
        }
        let ids = self.table.get_range(2, id_col, data_rows, 1).await?;
        Ok(ids
            .iter()
            .position(|cell| cell.first().is_some_and(|c| c.trim() == id))
            .map(|index| index + 2))
    }

    async fn refresh_record_entry(&self, schema: &QuestionSchema, record: &Record) {
        let snapshot = match self.snapshot(schema).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("post-write cache refresh skipped: {e}");
                return;
            }
        };
        let version = self.store_version().await;
        match serde_json::to_string(record) {
            Ok(payload) => {
                let key = self.record_key(version, &record.id, &snapshot.fingerprint);
                self.cache_put(&key, &payload).await;
            }
            Err(e) => warn!("record {} not cacheable: {e}", record.id),
        }
    }

    // --- Public operations ---

    /// Lists one page of records in table order.
    ///
    /// `page_size` is clamped to `1..=max_page_size` (0 selects the maximum). At most
    /// `max_scan_rows` data rows are scanned, which also caps `total_count`.
    pub async fn list_page(
        &self,
        schema: &QuestionSchema,
        projection: &[String],
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListPage, FormError> {
        check_schema(schema)?;
        let offset = pagination::decode_token(page_token)?;
        let max = self.config.max_page_size.max(1);
        let size = if page_size == 0 { max } else { page_size.min(max) };

        let snapshot = self.snapshot(schema).await?;
        let version = self.store_version().await;
        let page_key = cache_key(&[
            "page",
            &version.to_string(),
            &self.table.identity(),
            &projection.join(","),
            &size.to_string(),
            page_token.unwrap_or_default(),
            &snapshot.fingerprint,
        ]);

        if let Some(hit) = self.cache_get(&page_key).await {
            match serde_json::from_str::<ListPage>(&hit) {
                Ok(mut page) => {
                    for record in &mut page.items {
                        codec::conform_to_schema(record, schema);
                    }
                    debug!(form = %schema.form_key, offset, "page cache hit");
                    return Ok(page);
                }
                Err(e) => debug!("discarding undecodable cached page: {e}"),
            }
        }
        debug!(form = %schema.form_key, offset, "page cache miss");

        let scan = snapshot
            .rows
            .saturating_sub(1)
            .min(self.config.max_scan_rows);
        let rows = self.read_data_rows(scan, snapshot.cols).await?;
        let records: Vec<Record> = rows
            .iter()
            .filter_map(|row| codec::row_to_record(row, &snapshot.columns, schema, &[]))
            .collect();

        let total_count = records.len();
        let end = offset.saturating_add(size).min(total_count);
        let items: Vec<Record> = records
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|record| project(record, projection))
            .collect();
        let next_page_token = (end < total_count).then(|| pagination::encode_token(end));

        let page = ListPage {
            items,
            next_page_token,
            total_count,
        };

        self.cache_put(&page_key, &serde_json::to_string(&page)?)
            .await;
        for record in &records[offset.min(total_count)..end] {
            let key = self.record_key(version, &record.id, &snapshot.fingerprint);
            self.cache_put(&key, &serde_json::to_string(record)?).await;
        }
        Ok(page)
    }

    /// Fetches one record by id.
    pub async fn get_by_id(&self, schema: &QuestionSchema, id: &str) -> Result<Record, FormError> {
        check_schema(schema)?;
        let snapshot = self.snapshot(schema).await?;
        let version = self.store_version().await;
        let key = self.record_key(version, id, &snapshot.fingerprint);

        if let Some(hit) = self.cache_get(&key).await {
            if let Ok(mut record) = serde_json::from_str::<Record>(&hit) {
                codec::conform_to_schema(&mut record, schema);
                debug!(id, "record cache hit");
                return Ok(record);
            }
        }

        let row_number = self
            .find_row(&snapshot, id)
            .await?
            .ok_or_else(|| FormError::NotFound(format!("record '{id}'")))?;
        let row = self
            .table
            .get_range(row_number, 1, 1, snapshot.cols)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let record = codec::row_to_record(&row, &snapshot.columns, schema, &[])
            .ok_or_else(|| FormError::NotFound(format!("record '{id}'")))?;

        self.cache_put(&key, &serde_json::to_string(&record)?).await;
        Ok(record)
    }

    /// Inserts or updates a record.
    ///
    /// Dedup rules run against every other row before anything is written; a
    /// conflict returns `FormError::Conflict` and leaves the table untouched.
    /// The creation timestamp of an existing row is preserved, the update
    /// timestamp is always refreshed, and the record cache entry is rewritten
    /// right after the table write.
    pub async fn upsert(
        &self,
        form: &FormDefinition,
        mut record: Record,
    ) -> Result<UpsertOutcome, FormError> {
        let schema = &form.schema;
        check_schema(schema)?;

        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.language = record.language.to_uppercase();

        let columns = self.ensure_header(schema).await?;
        let (rows, cols) = self.table.extent().await?;
        // The whole table is scanned here: an update past the listing cap must
        // still find its row.
        let data = self.read_data_rows(rows.saturating_sub(1), cols).await?;

        let mut existing_row = None;
        let mut others = Vec::with_capacity(data.len());
        for (index, row) in data.iter().enumerate() {
            let Some(other) = codec::row_to_record(row, &columns, schema, &[]) else {
                continue;
            };
            if other.id == record.id && existing_row.is_none() {
                existing_row = Some((index + 2, other));
            } else {
                others.push(other);
            }
        }

        if let Some(conflict) =
            dedup::evaluate(&form.dedup_rules, &record, &others, &record.language)
        {
            info!(
                form = %schema.form_key,
                rule = %conflict.rule_id,
                "upsert rejected by dedup rule"
            );
            return Err(conflict.into());
        }

        let now = Utc::now();
        record.updated_at = Some(now);
        record.created_at = existing_row
            .as_ref()
            .and_then(|(_, previous)| previous.created_at)
            .or(record.created_at)
            .or(Some(now));

        let (row_number, created) = match &existing_row {
            Some((row_number, _)) => {
                let base = &data[row_number - 2];
                let cells = codec::record_to_row(&record, &columns, schema, base)?;
                self.table.set_range(*row_number, 1, vec![cells]).await?;
                (*row_number, false)
            }
            None => {
                let cells = codec::record_to_row(&record, &columns, schema, &[])?;
                let row_number = self.table.append_row(cells).await?;
                (row_number, true)
            }
        };
        info!(
            form = %schema.form_key,
            id = %record.id,
            row = row_number,
            created,
            "record saved"
        );

        self.refresh_record_entry(schema, &record).await;
        Ok(UpsertOutcome {
            id: record.id.clone(),
            created,
            row: row_number,
            record,
        })
    }

    /// Writes a follow-up status (and optionally a document URL) onto a record.
    pub async fn update_status(
        &self,
        schema: &QuestionSchema,
        id: &str,
        status: &str,
        document_url: Option<&str>,
    ) -> Result<Record, FormError> {
        check_schema(schema)?;
        let columns = self.ensure_header(schema).await?;
        let snapshot = self.snapshot(schema).await?;
        let row_number = self
            .find_row(&snapshot, id)
            .await?
            .ok_or_else(|| FormError::NotFound(format!("record '{id}'")))?;
        let row = self
            .table
            .get_range(row_number, 1, 1, snapshot.cols)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let mut record = codec::row_to_record(&row, &columns, schema, &[])
            .ok_or_else(|| FormError::NotFound(format!("record '{id}'")))?;

        record.status = Some(status.to_string());
        if let Some(url) = document_url {
            record.pdf_url = Some(url.to_string());
        }
        record.updated_at = Some(Utc::now());

        let cells = codec::record_to_row(&record, &columns, schema, &row)?;
        self.table.set_range(row_number, 1, vec![cells]).await?;
        info!(id, status, "record status updated");

        self.refresh_record_entry(schema, &record).await;
        Ok(record)
    }
}

fn project(record: &Record, projection: &[String]) -> Record {
    if projection.is_empty() {
        return record.clone();
    }
    let mut projected = record.clone();
    projected.values.retain(|key, _| projection.contains(key));
    projected
}
