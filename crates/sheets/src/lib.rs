//! # `anyform-sheets`: Google Sheets Table Plugin
//!
//! This crate provides a `TableAccessor` backed by the Google Sheets v4 `values`
//! REST API, so the `anyform` store can keep its submissions in a spreadsheet.
//! It reads with `values.get`, overwrites with `values.update` and appends with
//! `values.append`; all three address cells in A1 notation.

use anyform::providers::table::{check_origin, TableAccessor, TableError};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

// --- Error Definitions ---

#[derive(Error, Debug, Clone)]
pub enum SheetError {
    #[error("Invalid Google Sheets URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to reach Google Sheets: {0}")]
    Fetch(String),
    #[error("Google Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected Google Sheets response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SheetError {
    fn from(err: reqwest::Error) -> Self {
        SheetError::Fetch(err.to_string())
    }
}

/// A helper to convert the specific `SheetError` into the generic `anyform` `TableError`.
impl From<SheetError> for TableError {
    fn from(err: SheetError) -> Self {
        match err {
            SheetError::Api { status: 400, message } => TableError::OutOfBounds(message),
            other => TableError::Backend(other.to_string()),
        }
    }
}

// --- Configuration ---

/// Where the submissions sheet lives and how to authenticate against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Tab name, e.g. `Submissions`.
    pub sheet: String,
    /// OAuth2 bearer token with the spreadsheets scope.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Overrides the API host (used by tests and proxies).
    #[serde(default)]
    pub base_url: Option<String>,
}

// --- A1 Notation Helpers ---

/// Converts a 1-based column number to its letters: 1 → `A`, 27 → `AA`.
pub fn column_letters(col: usize) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quotes a sheet name when A1 notation requires it.
pub fn quote_sheet(sheet: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// `Sheet!A1:C3` for a block starting at (row, col).
pub fn a1_range(sheet: &str, row: usize, col: usize, num_rows: usize, num_cols: usize) -> String {
    let last_row = row + num_rows.max(1) - 1;
    let last_col = col + num_cols.max(1) - 1;
    format!(
        "{}!{}{}:{}{}",
        quote_sheet(sheet),
        column_letters(col),
        row,
        column_letters(last_col),
        last_row
    )
}

/// Extracts the first row number of an A1 range such as `Sheet1!A12:F12`.
pub fn first_row_of(range: &str) -> Option<usize> {
    let re = Regex::new(r"![A-Z]+(\d+)").ok()?;
    re.captures(range)?.get(1)?.as_str().parse().ok()
}

// --- Wire Types ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// --- Table Implementation ---

/// One tab of a Google spreadsheet seen as a `TableAccessor`.
#[derive(Debug, Clone)]
pub struct SheetsTable {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet: String,
    access_token: Option<String>,
}

impl SheetsTable {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetError> {
        if config.spreadsheet_id.trim().is_empty() || config.sheet.trim().is_empty() {
            return Err(SheetError::InvalidUrl(
                "spreadsheet id and sheet name are required".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet: config.sheet.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn values_url(&self, range: &str) -> Result<reqwest::Url, SheetError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SheetError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", &self.spreadsheet_id, "values", range]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, SheetError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SheetError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    async fn read(&self, range: &str) -> Result<Vec<Vec<String>>, SheetError> {
        debug!("Reading Google Sheets range {range}");
        let body = self.send(self.client.get(self.values_url(range)?)).await?;
        let parsed: ValueRange =
            serde_json::from_str(&body).map_err(|e| SheetError::Parse(e.to_string()))?;
        Ok(parsed
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

#[async_trait]
impl TableAccessor for SheetsTable {
    fn identity(&self) -> String {
        format!("sheets:{}/{}", self.spreadsheet_id, self.sheet)
    }

    async fn extent(&self) -> Result<(usize, usize), TableError> {
        // A bare sheet name selects every used cell of the tab.
        let rows = self.read(&quote_sheet(&self.sheet)).await?;
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        Ok((rows.len(), cols))
    }

    async fn get_range(
        &self,
        row: usize,
        col: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Result<Vec<Vec<String>>, TableError> {
        check_origin(row, col)?;
        if num_rows == 0 || num_cols == 0 {
            return Ok(Vec::new());
        }
        let mut rows = self
            .read(&a1_range(&self.sheet, row, col, num_rows, num_cols))
            .await?;
        // The API trims trailing empty rows and cells.
        rows.resize(num_rows, Vec::new());
        for cells in &mut rows {
            cells.resize(num_cols, String::new());
        }
        Ok(rows)
    }

    async fn set_range(
        &self,
        row: usize,
        col: usize,
        values: Vec<Vec<String>>,
    ) -> Result<(), TableError> {
        check_origin(row, col)?;
        let num_rows = values.len();
        let num_cols = values.iter().map(Vec::len).max().unwrap_or(0);
        if num_rows == 0 || num_cols == 0 {
            return Ok(());
        }
        let range = a1_range(&self.sheet, row, col, num_rows, num_cols);
        let mut url = self.values_url(&range).map_err(TableError::from)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = json!({ "range": range, "majorDimension": "ROWS", "values": values });
        self.send(self.client.put(url).json(&body)).await?;
        info!("Updated Google Sheets range {range}");
        Ok(())
    }

    async fn append_row(&self, values: Vec<String>) -> Result<usize, TableError> {
        let range = format!("{}!A1", quote_sheet(&self.sheet));
        let mut url = self
            .values_url(&format!("{range}:append"))
            .map_err(TableError::from)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [values] });
        let response = self.send(self.client.post(url).json(&body)).await?;
        let parsed: AppendResponse = serde_json::from_str(&response)
            .map_err(|e| SheetError::Parse(e.to_string()))?;
        let row = first_row_of(&parsed.updates.updated_range).ok_or_else(|| {
            SheetError::Parse(format!(
                "cannot read row from '{}'",
                parsed.updates.updated_range
            ))
        })?;
        info!("Appended row {row} to Google Sheets tab '{}'", self.sheet);
        Ok(row)
    }
}
