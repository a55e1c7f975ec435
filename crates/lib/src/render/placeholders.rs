//! # Placeholder Engine
//!
//! Builds the token → text mapping used to fill templates:
//!
//! - `{{FIELD}}`, `{{GROUP.FIELD}}`, `{{GROUP.SUB.FIELD}}`: formatted values
//! - `{{LABEL(path)}}`: the label in the record's language
//! - `{{CONSOLIDATED(path.field)}}`, `{{SUM(path.field)}}`, `{{COUNT(path)}}`
//! - `{{FIELD.COLUMN}}`: columns of a reference row matched by the field value
//!
//! Every key also answers to its uppercase, lowercase and `Title_Case` forms.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::flatten::{FlatRow, FlattenedRowSet};
use super::format::{format_optional, format_value, parse_number};
use super::lookup::{column_token, ReferenceLookup};
use crate::constants::{
    CONSOLIDATED_EMPTY, META_CREATED_AT, META_LANGUAGE, META_PDF_URL, META_RECORD_ID,
    META_STATUS, META_UPDATED_AT,
};
use crate::model::{format_number, FieldDef, QuestionSchema, QuestionType, Record};

/// Matches `{{ token }}`; group 1 is the trimmed token body.
pub static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("token pattern is a valid regex")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderMap {
    tokens: HashMap<String, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` and its case variants. The first value registered for a
    /// spelling wins, so callers insert the most specific tokens first.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for variant in key_variants(key) {
            self.tokens.entry(variant).or_insert_with(|| value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens.get(key.trim()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tokens.contains_key(key.trim())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Overlays `other` on top of `self`: its tokens take precedence.
    pub fn layered(&self, other: &PlaceholderMap) -> PlaceholderMap {
        let mut merged = self.clone();
        merged.tokens.extend(other.tokens.clone());
        merged
    }

    /// Replaces every known token in `text`; unknown tokens are left untouched.
    pub fn apply(&self, text: &str) -> String {
        TOKEN_PATTERN
            .replace_all(text, |caps: &Captures| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// The literal key plus uppercase, lowercase and underscore title-case spellings.
pub fn key_variants(key: &str) -> Vec<String> {
    let key = key.trim();
    let mut variants = vec![
        key.to_string(),
        key.to_uppercase(),
        key.to_lowercase(),
        title_case(key),
    ];
    variants.dedup();
    variants
}

fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut start_of_word = true;
    for c in key.chars() {
        if c.is_alphanumeric() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

/// Formats `field` on every row at a path and joins the non-empty results.
fn column_values(rows: &[FlatRow], field: &FieldDef) -> Vec<String> {
    rows.iter()
        .map(|row| format_optional(row.get(&field.id), Some(field.kind)))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Distinct values in first-seen order, joined with `", "`; `"None"` when empty.
pub fn consolidated(rows: &[FlatRow], field: &FieldDef) -> String {
    let mut seen: Vec<String> = Vec::new();
    for row in rows {
        let Some(value) = row.get(&field.id) else {
            continue;
        };
        // Checkbox rows contribute each ticked option separately.
        let parts: Vec<String> = match value {
            crate::model::FieldValue::List(_) => format_value(value, Some(field.kind))
                .split(", ")
                .map(str::to_string)
                .collect(),
            _ => vec![format_value(value, Some(field.kind))],
        };
        for part in parts {
            if !part.is_empty() && !seen.contains(&part) {
                seen.push(part);
            }
        }
    }
    if seen.is_empty() {
        CONSOLIDATED_EMPTY.to_string()
    } else {
        seen.join(", ")
    }
}

/// Sums parseable numbers (comma decimals accepted), rounded to two decimals.
pub fn sum(rows: &[FlatRow], field: &FieldDef) -> String {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(&field.id))
        .filter_map(parse_number)
        .collect();
    if values.is_empty() {
        return "0".to_string();
    }
    format_number(values.iter().sum())
}

fn insert_meta(map: &mut PlaceholderMap, record: &Record) {
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_default()
    };
    let meta = [
        ("ID", META_RECORD_ID, record.id.clone()),
        ("LANGUAGE", META_LANGUAGE, record.language.clone()),
        ("STATUS", META_STATUS, record.status.clone().unwrap_or_default()),
        ("CREATED_AT", META_CREATED_AT, timestamp(record.created_at)),
        ("UPDATED_AT", META_UPDATED_AT, timestamp(record.updated_at)),
        ("PDF_URL", META_PDF_URL, record.pdf_url.clone().unwrap_or_default()),
    ];
    for (key, label, value) in meta {
        map.insert(key, value);
        map.insert(&format!("LABEL({key})"), label);
    }
}

fn insert_lookup_tokens(
    map: &mut PlaceholderMap,
    field: &FieldDef,
    record: &Record,
    lookup: &dyn ReferenceLookup,
) {
    let Some(reference) = &field.lookup else {
        return;
    };
    let key = format_optional(record.value(&field.id), Some(field.kind));
    if key.is_empty() {
        return;
    }
    match lookup.find_row(&reference.source, &reference.key_column, &key) {
        Ok(Some(row)) => {
            for (header, value) in row {
                if header.trim().eq_ignore_ascii_case(reference.key_column.trim()) {
                    continue;
                }
                map.insert(&format!("{}.{}", field.id, column_token(&header)), value);
            }
        }
        Ok(None) => debug!(field = %field.id, "no reference row for '{key}'"),
        Err(e) => warn!(field = %field.id, "reference lookup skipped: {e}"),
    }
}

/// Builds the full placeholder map for one record.
pub fn build_placeholders(
    record: &Record,
    schema: &QuestionSchema,
    rows: &FlattenedRowSet,
    lookup: Option<&dyn ReferenceLookup>,
) -> PlaceholderMap {
    let language = record.language.as_str();
    let mut map = PlaceholderMap::new();
    insert_meta(&mut map, record);

    for field in &schema.questions {
        if field.kind == QuestionType::Button {
            continue;
        }
        map.insert(
            &field.id,
            format_optional(record.value(&field.id), Some(field.kind)),
        );
        map.insert(&format!("LABEL({})", field.id), field.label_for(language));
        if let Some(lookup) = lookup {
            insert_lookup_tokens(&mut map, field, record, lookup);
        }
    }

    let groups = schema.group_index();
    for path in groups.paths() {
        let Some(entry) = groups.get(path) else {
            continue;
        };
        let path_rows = rows.rows(path);
        map.insert(&format!("COUNT({path})"), path_rows.len().to_string());
        map.insert(
            &format!("LABEL({path})"),
            entry.label.resolve(language).unwrap_or(path),
        );
        for field in &entry.schema.fields {
            let key = format!("{path}.{}", field.id);
            map.insert(&format!("LABEL({key})"), field.label_for(language));
            map.insert(&key, column_values(path_rows, field).join("\n"));
            map.insert(&format!("CONSOLIDATED({key})"), consolidated(path_rows, field));
            if field.kind == QuestionType::Number {
                map.insert(&format!("SUM({key})"), sum(path_rows, field));
            }
        }
    }

    // Values the schema no longer describes (renamed or removed fields).
    for (key, value) in &record.values {
        if !map.contains(key) {
            map.insert(key, format_value(value, None));
        }
    }
    map
}
