//! Header discovery: maps meta labels and schema fields to 1-based columns.

use regex::Regex;
use std::collections::HashMap;

use crate::constants::{
    META_CREATED_AT, META_LANGUAGE, META_PDF_URL, META_RECORD_ID, META_STATUS, META_UPDATED_AT,
};
use crate::errors::FormError;
use crate::model::{FieldDef, QuestionSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaColumn {
    RecordId,
    CreatedAt,
    UpdatedAt,
    Language,
    Status,
    PdfUrl,
}

impl MetaColumn {
    pub const ALL: [MetaColumn; 6] = [
        MetaColumn::RecordId,
        MetaColumn::CreatedAt,
        MetaColumn::UpdatedAt,
        MetaColumn::Language,
        MetaColumn::Status,
        MetaColumn::PdfUrl,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetaColumn::RecordId => META_RECORD_ID,
            MetaColumn::CreatedAt => META_CREATED_AT,
            MetaColumn::UpdatedAt => META_UPDATED_AT,
            MetaColumn::Language => META_LANGUAGE,
            MetaColumn::Status => META_STATUS,
            MetaColumn::PdfUrl => META_PDF_URL,
        }
    }

    /// Lowercase labels accepted for this column, canonical one first.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            MetaColumn::RecordId => &["record id", "id"],
            MetaColumn::CreatedAt => &["created at", "created"],
            MetaColumn::UpdatedAt => &["updated at", "updated", "last updated"],
            MetaColumn::Language => &["language", "lang"],
            MetaColumn::Status => &["status"],
            MetaColumn::PdfUrl => &["pdf url", "document url", "pdf"],
        }
    }

    /// Case-insensitive exact match against one of the aliases.
    fn matches_exactly(self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        self.aliases().iter().any(|alias| header == *alias)
    }

    /// Prefix-tolerant: `Record ID (system)` still matches.
    fn matches_prefix(self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        self.aliases().iter().any(|alias| {
            header
                .strip_prefix(alias)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| !c.is_alphanumeric())
        })
    }
}

/// Where every known value lives in the table. Columns are 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    pub meta: HashMap<MetaColumn, usize>,
    pub fields: HashMap<String, usize>,
    pub width: usize,
}

impl ColumnMap {
    pub fn meta(&self, column: MetaColumn) -> Option<usize> {
        self.meta.get(&column).copied()
    }

    pub fn field(&self, field_id: &str) -> Option<usize> {
        self.fields.get(field_id).copied()
    }

    /// Builds the map from header cells.
    ///
    /// A field is found by an embedded `[FIELD_ID]` in its header first; a header
    /// whose text equals a field label is used only when neither the label nor the
    /// header text is ambiguous.
    pub fn discover(header: &[String], schema: &QuestionSchema) -> Result<Self, FormError> {
        let id_pattern = Regex::new(r"\[([^\[\]]+)\]")
            .map_err(|e| FormError::Config(format!("Regex compilation failed: {e}")))?;
        let mut map = ColumnMap {
            width: header.len(),
            ..Default::default()
        };

        let mut claimed = vec![false; header.len()];
        for (index, cell) in header.iter().enumerate() {
            let embedded = id_pattern
                .captures_iter(cell)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .find(|id| schema.field(id).is_some());
            if let Some(id) = embedded {
                map.fields.entry(id.to_string()).or_insert(index + 1);
                claimed[index] = true;
            }
        }

        // Exact meta labels anywhere in the header win over prefix matches.
        for (index, cell) in header.iter().enumerate() {
            if claimed[index] {
                continue;
            }
            if let Some(meta) = MetaColumn::ALL.into_iter().find(|m| m.matches_exactly(cell)) {
                if !map.meta.contains_key(&meta) {
                    map.meta.insert(meta, index + 1);
                    claimed[index] = true;
                }
            }
        }

        // A header spelling out a field label belongs to that field, never to a meta column.
        let field_labels: Vec<String> = schema
            .data_fields()
            .flat_map(|f| f.label.values().map(|l| l.trim().to_lowercase()))
            .collect();
        for (index, cell) in header.iter().enumerate() {
            if claimed[index] || field_labels.contains(&cell.trim().to_lowercase()) {
                continue;
            }
            let missing = MetaColumn::ALL
                .into_iter()
                .find(|m| !map.meta.contains_key(m) && m.matches_prefix(cell));
            if let Some(meta) = missing {
                map.meta.insert(meta, index + 1);
                claimed[index] = true;
            }
        }

        for field in schema.data_fields() {
            if map.fields.contains_key(&field.id) {
                continue;
            }
            if let Some(col) = unambiguous_label_column(header, schema, field, &map) {
                map.fields.insert(field.id.clone(), col);
            }
        }
        Ok(map)
    }
}

fn unambiguous_label_column(
    header: &[String],
    schema: &QuestionSchema,
    field: &FieldDef,
    map: &ColumnMap,
) -> Option<usize> {
    let labels: Vec<String> = field.label.values().map(|l| l.trim().to_lowercase()).collect();
    let candidates: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(index, cell)| {
            let col = index + 1;
            !map.meta.values().any(|c| *c == col)
                && !map.fields.values().any(|c| *c == col)
                && labels.contains(&cell.trim().to_lowercase())
        })
        .map(|(index, _)| index + 1)
        .collect();
    let [col] = candidates.as_slice() else {
        return None;
    };

    let header_text = header[col - 1].trim().to_lowercase();
    let owners = schema
        .data_fields()
        .filter(|f| f.label.values().any(|l| l.trim().to_lowercase() == header_text))
        .count();
    (owners == 1).then_some(*col)
}

/// The header cell written for a field column: `Label [ID]`.
pub fn field_header(field: &FieldDef) -> String {
    format!("{} [{}]", field.label_for("EN"), field.id)
}
