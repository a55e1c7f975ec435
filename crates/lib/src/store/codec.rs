//! Cell encoding: how records are laid out in table rows and read back.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::columns::{ColumnMap, MetaColumn};
use crate::constants::DEFAULT_LANGUAGE;
use crate::errors::FormError;
use crate::model::{FieldDef, FieldValue, QuestionSchema, QuestionType, Record, Scalar};

const LIST_SEPARATOR: &str = ", ";

/// Lists are written as `a, b` while no item contains a comma, and as a JSON
/// array otherwise so that `Salt, pepper` stays one item.
pub fn encode_value(value: &FieldValue) -> Result<String, FormError> {
    Ok(match value {
        FieldValue::Scalar(s) => s.as_text(),
        FieldValue::List(items) => {
            let texts: Vec<String> = items
                .iter()
                .map(Scalar::as_text)
                .filter(|s| !s.is_empty())
                .collect();
            if texts.iter().any(|t| t.contains(',') || t.starts_with('[')) {
                serde_json::to_string(&texts)?
            } else {
                texts.join(LIST_SEPARATOR)
            }
        }
        FieldValue::Group(rows) => serde_json::to_string(rows)?,
    })
}

/// Reads a cell back using the field's type. Empty cells yield `None`.
pub fn decode_value(field: &FieldDef, cell: &str) -> Option<FieldValue> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    let value = match field.kind {
        QuestionType::LineItemGroup => match serde_json::from_str::<FieldValue>(cell) {
            Ok(group @ FieldValue::Group(_)) => group,
            Ok(FieldValue::List(items)) if items.is_empty() => FieldValue::Group(Vec::new()),
            _ => {
                tracing::warn!(field = %field.id, "group cell is not a JSON row array; keeping text");
                FieldValue::text(cell)
            }
        },
        kind if kind.is_list() => match serde_json::from_str::<Vec<String>>(cell) {
            Ok(items) => FieldValue::List(items.iter().map(|s| Scalar::text(s)).collect()),
            Err(_) => FieldValue::List(
                cell.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Scalar::text)
                    .collect(),
            ),
        },
        QuestionType::Number => match cell.replace(',', ".").parse::<f64>() {
            Ok(n) => FieldValue::number(n),
            Err(_) => FieldValue::text(cell),
        },
        _ => FieldValue::text(cell),
    };
    Some(value)
}

/// Restores the variant a schema-driven table read would give. JSON cannot tell
/// an empty group from an empty list, so cached records come back with
/// `List([])` where the table yields `Group([])`.
pub fn conform_to_schema(record: &mut Record, schema: &QuestionSchema) {
    for field in schema.data_fields() {
        let Some(value) = record.values.get_mut(&field.id) else {
            continue;
        };
        if field.kind == QuestionType::LineItemGroup
            && matches!(value, FieldValue::List(items) if items.is_empty())
        {
            *value = FieldValue::Group(Vec::new());
        }
    }
}

fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(cell.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn cell_at(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|c| row.get(c - 1))
        .map(String::as_str)
        .unwrap_or_default()
}

fn non_empty(cell: &str) -> Option<String> {
    let cell = cell.trim();
    (!cell.is_empty()).then(|| cell.to_string())
}

/// Decodes a table row. Rows without a record id are blank and yield `None`.
///
/// `projection` limits the decoded values; an empty projection keeps every field.
pub fn row_to_record(
    row: &[String],
    columns: &ColumnMap,
    schema: &QuestionSchema,
    projection: &[String],
) -> Option<Record> {
    let id = non_empty(cell_at(row, columns.meta(MetaColumn::RecordId)))?;

    let mut values = BTreeMap::new();
    for field in schema.data_fields() {
        if !projection.is_empty() && !projection.contains(&field.id) {
            continue;
        }
        if let Some(value) = decode_value(field, cell_at(row, columns.field(&field.id))) {
            values.insert(field.id.clone(), value);
        }
    }

    Some(Record {
        id,
        language: non_empty(cell_at(row, columns.meta(MetaColumn::Language)))
            .map(|l| l.to_uppercase())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        created_at: parse_timestamp(cell_at(row, columns.meta(MetaColumn::CreatedAt))),
        updated_at: parse_timestamp(cell_at(row, columns.meta(MetaColumn::UpdatedAt))),
        status: non_empty(cell_at(row, columns.meta(MetaColumn::Status))),
        pdf_url: non_empty(cell_at(row, columns.meta(MetaColumn::PdfUrl))),
        values,
    })
}

/// Writes `record` over `base` (the existing row, or an empty one). Cells of
/// columns the schema does not know about are preserved.
pub fn record_to_row(
    record: &Record,
    columns: &ColumnMap,
    schema: &QuestionSchema,
    base: &[String],
) -> Result<Vec<String>, FormError> {
    let mut row = base.to_vec();
    row.resize(columns.width.max(base.len()), String::new());

    let mut put = |col: Option<usize>, value: String| {
        if let Some(col) = col {
            row[col - 1] = value;
        }
    };

    put(columns.meta(MetaColumn::RecordId), record.id.clone());
    put(
        columns.meta(MetaColumn::CreatedAt),
        record.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
    );
    put(
        columns.meta(MetaColumn::UpdatedAt),
        record.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
    );
    put(columns.meta(MetaColumn::Language), record.language.clone());
    put(
        columns.meta(MetaColumn::Status),
        record.status.clone().unwrap_or_default(),
    );
    put(
        columns.meta(MetaColumn::PdfUrl),
        record.pdf_url.clone().unwrap_or_default(),
    );

    for field in schema.data_fields() {
        let encoded = match record.value(&field.id) {
            Some(value) => encode_value(value)?,
            None => String::new(),
        };
        put(columns.field(&field.id), encoded);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, LineItemGroupSchema, Row};

    #[test]
    fn test_group_cell_round_trips_nested_rows() {
        let group = FieldDef::group(
            "ITEMS",
            "Items",
            LineItemGroupSchema::new(vec![FieldDef::new("NAME", "Name", QuestionType::Text)]),
        );
        let value = FieldValue::Group(vec![Row::new()
            .with("NAME", FieldValue::text("Soup"))
            .with(
                "EXTRAS",
                FieldValue::Group(vec![Row::new().with("NAME", FieldValue::text("Bread"))]),
            )]);

        let cell = encode_value(&value).unwrap();
        assert_eq!(decode_value(&group, &cell), Some(value));
    }

    #[test]
    fn test_checkbox_and_number_cells() {
        let checkbox = FieldDef::new("ALLERGENS", "Allergens", QuestionType::Checkbox);
        let number = FieldDef::new("QTY", "Quantity", QuestionType::Number);

        assert_eq!(
            decode_value(&checkbox, "Milk, Peanuts"),
            Some(FieldValue::list(&["Milk", "Peanuts"]))
        );
        assert_eq!(decode_value(&number, "2,5"), Some(FieldValue::number(2.5)));
        assert_eq!(decode_value(&number, "  "), None);
    }

    #[test]
    fn test_list_items_with_commas_stay_whole() {
        let checkbox = FieldDef::new("SEASONING", "Seasoning", QuestionType::Checkbox);
        let value = FieldValue::list(&["Salt, pepper", "Chili"]);

        let cell = encode_value(&value).unwrap();

        assert_eq!(cell, r#"["Salt, pepper","Chili"]"#);
        assert_eq!(decode_value(&checkbox, &cell), Some(value));
        assert_eq!(
            encode_value(&FieldValue::list(&["Milk", "Peanuts"])).unwrap(),
            "Milk, Peanuts"
        );
    }

    #[test]
    fn test_cached_empty_group_conforms_to_schema() {
        let schema = QuestionSchema::new(
            "orders",
            vec![
                FieldDef::group(
                    "ITEMS",
                    "Items",
                    LineItemGroupSchema::new(vec![FieldDef::new("NAME", "Name", QuestionType::Text)]),
                ),
                FieldDef::new("TAGS", "Tags", QuestionType::Checkbox),
            ],
        );
        let record = Record::new("EN")
            .with_id("r1")
            .with_value("ITEMS", FieldValue::Group(Vec::new()))
            .with_value("TAGS", FieldValue::list(&["Vegan"]));

        let mut cached: Record = serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(cached.value("ITEMS"), Some(&FieldValue::List(Vec::new())));
        conform_to_schema(&mut cached, &schema);

        assert_eq!(cached, record);
    }
}
