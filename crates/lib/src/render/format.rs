//! Text formatting of field values for documents and emails.

use crate::model::{format_number, FieldValue, QuestionType, Row, Scalar};

fn format_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => String::new(),
        Scalar::Bool(true) => "Yes".to_string(),
        Scalar::Bool(false) => "No".to_string(),
        Scalar::Number(n) => format_number(*n),
        Scalar::Text(s) => s.trim().to_string(),
    }
}

/// A row rendered as `key: value` pairs. Nested groups are left to their own path.
fn format_row(row: &Row) -> String {
    row.0
        .iter()
        .filter(|(_, value)| !matches!(value, FieldValue::Group(_)))
        .map(|(key, value)| (key, format_value(value, None)))
        .filter(|(_, text)| !text.is_empty())
        .map(|(key, text)| format!("{key}: {text}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Formats one stored value. Lists join with `", "`, group rows render as
/// `key: value` pairs one row per line.
pub fn format_value(value: &FieldValue, kind: Option<QuestionType>) -> String {
    match value {
        FieldValue::Scalar(Scalar::Text(s)) if kind == Some(QuestionType::Number) => {
            parse_number(value).map(format_number).unwrap_or_else(|| s.trim().to_string())
        }
        FieldValue::Scalar(scalar) => format_scalar(scalar),
        FieldValue::List(items) => items
            .iter()
            .map(format_scalar)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Group(rows) => rows
            .iter()
            .map(format_row)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn format_optional(value: Option<&FieldValue>, kind: Option<QuestionType>) -> String {
    value.map(|v| format_value(v, kind)).unwrap_or_default()
}

/// Reads a number, accepting a comma as the decimal separator.
pub fn parse_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Scalar(Scalar::Number(n)) => Some(*n),
        FieldValue::Scalar(Scalar::Text(s)) => {
            let cleaned: String = s.trim().chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
        }
        _ => None,
    }
}
