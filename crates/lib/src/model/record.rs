//! # Records and Field Values
//!
//! A record is one submitted form instance. Values are a tagged variant so the
//! recursion through nested line-item groups is structural: a group value is a
//! sequence of rows, and a row is itself a mapping that may hold further groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_LANGUAGE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn text(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Plain textual form, used for storage and for dedup keys.
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => format_number(*n),
            Scalar::Text(s) => s.clone(),
        }
    }
}

/// One child row of a line-item group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Row(pub BTreeMap<String, FieldValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: FieldValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Group(Vec<Row>),
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        FieldValue::Scalar(Scalar::text(value))
    }

    pub fn number(value: f64) -> Self {
        FieldValue::Scalar(Scalar::Number(value))
    }

    pub fn list(values: &[&str]) -> Self {
        FieldValue::List(values.iter().map(|v| Scalar::text(v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty(),
            FieldValue::List(items) => items.iter().all(Scalar::is_empty),
            FieldValue::Group(rows) => rows.is_empty(),
        }
    }

    /// Child rows when this is a group value. An empty list is an empty group:
    /// JSON cannot tell `[]` apart.
    pub fn rows(&self) -> &[Row] {
        match self {
            FieldValue::Group(rows) => rows,
            _ => &[],
        }
    }
}

/// A submitted form instance as seen by callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, FieldValue>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Record {
    /// A new, unsaved record. An empty id makes the store generate one.
    pub fn new(language: &str) -> Self {
        Self {
            id: String::new(),
            language: language.to_uppercase(),
            created_at: None,
            updated_at: None,
            status: None,
            pdf_url: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_value(mut self, field_id: &str, value: FieldValue) -> Self {
        self.values.insert(field_id.to_string(), value);
        self
    }

    pub fn value(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }
}

/// Renders a number without binary float tails: integers lose the fraction,
/// everything else is rounded to two decimals with trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        let text = format!("{rounded:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
