//! # Duplicate Submission Rules
//!
//! Declarative composite-key uniqueness constraints evaluated before a write.
//! Evaluation is first-match and short-circuiting: it gates one write, it does
//! not audit the dataset.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::errors::FormError;
use crate::model::{FieldValue, LocalizedText, Record};

/// Joins key components; chosen so it cannot appear in a normalized value by accident.
const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    Exact,
    CaseInsensitive,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Ignore,
    /// Declared by form authors but never implemented; evaluated as `Reject`.
    Merge,
}

impl FromStr for MatchMode {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "" | "exact" => Ok(MatchMode::Exact),
            "caseinsensitive" => Ok(MatchMode::CaseInsensitive),
            other => Err(FormError::Config(format!("unknown dedup match mode '{other}'"))),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "reject" => Ok(ConflictPolicy::Reject),
            "ignore" => Ok(ConflictPolicy::Ignore),
            "merge" => Ok(ConflictPolicy::Merge),
            other => Err(FormError::Config(format!(
                "unknown dedup conflict policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DedupRule {
    pub id: String,
    /// Informational scope tag (e.g. `form`); carried through, not interpreted.
    #[serde(default)]
    pub scope: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
    #[serde(default)]
    pub message: LocalizedText,
}

impl DedupRule {
    /// Parses one configuration row:
    /// `id, scope, "KEY_A,KEY_B", matchMode, onConflict, message`.
    ///
    /// The message cell is either plain text (used for every language) or a JSON
    /// object keyed by language tag.
    pub fn from_config_row(cells: &[String]) -> Result<Self, FormError> {
        let cell = |i: usize| cells.get(i).map(|c| c.trim()).unwrap_or_default();

        let id = cell(0);
        if id.is_empty() {
            return Err(FormError::Config("dedup rule without an id".to_string()));
        }
        let keys: Vec<String> = cell(2)
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            return Err(FormError::Config(format!("dedup rule '{id}' has no key fields")));
        }

        let raw_message = cell(5);
        let message = if raw_message.starts_with('{') {
            serde_json::from_str(raw_message)?
        } else {
            LocalizedText::uniform(raw_message)
        };

        Ok(Self {
            id: id.to_string(),
            scope: cell(1).to_string(),
            keys,
            match_mode: cell(3).parse()?,
            on_conflict: cell(4).parse()?,
            message,
        })
    }

    /// Builds the normalized composite key, or `None` when any component is empty.
    fn composite_key(&self, record: &Record) -> Option<String> {
        let mut parts = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let raw = record.value(key).map(normalize_value).unwrap_or_default();
            let normalized = match self.match_mode {
                MatchMode::Exact => raw,
                MatchMode::CaseInsensitive => raw.to_lowercase(),
            };
            if normalized.is_empty() {
                return None;
            }
            parts.push(normalized);
        }
        Some(parts.join(KEY_SEPARATOR))
    }

    fn localized_message(&self, language: &str) -> String {
        self.message
            .resolve_any(language)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Duplicate submission ({})", self.id))
    }
}

fn normalize_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(s) => s.as_text().trim().to_string(),
        FieldValue::List(items) => items
            .iter()
            .map(|i| i.as_text().trim().to_string())
            .filter(|i| !i.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        // Groups are not meaningful key material.
        FieldValue::Group(_) => String::new(),
    }
}

/// The outcome of a rule match that blocks the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConflict {
    pub rule_id: String,
    pub message: String,
}

impl From<DedupConflict> for FormError {
    fn from(conflict: DedupConflict) -> Self {
        FormError::Conflict {
            rule_id: conflict.rule_id,
            message: conflict.message,
        }
    }
}

/// Checks `candidate` against `existing` records.
///
/// Rules run in declared order. The first existing record (with a different id)
/// whose composite key equals the candidate's decides: `reject` and `merge`
/// return the rule's message and stop, `ignore` allows the write and stops.
pub fn evaluate(
    rules: &[DedupRule],
    candidate: &Record,
    existing: &[Record],
    language: &str,
) -> Option<DedupConflict> {
    for rule in rules {
        let Some(key) = rule.composite_key(candidate) else {
            continue;
        };
        let clash = existing
            .iter()
            .filter(|other| other.id != candidate.id)
            .find(|other| rule.composite_key(other).as_deref() == Some(key.as_str()));

        if let Some(other) = clash {
            debug!(rule = %rule.id, existing = %other.id, "dedup key matched");
            return match rule.on_conflict {
                ConflictPolicy::Ignore => None,
                ConflictPolicy::Reject | ConflictPolicy::Merge => Some(DedupConflict {
                    rule_id: rule.id.clone(),
                    message: rule.localized_message(language),
                }),
            };
        }
    }
    None
}
