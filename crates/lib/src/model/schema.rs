//! # Question Schema
//!
//! The ordered field descriptors of a form, including the nested schemas of
//! repeating line-item groups. Field ids are the stable identity of a question;
//! labels are presentation only and may change between versions of a form.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::constants::LABEL_FALLBACK_LANGUAGES;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Text,
    Paragraph,
    Number,
    Date,
    Choice,
    Checkbox,
    File,
    LineItemGroup,
    Button,
}

impl QuestionType {
    /// Types whose stored value is a list of scalars.
    pub fn is_list(self) -> bool {
        matches!(self, QuestionType::Checkbox | QuestionType::File)
    }
}

/// Text keyed by an uppercase language tag (`EN`, `FR`, `NL`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocalizedText(pub BTreeMap<String, String>);

impl LocalizedText {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(lang, text)| (lang.to_uppercase(), text.to_string()))
                .collect(),
        )
    }

    /// Same text for every language.
    pub fn uniform(text: &str) -> Self {
        Self::new(&[("EN", text)])
    }

    /// Resolves `language`, then the EN → FR → NL chain. Empty strings count as missing.
    pub fn resolve(&self, language: &str) -> Option<&str> {
        std::iter::once(language.to_uppercase())
            .chain(LABEL_FALLBACK_LANGUAGES.iter().map(|l| l.to_string()))
            .find_map(|lang| {
                self.0
                    .get(&lang)
                    .map(String::as_str)
                    .filter(|text| !text.trim().is_empty())
            })
    }

    /// Like `resolve`, then any other language that has a text.
    pub fn resolve_any(&self, language: &str) -> Option<&str> {
        self.resolve(language)
            .or_else(|| self.values().find(|text| !text.trim().is_empty()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }
}

/// Declares that a field's stored value is a key into an external reference table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LookupRef {
    pub source: String,
    pub key_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub id: String,
    #[serde(default)]
    pub label: LocalizedText,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Present only for `LINE_ITEM_GROUP` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_item: Option<LineItemGroupSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupRef>,
}

impl FieldDef {
    pub fn new(id: &str, label: &str, kind: QuestionType) -> Self {
        Self {
            id: id.to_string(),
            label: LocalizedText::uniform(label),
            kind,
            line_item: None,
            lookup: None,
        }
    }

    pub fn group(id: &str, label: &str, group: LineItemGroupSchema) -> Self {
        Self {
            line_item: Some(group),
            ..Self::new(id, label, QuestionType::LineItemGroup)
        }
    }

    pub fn with_lookup(mut self, source: &str, key_column: &str) -> Self {
        self.lookup = Some(LookupRef {
            source: source.to_string(),
            key_column: key_column.to_string(),
        });
        self
    }

    pub fn label_for(&self, language: &str) -> &str {
        self.label.resolve(language).unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItemGroupSchema {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub sub_groups: Vec<SubGroupSchema>,
}

impl LineItemGroupSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self {
            fields,
            sub_groups: Vec::new(),
        }
    }

    pub fn with_sub_group(mut self, sub: SubGroupSchema) -> Self {
        self.sub_groups.push(sub);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubGroupSchema {
    /// Stable id. Older forms may lack one, in which case the row data is keyed
    /// by the label slug and the subgroup cannot be migrated.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: LocalizedText,
    #[serde(flatten)]
    pub group: LineItemGroupSchema,
}

impl SubGroupSchema {
    pub fn new(id: &str, label: &str, group: LineItemGroupSchema) -> Self {
        Self {
            id: Some(id.to_string()),
            label: LocalizedText::uniform(label),
            group,
        }
    }

    /// The key under which a parent row stores this subgroup's rows.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => slugify(self.label.resolve_any("EN").unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSchema {
    pub form_key: String,
    #[serde(default)]
    pub questions: Vec<FieldDef>,
}

impl QuestionSchema {
    pub fn new(form_key: &str, questions: Vec<FieldDef>) -> Self {
        Self {
            form_key: form_key.to_string(),
            questions,
        }
    }

    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Fields that occupy a column in the backing table (buttons hold no data).
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.questions
            .iter()
            .filter(|q| q.kind != QuestionType::Button)
    }

    /// Indexes every group and subgroup by its dotted path.
    pub fn group_index(&self) -> GroupIndex {
        let mut index = GroupIndex::default();
        for field in &self.questions {
            if let Some(group) = &field.line_item {
                index.collect(field.id.clone(), field.label.clone(), group);
            }
        }
        index
    }
}

/// A group schema reachable at one dotted path.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub path: String,
    pub label: LocalizedText,
    pub schema: LineItemGroupSchema,
}

/// Path-addressed view of all (sub)group schemas, e.g. `"ORDERS"`, `"ORDERS.ITEMS"`.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    entries: HashMap<String, GroupEntry>,
    order: Vec<String>,
}

impl GroupIndex {
    fn collect(&mut self, path: String, label: LocalizedText, group: &LineItemGroupSchema) {
        for sub in &group.sub_groups {
            self.collect(format!("{path}.{}", sub.key()), sub.label.clone(), &sub.group);
        }
        self.order.push(path.clone());
        self.entries.insert(
            path.clone(),
            GroupEntry {
                path,
                label,
                schema: group.clone(),
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<&GroupEntry> {
        self.entries.get(path)
    }

    /// Case-insensitive path resolution, so template tokens need not match casing.
    pub fn resolve(&self, path: &str) -> Option<&GroupEntry> {
        self.entries.get(path).or_else(|| {
            self.entries
                .values()
                .find(|entry| entry.path.eq_ignore_ascii_case(path))
        })
    }

    pub fn field(&self, path: &str, field_id: &str) -> Option<&FieldDef> {
        self.get(path)?
            .schema
            .fields
            .iter()
            .find(|f| f.id == field_id)
    }

    /// All paths, deepest first within each top-level group.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Builds the legacy placeholder key for a human label: uppercase words joined by `_`.
pub fn slugify(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}
