//! # Line-Item Flattener
//!
//! Expands every line-item group of a record, at every depth, into per-path row
//! sequences: `"ORDERS"`, `"ORDERS.ITEMS"`, `"ORDERS.ITEMS.EXTRAS"`, ... Each child
//! row keeps a `(path, index)` back-reference into the sequence of its parent
//! row. The reference is an index into this arena, never an owning pointer.

use std::collections::BTreeMap;

use crate::model::{FieldValue, LineItemGroupSchema, QuestionSchema, Record, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub path: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    /// The row's own values. Nested group values stay in place but are also
    /// expanded under their own path.
    pub values: Row,
    pub parent: Option<ParentRef>,
}

impl FlatRow {
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedRowSet {
    paths: BTreeMap<String, Vec<FlatRow>>,
}

impl FlattenedRowSet {
    pub fn rows(&self, path: &str) -> &[FlatRow] {
        self.paths.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn row(&self, path: &str, index: usize) -> Option<&FlatRow> {
        self.paths.get(path)?.get(index)
    }

    /// Every flattened path, including those with zero rows.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Finds the known path matching `path` case-insensitively.
    pub fn resolve_path(&self, path: &str) -> Option<&str> {
        if let Some((key, _)) = self.paths.get_key_value(path) {
            return Some(key.as_str());
        }
        self.paths
            .keys()
            .find(|key| key.eq_ignore_ascii_case(path))
            .map(String::as_str)
    }

    /// Walks parent references from `(path, index)` up to the ancestor living at
    /// `ancestor_path`. Returns that ancestor's index.
    pub fn ancestor_index(&self, path: &str, index: usize, ancestor_path: &str) -> Option<usize> {
        if path == ancestor_path {
            return Some(index);
        }
        let parent = self.row(path, index)?.parent.as_ref()?;
        self.ancestor_index(&parent.path, parent.index, ancestor_path)
    }

    /// Resolves `field_id` on the row at `(path, index)` or, failing that, on
    /// the row at `field_path` among its ancestors.
    pub fn scoped_value(
        &self,
        path: &str,
        index: usize,
        field_path: &str,
        field_id: &str,
    ) -> Option<&FieldValue> {
        let ancestor = self.ancestor_index(path, index, field_path)?;
        self.row(field_path, ancestor)?.get(field_id)
    }
}

/// Builds the flattened row set for `record`. Every group and subgroup of the
/// schema gets a path entry, even when it holds no rows.
pub fn flatten(record: &Record, schema: &QuestionSchema) -> FlattenedRowSet {
    let mut set = FlattenedRowSet::default();
    for field in &schema.questions {
        let Some(group) = &field.line_item else {
            continue;
        };
        let rows = record.value(&field.id).map(FieldValue::rows).unwrap_or_default();
        expand(&mut set, &field.id, group, rows.iter().map(|row| (row, None)));
    }
    set
}

fn expand<'a>(
    set: &mut FlattenedRowSet,
    path: &str,
    group: &LineItemGroupSchema,
    rows: impl Iterator<Item = (&'a Row, Option<ParentRef>)>,
) {
    let start = set.paths.entry(path.to_string()).or_default().len();
    let mut added: Vec<&'a Row> = Vec::new();
    for (row, parent) in rows {
        set.paths.entry(path.to_string()).or_default().push(FlatRow {
            values: row.clone(),
            parent,
        });
        added.push(row);
    }

    for sub in &group.sub_groups {
        let key = sub.key();
        let sub_path = format!("{path}.{key}");
        let children: Vec<(&'a Row, Option<ParentRef>)> = added
            .iter()
            .copied()
            .enumerate()
            .flat_map(|(offset, row)| {
                let parent = ParentRef {
                    path: path.to_string(),
                    index: start + offset,
                };
                row.get(&key)
                    .map(FieldValue::rows)
                    .unwrap_or_default()
                    .iter()
                    .map(move |child| (child, Some(parent.clone())))
            })
            .collect();
        expand(set, &sub_path, &sub.group, children.into_iter());
    }
}
