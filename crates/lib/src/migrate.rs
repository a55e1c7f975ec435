//! # Template Migrator
//!
//! Older templates address fields by a slug of their label (`{{FULL_NAME}}`)
//! instead of the field id (`{{NAME}}`). Labels change and collide, ids do not,
//! so the migrator rewrites every label slug it can map to exactly one id.
//!
//! A slug is never guessed: when two ids share a slug, or a slug is itself
//! the id of a different field, the key is left alone and reported as a
//! warning. Running the migrator on its own output changes nothing.

use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::errors::FormError;
use crate::model::{slugify, FieldDef, LineItemGroupSchema, LocalizedText, QuestionSchema};
use crate::providers::documents::DocumentStore;
use crate::render::TemplateDocument;

/// Wrapper names that take a key argument: `{{NAME(key)}}`.
pub const WRAPPERS: [&str; 6] = [
    "LABEL",
    "SUM",
    "COUNT",
    "CONSOLIDATED",
    "GROUP_TABLE",
    "ROW_TABLE",
];

/// Rewrite counter key for tokens without a wrapper.
pub const PLAIN: &str = "plain";

static LEGACY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?:([A-Za-z_]+)\(\s*([^(){}]+?)\s*\)|([^(){}]+?))\s*\}\}")
        .expect("legacy token pattern is a valid regex")
});

/// Outcome of one migration run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    pub warnings: Vec<String>,
    /// Number of tokens rewritten per wrapper (`plain`, `LABEL`, `SUM`, ...).
    pub rewrites: BTreeMap<String, usize>,
    /// The migrated document (unchanged when nothing was rewritten).
    #[serde(skip)]
    pub document: TemplateDocument,
}

impl MigrationReport {
    pub fn total_rewrites(&self) -> usize {
        self.rewrites.values().sum()
    }
}

/// Legacy key → canonical key, plus the keys that were deliberately skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    mapping: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl MigrationPlan {
    /// Canonical key for a legacy token body, matched without regard to case.
    pub fn canonical(&self, legacy: &str) -> Option<&str> {
        self.mapping
            .get(&legacy.trim().to_uppercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

#[derive(Default)]
struct Candidates {
    /// Legacy key (uppercase) → canonical keys it could stand for.
    legacy: BTreeMap<String, BTreeSet<String>>,
    /// Every canonical key (uppercase) → its real spelling.
    canonical: BTreeMap<String, String>,
    warnings: Vec<String>,
}

impl Candidates {
    fn add_canonical(&mut self, key: &str) {
        self.canonical.insert(key.to_uppercase(), key.to_string());
    }

    /// Registers every language's label slug of `label` as a legacy name of
    /// `canonical`, each slug optionally prefixed by the legacy parent prefixes.
    fn add_labels(&mut self, prefixes: &[String], label: &LocalizedText, canonical: &str) {
        for text in label.values() {
            let slug = slugify(text);
            if slug.is_empty() {
                continue;
            }
            for prefix in prefixes {
                let key = if prefix.is_empty() {
                    slug.clone()
                } else {
                    format!("{prefix}.{slug}")
                };
                self.legacy
                    .entry(key.to_uppercase())
                    .or_default()
                    .insert(canonical.to_string());
            }
        }
    }

    fn add_group_fields(&mut self, prefixes: &[String], path: &str, group: &LineItemGroupSchema) {
        for field in &group.fields {
            let canonical = format!("{path}.{}", field.id);
            self.add_canonical(&canonical);
            self.add_labels(prefixes, &field.label, &canonical);
        }
    }

    /// Legacy spellings of a group path: its canonical path and every label slug.
    fn path_prefixes(parent_prefixes: &[String], canonical: &str, label: &LocalizedText) -> Vec<String> {
        let mut prefixes = vec![canonical.to_string()];
        for text in label.values() {
            let slug = slugify(text);
            if slug.is_empty() {
                continue;
            }
            for parent in parent_prefixes {
                let prefix = if parent.is_empty() {
                    slug.clone()
                } else {
                    format!("{parent}.{slug}")
                };
                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }
        prefixes
    }

    fn add_field(&mut self, field: &FieldDef) {
        self.add_canonical(&field.id);
        self.add_labels(&[String::new()], &field.label, &field.id);

        let Some(group) = &field.line_item else {
            return;
        };
        let group_prefixes = Self::path_prefixes(&[String::new()], &field.id, &field.label);
        self.add_group_fields(&group_prefixes, &field.id, group);
        self.add_sub_groups(&group_prefixes, &field.id, group);
    }

    /// Subgroups at every depth, the way the group index addresses them.
    fn add_sub_groups(&mut self, parent_prefixes: &[String], parent_path: &str, group: &LineItemGroupSchema) {
        for sub in &group.sub_groups {
            let Some(sub_id) = sub.id.as_deref().filter(|id| !id.trim().is_empty()) else {
                let label = sub.label.resolve_any("EN").unwrap_or_default();
                self.warnings.push(format!(
                    "Subgroup '{label}' of '{parent_path}' has no id and cannot be migrated"
                ));
                continue;
            };
            let sub_path = format!("{parent_path}.{sub_id}");
            self.add_canonical(&sub_path);
            self.add_labels(parent_prefixes, &sub.label, &sub_path);

            let sub_prefixes = Self::path_prefixes(parent_prefixes, &sub_path, &sub.label);
            self.add_group_fields(&sub_prefixes, &sub_path, &sub.group);
            self.add_sub_groups(&sub_prefixes, &sub_path, &sub.group);
        }
    }

    fn into_plan(mut self) -> MigrationPlan {
        let mut mapping = BTreeMap::new();
        for (legacy, targets) in &self.legacy {
            if targets.len() > 1 {
                let ids: Vec<&str> = targets.iter().map(String::as_str).collect();
                self.warnings.push(format!(
                    "Legacy key '{legacy}' matches several fields ({}); left unchanged",
                    ids.join(", ")
                ));
                continue;
            }
            let Some(target) = targets.iter().next() else {
                continue;
            };
            if legacy.eq_ignore_ascii_case(target) {
                continue;
            }
            if let Some(other) = self.canonical.get(legacy) {
                self.warnings.push(format!(
                    "Legacy key '{legacy}' is also the id of '{other}'; left unchanged"
                ));
                continue;
            }
            mapping.insert(legacy.clone(), target.clone());
        }
        MigrationPlan {
            mapping,
            warnings: self.warnings,
        }
    }
}

/// Builds the legacy → canonical mapping for a schema.
pub fn plan(schema: &QuestionSchema) -> MigrationPlan {
    let mut candidates = Candidates::default();
    for field in schema.data_fields() {
        candidates.add_field(field);
    }
    candidates.into_plan()
}

/// Rewrites one text segment, counting rewrites per wrapper.
fn rewrite_text(text: &str, plan: &MigrationPlan, rewrites: &mut BTreeMap<String, usize>) -> String {
    LEGACY_TOKEN
        .replace_all(text, |caps: &Captures| {
            let original = caps[0].to_string();
            let (wrapper, key) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(wrapper), Some(key), _) => (Some(wrapper.as_str().to_uppercase()), key.as_str()),
                (_, _, Some(key)) => (None, key.as_str()),
                _ => return original,
            };
            if wrapper.as_deref().is_some_and(|w| !WRAPPERS.contains(&w)) {
                return original;
            }
            let Some(canonical) = plan.canonical(key) else {
                return original;
            };
            let (counter, replacement) = match &wrapper {
                Some(w) => (w.clone(), format!("{{{{{w}({canonical})}}}}")),
                None => (PLAIN.to_string(), format!("{{{{{canonical}}}}}")),
            };
            if replacement == original {
                return original;
            }
            *rewrites.entry(counter).or_default() += 1;
            replacement
        })
        .into_owned()
}

/// Applies `plan` to every paragraph and table cell of the header, body and footer.
pub fn migrate_document(
    document: &TemplateDocument,
    plan: &MigrationPlan,
) -> (TemplateDocument, BTreeMap<String, usize>) {
    let mut migrated = document.clone();
    let mut rewrites = BTreeMap::new();
    for segment in migrated.text_segments_mut() {
        *segment = rewrite_text(segment, plan, &mut rewrites);
    }
    (migrated, rewrites)
}

/// Fetches `document_id`, migrates it against `schema` and saves it back when
/// anything changed (never when `dry_run`).
///
/// A missing document is an error. Ambiguous keys are warnings in a still
/// successful report. A failed save yields `success: false`.
pub async fn migrate_template(
    schema: &QuestionSchema,
    documents: &dyn DocumentStore,
    document_id: &str,
    dry_run: bool,
) -> Result<MigrationReport, FormError> {
    let document = documents.fetch(document_id).await?;
    let plan = plan(schema);
    let (migrated, rewrites) = migrate_document(&document, &plan);

    let mut report = MigrationReport {
        success: true,
        warnings: plan.warnings.clone(),
        rewrites,
        document: migrated,
    };
    for warning in &report.warnings {
        warn!(form = %schema.form_key, "{warning}");
    }

    let total = report.total_rewrites();
    info!(
        form = %schema.form_key,
        document = %document_id,
        rewrites = total,
        dry_run,
        "template migration finished"
    );
    if total > 0 && !dry_run {
        if let Err(e) = documents.save(&report.document).await {
            warn!(document = %document_id, "failed to save migrated template: {e}");
            report.success = false;
            report
                .warnings
                .push(format!("Migrated document could not be saved: {e}"));
        }
    }
    Ok(report)
}
