//! # Data Model
//!
//! Pure data shapes shared by every component: the question schema, records
//! with their tagged values, and the per-form definition that bundles a schema
//! with its dedup rules and follow-up configuration.

pub mod record;
pub mod schema;

pub use record::{format_number, FieldValue, Record, Row, Scalar};
pub use schema::{
    slugify, FieldDef, GroupEntry, GroupIndex, LineItemGroupSchema, LocalizedText, LookupRef,
    QuestionSchema, QuestionType, SubGroupSchema,
};

use serde::{Deserialize, Serialize};

use crate::dedup::DedupRule;
use crate::followup::FollowupConfig;

/// Everything the engine needs to know about one form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    pub schema: QuestionSchema,
    #[serde(default)]
    pub dedup_rules: Vec<DedupRule>,
    #[serde(default)]
    pub followup: Option<FollowupConfig>,
}

impl FormDefinition {
    pub fn new(schema: QuestionSchema) -> Self {
        Self {
            schema,
            dedup_rules: Vec::new(),
            followup: None,
        }
    }

    pub fn form_key(&self) -> &str {
        &self.schema.form_key
    }
}
