//! # Rendering
//!
//! Turns a record into text: flattening its line items, building the
//! placeholder map and filling a template document.

pub mod document;
pub mod flatten;
pub mod format;
pub mod lookup;
pub mod placeholders;

pub use document::{Block, RenderContext, Table, TemplateDocument};
pub use flatten::{flatten, FlatRow, FlattenedRowSet, ParentRef};
pub use format::{format_optional, format_value, parse_number};
pub use lookup::{LookupError, ReferenceLookup, ReferenceRow, ReferenceTable, ReferenceTables};
pub use placeholders::{build_placeholders, PlaceholderMap};

use tracing::debug;

use crate::model::{QuestionSchema, Record};

/// Fills `template` for `record` in one call.
pub fn render_document(
    template: &TemplateDocument,
    record: &Record,
    schema: &QuestionSchema,
    lookup: Option<&dyn ReferenceLookup>,
) -> TemplateDocument {
    let rows = flatten(record, schema);
    let placeholders = build_placeholders(record, schema, &rows, lookup);
    debug!(
        template = %template.id,
        record = %record.id,
        tokens = placeholders.len(),
        "rendering document"
    );
    RenderContext::new(schema, &rows, &placeholders, &record.language).render(template)
}
