//! # Form Submission Engine
//!
//! This crate stores form submissions in a spreadsheet-like table, rejects
//! duplicate submissions by declarative rules, renders records into template
//! documents, migrates legacy templates to id-based placeholders and runs the
//! follow-up actions (PDF, email, close) of a submission.
//!
//! Every component talks to the outside world through capabilities
//! (`TableAccessor`, `CacheBackend`, `DocumentStore`, `PdfRenderer`, `Mailer`),
//! so the same logic runs over Google Sheets, CSV files or in-memory fakes.

pub mod config;
pub mod constants;
pub mod dedup;
pub mod errors;
pub mod followup;
pub mod migrate;
pub mod model;
pub mod providers;
pub mod render;
pub mod store;

pub use config::EngineConfig;
pub use dedup::{ConflictPolicy, DedupConflict, DedupRule, MatchMode};
pub use errors::FormError;
pub use followup::{
    FollowupAction, FollowupConfig, FollowupOrchestrator, FollowupResult, Mailer, PdfRenderer,
};
pub use migrate::{migrate_template, MigrationReport};
pub use model::{FieldDef, FieldValue, FormDefinition, QuestionSchema, QuestionType, Record, Row};
pub use providers::cache::{CacheBackend, MemoryCache, UnavailableCache};
pub use providers::documents::{DocumentStore, MemoryDocumentStore};
pub use providers::table::{MemoryTable, TableAccessor, TableError};
pub use render::{render_document, TemplateDocument};
pub use store::{ListPage, SubmissionStore, UpsertOutcome};
