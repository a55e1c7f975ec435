#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared fixtures for the integration tests: a representative form schema,
//! store builders over in-memory capabilities, and mock follow-up collaborators
//! that record their calls.

use anyform::errors::FormError;
use anyform::followup::{EmailMessage, Mailer, PdfRenderer, RenderedFile};
use anyform::model::{
    FieldDef, FieldValue, FormDefinition, LineItemGroupSchema, QuestionSchema, QuestionType,
    Record, Row, SubGroupSchema,
};
use anyform::providers::cache::CacheBackend;
use anyform::render::TemplateDocument;
use anyform::{EngineConfig, MemoryCache, MemoryTable, SubmissionStore};
use async_trait::async_trait;
use dotenvy::dotenv;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// --- Fixtures ---

/// A catering order form: a few scalar fields and an `ORDERS` line-item group
/// whose rows hold an `EXTRAS` subgroup.
pub fn catering_schema() -> QuestionSchema {
    let extras = LineItemGroupSchema::new(vec![FieldDef::new(
        "NOTE",
        "Extra note",
        QuestionType::Text,
    )]);
    let orders = LineItemGroupSchema::new(vec![
        FieldDef::new("ITEM", "Dish", QuestionType::Text),
        FieldDef::new("CATEGORY", "Category", QuestionType::Choice),
        FieldDef::new("QTY", "Quantity", QuestionType::Number),
        FieldDef::new("ALLERGEN", "Allergen", QuestionType::Text),
    ])
    .with_sub_group(SubGroupSchema::new("EXTRAS", "Extras", extras));

    QuestionSchema::new(
        "catering",
        vec![
            FieldDef::new("NAME", "Customer name", QuestionType::Text),
            FieldDef::new("DISH", "Main dish", QuestionType::Text),
            FieldDef::new("EMAIL", "Contact email", QuestionType::Text),
            FieldDef::new("SITE", "Site", QuestionType::Choice).with_lookup("sites", "Site"),
            FieldDef::group("ORDERS", "Orders", orders),
            FieldDef::new("SUBMIT", "Submit", QuestionType::Button),
        ],
    )
}

pub fn catering_form() -> FormDefinition {
    FormDefinition::new(catering_schema())
}

/// One order line.
pub fn order(item: &str, category: &str, qty: &str, allergen: &str) -> Row {
    Row::new()
        .with("ITEM", FieldValue::text(item))
        .with("CATEGORY", FieldValue::text(category))
        .with("QTY", FieldValue::text(qty))
        .with("ALLERGEN", FieldValue::text(allergen))
}

pub fn customer(id: &str, name: &str, dish: &str) -> Record {
    Record::new("EN")
        .with_id(id)
        .with_value("NAME", FieldValue::text(name))
        .with_value("DISH", FieldValue::text(dish))
}

/// A store over a fresh in-memory table and cache. The returned handles share
/// state with the store so tests can inspect them.
pub fn memory_store() -> (SubmissionStore, MemoryTable, MemoryCache) {
    let table = MemoryTable::new("submissions");
    let cache = MemoryCache::new();
    let store = SubmissionStore::new(
        Box::new(table.clone()),
        Box::new(cache.clone()),
        EngineConfig::default(),
    );
    (store, table, cache)
}

pub fn store_with_cache(table: &MemoryTable, cache: Box<dyn CacheBackend>) -> SubmissionStore {
    SubmissionStore::new(Box::new(table.clone()), cache, EngineConfig::default())
}

/// A table with the canonical header and `count` records `r1..=rN`.
pub fn seeded_table(count: usize) -> MemoryTable {
    let mut rows = vec![vec![
        "Record ID".to_string(),
        "Language".to_string(),
        "Customer name [NAME]".to_string(),
    ]];
    for i in 1..=count {
        rows.push(vec![format!("r{i}"), "EN".to_string(), format!("Customer {i}")]);
    }
    MemoryTable::from_rows("seeded", rows)
}

pub fn paragraph_document(id: &str, text: &str) -> TemplateDocument {
    TemplateDocument {
        id: id.to_string(),
        title: "Order".to_string(),
        body: vec![anyform::render::Block::Paragraph(text.to_string())],
        ..Default::default()
    }
}

// --- Mock PDF Renderer ---

#[derive(Clone, Debug, Default)]
pub struct MockPdfRenderer {
    pub calls: Arc<Mutex<Vec<(TemplateDocument, String)>>>,
}

impl MockPdfRenderer {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PdfRenderer for MockPdfRenderer {
    async fn render_pdf(
        &self,
        document: &TemplateDocument,
        file_name: &str,
    ) -> Result<RenderedFile, FormError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((document.clone(), file_name.to_string()));
        Ok(RenderedFile {
            url: format!("https://files.example.com/{file_name}-{}.pdf", calls.len()),
            file_id: Some(format!("file-{}", calls.len())),
        })
    }
}

// --- Mock Mailers ---

#[derive(Clone, Debug, Default)]
pub struct MockMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), FormError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A mail relay that is down.
#[derive(Clone, Debug, Default)]
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), FormError> {
        Err(FormError::ExternalResource(
            "SMTP relay refused connection: 421 smtp.internal".to_string(),
        ))
    }
}
