//! # Document Capability
//!
//! Template documents live outside the engine (a drive, a docs service, a
//! directory of JSON files). The migrator and the follow-up orchestrator reach
//! them only through `DocumentStore`.

use async_trait::async_trait;
use dyn_clone::DynClone;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::FormError;
use crate::render::TemplateDocument;

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + DynClone {
    /// Loads a document. A missing id is `FormError::NotFound`.
    async fn fetch(&self, id: &str) -> Result<TemplateDocument, FormError>;

    /// Replaces the stored document with the same id.
    async fn save(&self, document: &TemplateDocument) -> Result<(), FormError>;
}

dyn_clone::clone_trait_object!(DocumentStore);

/// In-process document store. Clones share documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, TemplateDocument>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, document: TemplateDocument) {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, id: &str) -> Result<TemplateDocument, FormError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FormError::NotFound(format!("document '{id}'")))
    }

    async fn save(&self, document: &TemplateDocument) -> Result<(), FormError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(document.clone()).await;
        Ok(())
    }
}
