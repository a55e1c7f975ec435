//! A `DocumentStore` over a directory of JSON files, one `{id}.json` per template.

use anyform::providers::documents::DocumentStore;
use anyform::{FormError, TemplateDocument};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonFileDocumentStore {
    dir: PathBuf,
}

impl JsonFileDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Splits a template path into its store and document id.
    pub fn for_file(path: &Path) -> Result<(Self, String), FormError> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FormError::Config(format!("invalid template path '{}'", path.display())))?
            .to_string();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((Self::new(dir), id))
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn fetch(&self, id: &str) -> Result<TemplateDocument, FormError> {
        let path = self.path_for(id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| FormError::NotFound(format!("document '{id}'")))?;
        let mut document: TemplateDocument = serde_json::from_str(&content)?;
        if document.id.is_empty() {
            document.id = id.to_string();
        }
        Ok(document)
    }

    async fn save(&self, document: &TemplateDocument) -> Result<(), FormError> {
        let path = self.path_for(&document.id);
        let content = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&path, content).await.map_err(|e| {
            FormError::ExternalResource(format!("cannot write '{}': {e}", path.display()))
        })?;
        info!("Saved template document to '{}'", path.display());
        Ok(())
    }
}
