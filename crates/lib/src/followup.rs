//! # Follow-up Orchestrator
//!
//! Runs the actions that happen after a submission: rendering a PDF, emailing
//! it and closing the record. Each action writes its configured status back to
//! the record through the store, which refreshes the cached copy.
//!
//! ```text
//! Open --CREATE_PDF--> PdfReady --SEND_EMAIL--> Emailed --CLOSE_RECORD--> Closed
//! ```
//!
//! The order is not enforced. Each action is idempotent for its own effect:
//! a PDF rendered from a static template is reused rather than rendered again.

use async_trait::async_trait;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::FormError;
use crate::model::{FormDefinition, LocalizedText, Record};
use crate::providers::documents::DocumentStore;
use crate::render::{
    build_placeholders, flatten, format_optional, ReferenceLookup, RenderContext,
    TemplateDocument,
};
use crate::store::SubmissionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowupAction {
    CreatePdf,
    SendEmail,
    CloseRecord,
}

impl FollowupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowupAction::CreatePdf => "CREATE_PDF",
            FollowupAction::SendEmail => "SEND_EMAIL",
            FollowupAction::CloseRecord => "CLOSE_RECORD",
        }
    }
}

impl fmt::Display for FollowupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowupAction {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE_PDF" => Ok(FollowupAction::CreatePdf),
            "SEND_EMAIL" => Ok(FollowupAction::SendEmail),
            "CLOSE_RECORD" => Ok(FollowupAction::CloseRecord),
            other => Err(FormError::NotFound(format!("follow-up action '{other}'"))),
        }
    }
}

// --- Configuration ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PdfSourceKind {
    /// The template does not depend on record state beyond its values at first
    /// render, so an existing PDF is reused.
    #[default]
    StaticTemplate,
    /// Regenerated on every run.
    Dynamic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfSource {
    #[serde(default)]
    pub kind: PdfSourceKind,
    /// Template document id per language.
    pub templates: LocalizedText,
    /// File name, placeholders allowed. Defaults to the record id.
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSource {
    /// Body template document id per language.
    pub templates: LocalizedText,
    /// Subject per language, placeholders allowed.
    #[serde(default)]
    pub subject: LocalizedText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecipientEntry {
    /// A fixed address.
    Literal { address: String },
    /// Addresses stored in a record field (comma separated or a list).
    Field { field: String },
    /// The record field value is a key into a reference source; the address
    /// is read from `email_column` of the matched row.
    #[serde(rename_all = "camelCase")]
    Lookup {
        field: String,
        source: String,
        key_column: String,
        email_column: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusValues {
    #[serde(default = "default_pdf_ready")]
    pub pdf_ready: String,
    #[serde(default = "default_emailed")]
    pub emailed: String,
    #[serde(default = "default_closed")]
    pub closed: String,
}

fn default_pdf_ready() -> String {
    "PDF ready".to_string()
}

fn default_emailed() -> String {
    "Emailed".to_string()
}

fn default_closed() -> String {
    "Closed".to_string()
}

impl Default for StatusValues {
    fn default() -> Self {
        Self {
            pdf_ready: default_pdf_ready(),
            emailed: default_emailed(),
            closed: default_closed(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupConfig {
    #[serde(default)]
    pub pdf: Option<PdfSource>,
    #[serde(default)]
    pub email: Option<EmailSource>,
    #[serde(default)]
    pub recipients: Vec<RecipientEntry>,
    /// Used only when `recipients` resolves to nobody.
    #[serde(default)]
    pub fallback_recipients: Vec<String>,
    #[serde(default)]
    pub statuses: StatusValues,
}

// --- External collaborators ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedFile {
    pub url: String,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// URLs of documents to attach.
    pub attachments: Vec<String>,
}

#[async_trait]
pub trait PdfRenderer: Send + Sync + Debug + DynClone {
    async fn render_pdf(
        &self,
        document: &TemplateDocument,
        file_name: &str,
    ) -> Result<RenderedFile, FormError>;
}

dyn_clone::clone_trait_object!(PdfRenderer);

#[async_trait]
pub trait Mailer: Send + Sync + Debug + DynClone {
    async fn send(&self, message: &EmailMessage) -> Result<(), FormError>;
}

dyn_clone::clone_trait_object!(Mailer);

// --- Results ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl FollowupResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            ..Self::default()
        }
    }
}

/// Caller-facing messages. Causes of external failures are never shown.
fn localized(language: &str, key: &str) -> String {
    let text = match key {
        "external" => LocalizedText::new(&[
            ("EN", "The action could not be completed. Please try again later."),
            ("FR", "L'action n'a pas pu être effectuée. Veuillez réessayer plus tard."),
            ("NL", "De actie kon niet worden voltooid. Probeer het later opnieuw."),
        ]),
        "no_recipients" => LocalizedText::new(&[
            ("EN", "No recipient could be found for this email."),
            ("FR", "Aucun destinataire n'a été trouvé pour cet e-mail."),
            ("NL", "Er is geen ontvanger gevonden voor deze e-mail."),
        ]),
        "pdf_created" => LocalizedText::new(&[
            ("EN", "The PDF has been created."),
            ("FR", "Le PDF a été créé."),
            ("NL", "De PDF is aangemaakt."),
        ]),
        "pdf_reused" => LocalizedText::new(&[
            ("EN", "The existing PDF has been reused."),
            ("FR", "Le PDF existant a été réutilisé."),
            ("NL", "De bestaande PDF is hergebruikt."),
        ]),
        "email_sent" => LocalizedText::new(&[
            ("EN", "The email has been sent."),
            ("FR", "L'e-mail a été envoyé."),
            ("NL", "De e-mail is verzonden."),
        ]),
        _ => LocalizedText::new(&[
            ("EN", "The record has been closed."),
            ("FR", "La fiche a été clôturée."),
            ("NL", "Het record is afgesloten."),
        ]),
    };
    text.resolve(language).unwrap_or_default().to_string()
}

fn push_unique(found: &mut Vec<String>, address: &str) {
    let address = address.trim();
    if !address.is_empty() && !found.iter().any(|a| a.eq_ignore_ascii_case(address)) {
        found.push(address.to_string());
    }
}

/// A form the orchestrator can act on, with the store holding its records.
#[derive(Debug, Clone)]
pub struct RegisteredForm {
    pub definition: FormDefinition,
    pub store: SubmissionStore,
}

#[derive(Debug, Clone)]
pub struct FollowupOrchestrator {
    forms: HashMap<String, RegisteredForm>,
    documents: Box<dyn DocumentStore>,
    renderer: Box<dyn PdfRenderer>,
    mailer: Box<dyn Mailer>,
    lookup: Option<Arc<dyn ReferenceLookup>>,
    config: EngineConfig,
}

impl FollowupOrchestrator {
    pub fn new(
        documents: Box<dyn DocumentStore>,
        renderer: Box<dyn PdfRenderer>,
        mailer: Box<dyn Mailer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            forms: HashMap::new(),
            documents,
            renderer,
            mailer,
            lookup: None,
            config,
        }
    }

    pub fn with_form(mut self, definition: FormDefinition, store: SubmissionStore) -> Self {
        self.forms.insert(
            definition.form_key().to_string(),
            RegisteredForm { definition, store },
        );
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Runs one action and reports the outcome. Never returns an error: every
    /// failure becomes `success: false` with a caller-facing message.
    pub async fn run(&self, form_key: &str, record_id: &str, action: &str) -> FollowupResult {
        info!(form = %form_key, id = %record_id, action, "running follow-up action");
        let mut language = crate::constants::DEFAULT_LANGUAGE.to_string();
        match self.try_run(form_key, record_id, action, &mut language).await {
            Ok(result) => result,
            Err(e) => self.failure(e, &language),
        }
    }

    fn failure(&self, error: FormError, language: &str) -> FollowupResult {
        match &error {
            FormError::Conflict { message, .. } => FollowupResult::failure(message.clone()),
            FormError::NotFound(_) | FormError::Config(_) => {
                warn!("follow-up rejected: {error}");
                FollowupResult::failure(error.to_string())
            }
            _ => {
                if self.config.debug {
                    warn!("follow-up failed: {error}");
                } else {
                    warn!("follow-up failed on an external resource");
                }
                FollowupResult::failure(localized(language, "external"))
            }
        }
    }

    async fn try_run(
        &self,
        form_key: &str,
        record_id: &str,
        action: &str,
        language: &mut String,
    ) -> Result<FollowupResult, FormError> {
        let action: FollowupAction = action.parse()?;
        let form = self
            .forms
            .get(form_key)
            .ok_or_else(|| FormError::NotFound(format!("form '{form_key}'")))?;
        let record = form
            .store
            .get_by_id(&form.definition.schema, record_id)
            .await?;
        *language = record.language.clone();
        let config = form.definition.followup.clone().unwrap_or_default();

        match action {
            FollowupAction::CreatePdf => self.create_pdf(form, &config, &record).await,
            FollowupAction::SendEmail => self.send_email(form, &config, &record).await,
            FollowupAction::CloseRecord => {
                let status = &config.statuses.closed;
                let updated = form
                    .store
                    .update_status(&form.definition.schema, &record.id, status, None)
                    .await?;
                Ok(FollowupResult {
                    success: true,
                    message: Some(localized(&record.language, "closed")),
                    status: updated.status,
                    document_url: updated.pdf_url,
                    file_id: None,
                })
            }
        }
    }

    /// Fetches the template for the record's language and fills it.
    async fn render_template(
        &self,
        form: &RegisteredForm,
        templates: &LocalizedText,
        record: &Record,
    ) -> Result<(TemplateDocument, crate::render::PlaceholderMap), FormError> {
        let template_id = templates.resolve(&record.language).ok_or_else(|| {
            FormError::Config(format!(
                "no template configured for form '{}'",
                form.definition.form_key()
            ))
        })?;
        let template = self.documents.fetch(template_id).await?;
        let schema = &form.definition.schema;
        let rows = flatten(record, schema);
        let placeholders = build_placeholders(record, schema, &rows, self.lookup.as_deref());
        let rendered = RenderContext::new(schema, &rows, &placeholders, &record.language)
            .render(&template);
        Ok((rendered, placeholders))
    }

    async fn create_pdf(
        &self,
        form: &RegisteredForm,
        config: &FollowupConfig,
        record: &Record,
    ) -> Result<FollowupResult, FormError> {
        let source = config.pdf.as_ref().ok_or_else(|| {
            FormError::Config(format!("form '{}' has no PDF source", form.definition.form_key()))
        })?;
        let schema = &form.definition.schema;
        let status = &config.statuses.pdf_ready;

        let existing = record.pdf_url.as_deref().filter(|url| !url.trim().is_empty());
        if let (PdfSourceKind::StaticTemplate, Some(url)) = (source.kind, existing) {
            info!(id = %record.id, "reusing rendered PDF");
            let updated = form
                .store
                .update_status(schema, &record.id, status, None)
                .await?;
            return Ok(FollowupResult {
                success: true,
                message: Some(localized(&record.language, "pdf_reused")),
                status: updated.status,
                document_url: Some(url.to_string()),
                file_id: None,
            });
        }

        let (document, placeholders) = self.render_template(form, &source.templates, record).await?;
        let file_name = source
            .file_name
            .as_deref()
            .map(|name| placeholders.apply(name))
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| record.id.clone());
        let file = self.renderer.render_pdf(&document, &file_name).await?;

        let updated = form
            .store
            .update_status(schema, &record.id, status, Some(&file.url))
            .await?;
        info!(id = %record.id, url = %file.url, "PDF created");
        Ok(FollowupResult {
            success: true,
            message: Some(localized(&record.language, "pdf_created")),
            status: updated.status,
            document_url: Some(file.url),
            file_id: file.file_id,
        })
    }

    /// Resolves recipients in configuration order, dropping duplicates. Falls
    /// back to `fallback_recipients` when nothing resolves.
    pub fn resolve_recipients(&self, config: &FollowupConfig, record: &Record) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for entry in &config.recipients {
            match entry {
                RecipientEntry::Literal { address } => push_unique(&mut found, address),
                RecipientEntry::Field { field } => {
                    let value = format_optional(record.value(field), None);
                    for address in value.split([',', ';', '\n']) {
                        push_unique(&mut found, address);
                    }
                }
                RecipientEntry::Lookup {
                    field,
                    source,
                    key_column,
                    email_column,
                } => {
                    let key = format_optional(record.value(field), None);
                    let Some(lookup) = self.lookup.as_deref().filter(|_| !key.is_empty()) else {
                        continue;
                    };
                    match lookup.find_row(source, key_column, &key) {
                        Ok(Some(row)) => {
                            for (header, value) in &row {
                                if header.trim().eq_ignore_ascii_case(email_column.trim()) {
                                    push_unique(&mut found, value);
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(field = %field, "recipient lookup skipped: {e}"),
                    }
                }
            }
        }

        if found.is_empty() {
            for address in &config.fallback_recipients {
                push_unique(&mut found, address);
            }
        }
        found
    }

    async fn send_email(
        &self,
        form: &RegisteredForm,
        config: &FollowupConfig,
        record: &Record,
    ) -> Result<FollowupResult, FormError> {
        let source = config.email.as_ref().ok_or_else(|| {
            FormError::Config(format!("form '{}' has no email source", form.definition.form_key()))
        })?;

        let recipients = self.resolve_recipients(config, record);
        if recipients.is_empty() {
            warn!(id = %record.id, "email not sent: no recipients");
            return Ok(FollowupResult::failure(localized(&record.language, "no_recipients")));
        }

        let (document, placeholders) = self.render_template(form, &source.templates, record).await?;
        let subject = source
            .subject
            .resolve(&record.language)
            .map(|s| placeholders.apply(s))
            .unwrap_or_else(|| document.title.clone());
        let message = EmailMessage {
            to: recipients,
            subject,
            body: document.to_plain_text(),
            attachments: record.pdf_url.iter().cloned().collect(),
        };
        self.mailer.send(&message).await?;

        let updated = form
            .store
            .update_status(&form.definition.schema, &record.id, &config.statuses.emailed, None)
            .await?;
        info!(id = %record.id, recipients = message.to.len(), "email sent");
        Ok(FollowupResult {
            success: true,
            message: Some(localized(&record.language, "email_sent")),
            status: updated.status,
            document_url: updated.pdf_url,
            file_id: None,
        })
    }
}
