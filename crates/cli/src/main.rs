//! # anyform-cli: A CLI for `anyform`
//!
//! Operator commands over a submission table and its templates. Every command
//! prints JSON on stdout; logs go to stderr and are filtered with `RUST_LOG`.

mod config;
mod documents;

use anyform::migrate::migrate_template;
use anyform::{FormDefinition, MemoryCache, MemoryTable, SubmissionStore, TableAccessor};
use anyform_sheets::SheetsTable;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{get_config, AppConfig};
use crate::documents::JsonFileDocumentStore;

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file (defaults to `anyform.yml`)
    #[arg(long, global = true, env = "ANYFORM_CONFIG")]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List one page of records
    List(ListArgs),
    /// Fetch a single record by id
    Get(GetArgs),
    /// Rewrite legacy placeholders of a template to canonical ids
    Migrate(MigrateArgs),
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// The form definition (YAML or JSON)
    #[arg(long)]
    form: PathBuf,
    #[arg(long, default_value_t = 10)]
    page_size: usize,
    #[arg(long)]
    page_token: Option<String>,
    /// Comma separated field ids to project
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
}

#[derive(Parser, Debug)]
struct GetArgs {
    #[arg(long)]
    form: PathBuf,
    #[arg(long)]
    id: String,
}

#[derive(Parser, Debug)]
struct MigrateArgs {
    #[arg(long)]
    form: PathBuf,
    /// The template document, a JSON file named `{id}.json`
    #[arg(long)]
    template: PathBuf,
    /// Report what would change without saving
    #[arg(long)]
    dry_run: bool,
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = get_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::List(args) => handle_list(&config, args).await,
        Commands::Get(args) => handle_get(&config, args).await,
        Commands::Migrate(args) => handle_migrate(args).await,
    }
}

// --- Helpers ---

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_form(path: &Path) -> Result<FormDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form definition '{}'", path.display()))?;
    let form: FormDefinition = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(form)
}

fn open_table(config: &AppConfig) -> Result<Box<dyn TableAccessor>> {
    if let Some(sheets) = &config.sheets {
        info!("Using Google Sheets table '{}'", sheets.sheet);
        return Ok(Box::new(SheetsTable::new(sheets)?));
    }
    if let Some(path) = &config.table_csv {
        info!("Using CSV table '{path}'");
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV table '{path}'"))?;
        return Ok(Box::new(MemoryTable::from_csv(path, &data)?));
    }
    bail!("No table configured. Set `sheets` or `table_csv` in the config file.")
}

fn open_store(config: &AppConfig) -> Result<SubmissionStore> {
    Ok(SubmissionStore::new(
        open_table(config)?,
        Box::new(MemoryCache::new()),
        config.engine.clone(),
    ))
}

// --- Command Handlers ---

async fn handle_list(config: &AppConfig, args: &ListArgs) -> Result<()> {
    let form = load_form(&args.form)?;
    let store = open_store(config)?;
    let page = store
        .list_page(
            &form.schema,
            &args.fields,
            args.page_size,
            args.page_token.as_deref(),
        )
        .await?;
    print_json(&page)
}

async fn handle_get(config: &AppConfig, args: &GetArgs) -> Result<()> {
    let form = load_form(&args.form)?;
    let store = open_store(config)?;
    let record = store.get_by_id(&form.schema, &args.id).await?;
    print_json(&record)
}

async fn handle_migrate(args: &MigrateArgs) -> Result<()> {
    let form = load_form(&args.form)?;
    let (documents, id) = JsonFileDocumentStore::for_file(&args.template)?;
    let report = migrate_template(&form.schema, &documents, &id, args.dry_run).await?;
    for warning in &report.warnings {
        warn!("{warning}");
    }
    print_json(&report)
}
