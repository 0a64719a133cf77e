use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ragchat_core::config::Config;
use ragchat_core::locale::Locale;
use ragchat_docs::{DomainDocumentStorage, Upload};
use ragchat_service::RagChatService;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragchat", about = "Knowledge-base chat and document library", version)]
struct Cli {
    /// Directory holding config.toml (default: current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question from the knowledge base
    Ask {
        question: String,
        /// Language of labels and local answers (de, en)
        #[arg(long, default_value = "de")]
        locale: String,
        /// Answer from this tenant's index
        #[arg(long)]
        domain: Option<String>,
    },
    /// Add a document to a tenant's library
    Upload {
        domain: String,
        file: PathBuf,
        /// MIME type recorded with the document
        #[arg(long, default_value = "")]
        mime: String,
    },
    /// List a tenant's documents, newest first
    List { domain: String },
    /// Remove a document by id
    Delete { domain: String, id: String },
    /// Print where the tenant's index is expected
    IndexPath { domain: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = match &cli.config_dir {
        Some(dir) => Config::load_from(dir).and_then(|c| c.app()).map(|app| app.rooted_at(dir)),
        None => Config::load().and_then(|c| c.app()),
    }
    .context("loading configuration")?;

    let output = match cli.command {
        Command::Ask { question, locale, domain } => {
            let service = RagChatService::new(app);
            let response = service.answer_for_domain(&question, Locale::parse(&locale), domain.as_deref())?;
            serde_json::to_value(response)?
        }
        Command::Upload { domain, file, mime } => {
            let storage = DomainDocumentStorage::from_config(&app);
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("no file name in {}", file.display()))?
                .to_string();
            let reader = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let document = storage.store_document(&domain, Upload::new(name, mime, reader))?;
            serde_json::to_value(document)?
        }
        Command::List { domain } => {
            let storage = DomainDocumentStorage::from_config(&app);
            serde_json::to_value(storage.list_documents(&domain)?)?
        }
        Command::Delete { domain, id } => {
            let storage = DomainDocumentStorage::from_config(&app);
            storage.delete_document(&domain, &id)?;
            json!({ "deleted": id })
        }
        Command::IndexPath { domain } => {
            let storage = DomainDocumentStorage::from_config(&app);
            json!({ "index_path": storage.get_index_path(&domain)? })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
