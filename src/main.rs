//! # Reply Harness CLI (`reply-harness`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reply-harness init` | Create the SQLite database and schema |
//! | `reply-harness serve` | Start the HTTP API |
//! | `reply-harness ingest <file>` | Embed and store example emails |
//! | `reply-harness search <company> "<text>"` | Show the closest stored examples |
//! | `reply-harness reply <company> "<text>"` | Draft a reply from the command line |
//!
//! ## Examples
//!
//! ```bash
//! reply-harness init --config ./config/reply.toml
//! reply-harness ingest examples.json --company acme --config ./config/reply.toml
//! reply-harness search acme "When will my order ship?"
//! reply-harness serve --config ./config/reply.toml
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use reply_harness::config;
use reply_harness::migrate;
use reply_harness::models::Query;
use reply_harness::pipeline::ReplyPipeline;
use reply_harness::server;

/// Reply Harness: draft email replies in a company's tone from stored examples.
#[derive(Parser)]
#[command(name = "reply-harness", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/reply.toml`. Credentials are read from the
    /// environment, never from this file.
    #[arg(long, global = true, default_value = "./config/reply.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; safe to run repeatedly.
    Init,

    /// Start the HTTP API.
    ///
    /// Fails immediately if provider or store credentials are missing.
    Serve,

    /// Embed and store example emails for a company.
    ///
    /// The file holds either a JSON array of strings or an object
    /// `{ "companyName": "...", "emails": ["..."] }`.
    Ingest {
        /// Path to the JSON file.
        file: PathBuf,

        /// Company name; overrides `companyName` in the file.
        #[arg(long)]
        company: Option<String>,
    },

    /// Show the stored examples closest to a text.
    Search {
        company: String,
        text: String,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Draft a reply to an email body.
    Reply { company: String, text: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IngestFile {
    Texts(Vec<String>),
    Batch {
        #[serde(rename = "companyName")]
        company_name: Option<String>,
        emails: Vec<String>,
    },
}

fn read_ingest_file(path: &Path, company: Option<String>) -> Result<(String, Vec<String>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ingest file: {}", path.display()))?;
    let parsed: IngestFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ingest file: {}", path.display()))?;

    let (file_company, emails) = match parsed {
        IngestFile::Texts(emails) => (None, emails),
        IngestFile::Batch {
            company_name,
            emails,
        } => (company_name, emails),
    };
    let Some(company) = company.or(file_company) else {
        bail!("No company given: pass --company or set companyName in the file");
    };
    Ok((company, emails))
}

fn load(path: &Path) -> Result<config::Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Ok(config::Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { file, company } => {
            let (company, emails) = read_ingest_file(&file, company)?;
            let pipeline = ReplyPipeline::from_config(&cfg).await?;
            let inserted = pipeline.ingest(&company, &emails).await?;
            println!("ingest {}", company);
            println!("  inserted: {}", inserted);
        }
        Commands::Search { company, text, k } => {
            let pipeline = ReplyPipeline::from_config(&cfg).await?;
            let k = k.unwrap_or(pipeline.top_k());
            let neighbors = pipeline.similar(&company, &text, k).await?;
            if neighbors.is_empty() {
                println!("No results.");
            }
            for (i, n) in neighbors.iter().enumerate() {
                println!("{}. [{:.4}] {}", i + 1, n.distance, n.text.replace('\n', " "));
            }
        }
        Commands::Reply { company, text } => {
            let pipeline = ReplyPipeline::from_config(&cfg).await?;
            let result = pipeline
                .generate_reply(&Query {
                    incoming_text: text,
                    company_name: company,
                })
                .await?;
            println!("{}", result.reply);
            if !result.snippets.is_empty() {
                println!();
                println!("examples used:");
                for s in &result.snippets {
                    println!("  - {}", s.replace('\n', " "));
                }
            }
        }
    }

    Ok(())
}
