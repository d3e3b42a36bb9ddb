//! # Multi-Modal RAG CLI (`mmrag`)
//!
//! ## Usage
//!
//! ```bash
//! mmrag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mmrag serve` | Start the HTTP API |
//! | `mmrag ingest <path>` | Index a file, or every supported file under a directory |
//! | `mmrag ask "<question>"` | Answer one question from the command line |
//!
//! ## Examples
//!
//! ```bash
//! # Index a folder of papers into the configured (e.g. Pinecone) store
//! mmrag ingest ./papers --config ./config/rag.toml
//!
//! # Ask with hybrid retrieval plus web and arXiv results
//! mmrag ask "What is annealed language learning?" --rag hybrid --llm llama3-70b --web
//!
//! # In-memory store: load documents for this one question
//! mmrag ask "Summarise the invoice" --doc ./invoice.png
//!
//! # Serve the API on [server].bind
//! mmrag serve
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use walkdir::WalkDir;

use multimodal_rag::app::AppComponents;
use multimodal_rag::config::{load_config, Config};
use multimodal_rag::ingest::{file_extension, is_supported};
use multimodal_rag::logging;
use multimodal_rag::models::{ModelChoice, RagVariant};
use multimodal_rag::server;

/// Multi-modal retrieval-augmented chat over uploaded documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "mmrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Fails at start-up if an API key required by the configured
    /// providers is missing from the environment.
    Serve,

    /// Index documents into the configured vector store.
    ///
    /// Directories are walked recursively; files with unsupported
    /// extensions are skipped.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Delete every record from the vector store first.
        #[arg(long)]
        clear: bool,
    },

    /// Answer a single question and print the response and its sources.
    Ask {
        /// The question.
        message: String,

        /// Retrieval variant: `vanilla`, `knowledge_graph`, or `hybrid`.
        #[arg(long, default_value = "vanilla")]
        rag: RagVariant,

        /// Model: `llama2-70b`, `gpt-oss-120b`, `gemma-7b`, or `llama3-70b`.
        #[arg(long, default_value = "llama2-70b")]
        llm: ModelChoice,

        /// Add web (and for hybrid, arXiv) results to the context.
        #[arg(long)]
        web: bool,

        /// Documents to ingest before answering (repeatable).
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
    },
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    if path == Path::new("./config/rag.toml") {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    bail!("config file not found: {}", path.display())
}

/// Supported files at `path` (the file itself, or everything below a directory).
fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("no such file or directory: {}", path.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_supported(&file_extension(&name)) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn ingest_path(app: &AppComponents, path: &Path) -> Result<(usize, usize)> {
    let files = collect_files(path)?;
    let mut total_chunks = 0;
    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let chunks = app.processor.process(&bytes, &name).await?;
        let indexed = app.store.add(&chunks).await;
        if indexed == 0 && !chunks.is_empty() {
            bail!("failed to index {}", file.display());
        }
        app.registry.register(
            &name,
            &file_extension(&name),
            indexed,
            Some(file.display().to_string()),
        );
        println!("  {}: {} chunks", file.display(), indexed);
        total_chunks += indexed;
    }
    Ok((files.len(), total_chunks))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            cfg.require_keys()?;
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path, clear } => {
            let app = AppComponents::from_config(&cfg)?;
            if app.store.backend_name() == "memory" {
                warn!("vector_store.backend is memory: ingested chunks are discarded on exit");
            }
            if clear {
                app.store.clear().await?;
                info!("vector store cleared");
            }
            let (files, chunks) = ingest_path(&app, &path).await?;
            println!("Ingested {} files, {} chunks.", files, chunks);
        }
        Commands::Ask {
            message,
            rag,
            llm,
            web,
            docs,
        } => {
            let app = AppComponents::from_config(&cfg)?;
            for doc in &docs {
                ingest_path(&app, doc).await?;
            }
            let answer = app.rag.answer(rag, &message, &[], llm, web).await;
            println!("{}", answer.response);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    println!("  - {}", source);
                }
            }
        }
    }

    Ok(())
}
