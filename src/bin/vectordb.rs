// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use text_vector_db::config::{EmbedderKind, EngineConfig};
use text_vector_db::core::types::DistanceMetric;
use text_vector_db::embedding::{Embedder, HashEmbedder, HttpEmbedder, RetryEmbedder};
use text_vector_db::orchestrator::{spawn_line_reader, FileSource, Orchestrator, Readiness};
use text_vector_db::storage::FileStorage;
use text_vector_db::{LinePreprocessor, VectorStore};

/// Flags override the `VECTOR_DB_*` environment, which overrides defaults.
#[derive(Parser, Debug)]
#[command(
    name = "vectordb",
    about = "Chunk a document into a persistent vector collection and query it interactively"
)]
struct Cli {
    /// Source document (UTF-8 text)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory holding persisted collections
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Collection name
    #[arg(long)]
    collection: Option<String>,

    /// Chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Results per query
    #[arg(long)]
    top_k: Option<usize>,

    /// Distance metric (cosine or euclidean)
    #[arg(long)]
    metric: Option<DistanceMetric>,

    /// Line preprocessing (pipe, trim or none)
    #[arg(long)]
    preprocess: Option<LinePreprocessor>,

    /// Embedder backend (hash or http)
    #[arg(long)]
    embedder: Option<EmbedderKind>,

    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long)]
    embedding_url: Option<String>,

    /// Embedding model name
    #[arg(long)]
    embedding_model: Option<String>,

    /// Embedding dimension
    #[arg(long)]
    embedding_dimension: Option<usize>,

    /// Bearer token for the embeddings API (defaults to OPENAI_API_KEY)
    #[arg(long)]
    embedding_api_key: Option<String>,

    /// Seconds allowed for each embed call
    #[arg(long)]
    embed_timeout_secs: Option<u64>,

    /// Attempts per embed call
    #[arg(long)]
    embed_retries: Option<usize>,

    /// Embed calls in flight during a build
    #[arg(long)]
    embed_concurrency: Option<usize>,

    /// Delete the collection and build it again from the input
    #[arg(long, default_value_t = false)]
    rebuild: bool,
}

impl Cli {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(v) = self.input {
            config.input_path = v;
        }
        if let Some(v) = self.db_dir {
            config.db_dir = v;
        }
        if let Some(v) = self.collection {
            config.collection = v;
        }
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            config.chunk_overlap = v;
        }
        if let Some(v) = self.top_k {
            config.top_k = v;
        }
        if let Some(v) = self.metric {
            config.metric = v;
        }
        if let Some(v) = self.preprocess {
            config.preprocess = v;
        }
        if let Some(v) = self.embedder {
            config.embedder.kind = v;
        }
        if let Some(v) = self.embedding_url {
            config.embedder.url = v;
        }
        if let Some(v) = self.embedding_model {
            config.embedder.model = v;
        }
        if let Some(v) = self.embedding_dimension {
            config.embedder.dimension = v;
        }
        if let Some(v) = self.embedding_api_key {
            config.embedder.api_key = Some(v);
        }
        if let Some(v) = self.embed_timeout_secs {
            config.embedder.timeout_secs = v;
        }
        if let Some(v) = self.embed_retries {
            config.embedder.retries = v;
        }
        if let Some(v) = self.embed_concurrency {
            config.embedder.concurrency = v;
        }
    }
}

fn build_embedder(config: &EngineConfig) -> Result<Arc<dyn Embedder>> {
    let settings = &config.embedder;
    let embedder: Arc<dyn Embedder> = match settings.kind {
        EmbedderKind::Hash => Arc::new(RetryEmbedder::with_config(
            HashEmbedder::new(settings.dimension)?,
            settings.retry_config(),
        )),
        EmbedderKind::Http => {
            let http = HttpEmbedder::new(settings.http_config())?;
            info!(endpoint = http.endpoint(), model = %settings.model, "using HTTP embedder");
            Arc::new(RetryEmbedder::with_config(http, settings.retry_config()))
        }
    };
    Ok(embedder)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for the interactive session
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "text_vector_db=info,vectordb=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let rebuild = cli.rebuild;
    let mut config = EngineConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    let storage = FileStorage::open(&config.db_dir)
        .await
        .with_context(|| format!("opening database directory {}", config.db_dir.display()))?;
    let store = Arc::new(VectorStore::with_options(storage, config.store_options()));
    let embedder = build_embedder(&config)?;

    if rebuild && store.delete(&config.collection).await? {
        info!(collection = %config.collection, "deleted collection for rebuild");
    }

    let source = FileSource::new(&config.input_path);
    let mut orchestrator = Orchestrator::open(store, embedder, config).await?;

    match orchestrator.ensure_ready(&source).await {
        Ok(Readiness::Built(info)) => {
            println!("Vector database created with {} chunks.", info.chunk_count)
        }
        Ok(Readiness::Reused(info)) => println!(
            "Vector database already exists ({} chunks, built {}).",
            info.chunk_count,
            info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => {
            error!(error = %e, "could not prepare collection");
            eprintln!("Error: {}", e);
        }
    }

    // Stdin is read on its own thread so Ctrl+C never waits for Enter.
    let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = orchestrator.run_lines(lines, stdout) => {
            result.context("interactive session failed")?;
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
