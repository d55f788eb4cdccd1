// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Build-or-reuse decision and the interactive query loop.
//!
//! An [`Orchestrator`] starts in [`SessionState::NeedsBuild`] unless the
//! configured collection already exists, in which case it is `Ready` and no
//! embeddings are computed for the corpus again.

use async_trait::async_trait;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::chunker::{ChunkError, Chunker};
use crate::config::{ConfigError, EngineConfig};
use crate::core::storage::Storage;
use crate::embedding::Embedder;
use crate::query::format_results_with_width;
use crate::store::{CollectionInfo, StoreError, VectorStore};

pub const EXIT_SENTINELS: [&str; 3] = ["exit", "quit", "q"];
pub const PROMPT: &str = "\nEnter your question: ";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read source '{name}': {source}")]
    Source {
        name: String,
        source: std::io::Error,
    },

    #[error("Source '{0}' contains no text to index")]
    EmptySource(String),

    #[error("Collection '{0}' has not been built")]
    NotReady(String),
}

impl EngineError {
    /// Configuration problems abort startup; everything else is reported and
    /// the session carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Chunk(ChunkError::InvalidConfiguration(_))
                | EngineError::Store(StoreError::InvalidConfiguration(_))
        )
    }
}

/// Supplies the raw document text.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn read(&self) -> Result<String, std::io::Error>;

    /// Label used in chunk metadata and diagnostics.
    fn name(&self) -> String;
}

/// Reads a UTF-8 file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SourceProvider for FileSource {
    async fn read(&self) -> Result<String, std::io::Error> {
        tokio::fs::read_to_string(&self.path).await
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StringSource {
    name: String,
    text: String,
}

impl StringSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl SourceProvider for StringSource {
    async fn read(&self) -> Result<String, std::io::Error> {
        Ok(self.text.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Line-oriented input for the interactive loop. `None` means end of input.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for Lines<R> {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

#[async_trait]
impl LineSource for mpsc::Receiver<std::io::Result<String>> {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.recv().await.transpose()
    }
}

/// Reads `reader` line by line on a dedicated OS thread.
///
/// The thread is not a runtime blocking task, so a read parked on a terminal
/// never delays runtime shutdown. It exits at EOF, on a read error, or once
/// the receiver is dropped and the next line arrives.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NeedsBuild,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Built(CollectionInfo),
    Reused(CollectionInfo),
}

impl Readiness {
    pub fn info(&self) -> &CollectionInfo {
        match self {
            Readiness::Built(info) | Readiness::Reused(info) => info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopInput {
    Exit,
    Empty,
    Query(String),
}

pub fn parse_input(line: &str) -> LoopInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LoopInput::Empty;
    }
    if EXIT_SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
    {
        return LoopInput::Exit;
    }
    LoopInput::Query(trimmed.to_string())
}

pub struct Orchestrator<S: Storage> {
    store: Arc<VectorStore<S>>,
    embedder: Arc<dyn Embedder>,
    config: EngineConfig,
    state: SessionState,
}

impl<S: Storage> Orchestrator<S> {
    /// Validates `config` and inspects the store to pick the initial state.
    pub async fn open(
        store: Arc<VectorStore<S>>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let state = match store.exists(&config.collection).await {
            Ok(true) => SessionState::Ready,
            Ok(false) => SessionState::NeedsBuild,
            // A build replaces whatever the unreadable pointer referred to.
            Err(StoreError::Serialization(e)) => {
                warn!(collection = %config.collection, error = %e, "collection pointer unreadable");
                SessionState::NeedsBuild
            }
            Err(e) => return Err(e.into()),
        };
        info!(collection = %config.collection, ?state, "session opened");
        Ok(Self {
            store,
            embedder,
            config,
            state,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<VectorStore<S>> {
        &self.store
    }

    /// Builds the collection from `source` when needed, otherwise reuses the
    /// persisted one without calling the embedder.
    pub async fn ensure_ready<P: SourceProvider + ?Sized>(
        &mut self,
        source: &P,
    ) -> Result<Readiness, EngineError> {
        let name = self.config.collection.clone();

        if self.state == SessionState::Ready {
            if let Some(info) = self.store.info(&name).await? {
                info!(collection = %name, chunks = info.chunk_count, "reusing persisted collection");
                return Ok(Readiness::Reused(info));
            }
            warn!(collection = %name, "collection disappeared, rebuilding");
            self.state = SessionState::NeedsBuild;
        }

        let source_name = source.name();
        let text = source.read().await.map_err(|e| EngineError::Source {
            name: source_name.clone(),
            source: e,
        })?;

        let chunker = Chunker::new(self.config.chunk_size, self.config.chunk_overlap)?
            .with_preprocessor(self.config.preprocess)
            .with_source(
                self.config
                    .source_label
                    .clone()
                    .unwrap_or_else(|| source_name.clone()),
            );
        let chunks = chunker.chunk(&text);
        info!(source = %source_name, chunks = chunks.len(), "chunked source text");
        if chunks.iter().all(|c| c.text.trim().is_empty()) {
            return Err(EngineError::EmptySource(source_name));
        }

        let info = self
            .store
            .build(&name, &chunks, self.embedder.as_ref(), self.config.metric)
            .await?;
        self.state = SessionState::Ready;
        Ok(Readiness::Built(info))
    }

    /// Runs one query and renders the report.
    pub async fn ask(&self, query: &str) -> Result<String, EngineError> {
        if self.state != SessionState::Ready {
            return Err(EngineError::NotReady(self.config.collection.clone()));
        }
        let hits = self
            .store
            .query(
                &self.config.collection,
                query,
                self.embedder.as_ref(),
                self.config.top_k,
            )
            .await?;
        Ok(format_results_with_width(&hits, self.config.wrap_width))
    }

    /// Reads queries line by line until EOF or an exit sentinel. Query
    /// failures are written to `output` and the loop continues.
    pub async fn run<R, W>(&self, input: R, output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin,
    {
        self.run_lines(input.lines(), output).await
    }

    pub async fn run_lines<L, W>(&self, mut lines: L, mut output: W) -> std::io::Result<()>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(
                format!(
                    "\nVector Database Query System (collection '{}')\nType 'exit' to quit the program\n",
                    self.config.collection
                )
                .as_bytes(),
            )
            .await?;

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let line = match lines.next_line().await? {
                Some(line) => line,
                None => break,
            };

            match parse_input(&line) {
                LoopInput::Exit => break,
                LoopInput::Empty => continue,
                LoopInput::Query(query) => match self.ask(&query).await {
                    Ok(report) => {
                        output
                            .write_all(format!("\n=== Search Results ===\n{}\n", report).as_bytes())
                            .await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "query failed");
                        output.write_all(format!("\nError: {}\n", e).as_bytes()).await?;
                    }
                },
            }
        }

        output.write_all(b"\nGoodbye.\n").await?;
        output.flush().await
    }
}
