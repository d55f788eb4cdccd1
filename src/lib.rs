// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod cbor;
pub mod chunker;
pub mod config;
pub mod core;
pub mod embedding;
pub mod orchestrator;
pub mod query;
pub mod storage;
pub mod store;

pub use chunker::{chunk, Chunker, LinePreprocessor};
pub use config::EngineConfig;
pub use orchestrator::{EngineError, Orchestrator, Readiness, SessionState};
pub use store::{StoreError, VectorStore};
