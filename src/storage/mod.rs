// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod file_storage;

pub use file_storage::FileStorage;

// Re-export the Storage trait from core
pub use crate::core::storage::{MockStorage, Storage, StorageError};
