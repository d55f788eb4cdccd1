// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use tempfile::TempDir;
use text_vector_db::storage::{FileStorage, MockStorage, Storage, StorageError};

#[cfg(test)]
mod mock_storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MockStorage::new();
        storage.put("a/b", vec![1, 2, 3]).await.unwrap();
        assert_eq!(storage.get("a/b").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(storage.get_count("a/b").await, 1);

        storage.delete("a/b").await.unwrap();
        assert_eq!(storage.get("a/b").await.unwrap(), None);
        storage.delete("a/b").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_put_failures() {
        let storage = MockStorage::new();
        storage.fail_puts_after(1).await;
        storage.put("one", vec![1]).await.unwrap();
        assert!(matches!(
            storage.put("two", vec![2]).await,
            Err(StorageError::Injected(_))
        ));

        storage.clear_failures().await;
        storage.put("two", vec![2]).await.unwrap();
        assert_eq!(storage.keys().await, vec!["one", "two"]);
    }
}

#[cfg(test)]
mod file_storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = FileStorage::open(dir.path()).await.unwrap();
            storage
                .put("collections/docs/CURRENT", b"pointer".to_vec())
                .await
                .unwrap();
        }

        let storage = FileStorage::open(dir.path()).await.unwrap();
        assert_eq!(
            storage.get("collections/docs/CURRENT").await.unwrap(),
            Some(b"pointer".to_vec())
        );
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefixed() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        for key in ["c/2", "c/1", "d/1", "c/sub/3"] {
            storage.put(key, vec![0]).await.unwrap();
        }

        assert_eq!(storage.list("c/").await.unwrap(), vec!["c/1", "c/2", "c/sub/3"]);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        assert!(matches!(
            storage.put("../outside", vec![1]).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.get("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
