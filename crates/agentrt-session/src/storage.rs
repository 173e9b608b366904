// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `Storage` trait and an in-memory reference backend.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::SessionSnapshot;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Persists and retrieves session snapshots. The snapshot is opaque to the
/// backend — it persists bytes, nothing more.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<(), StorageError>;
    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, StorageError>;
    async fn exists(&self, session_id: &str) -> Result<bool, StorageError>;
    async fn delete(&self, session_id: &str) -> Result<(), StorageError>;
}

/// A `Mutex<HashMap<String, Vec<u8>>>`-backed reference implementation.
///
/// Not a production backend — sessions vanish with the process. It exists
/// so this crate's own tests, and the facade's doc examples, have a working
/// `Storage` to exercise without requiring a real database or filesystem.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.entries.lock().unwrap().insert(session_id.to_string(), bytes);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, StorageError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(session_id) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, session_id: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().unwrap().contains_key(session_id))
    }

    async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        self.entries.lock().unwrap().remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let storage = InMemoryStorage::new();
        let snapshot = SessionSnapshot::new("s1", "sys");
        storage.save("s1", &snapshot).await.unwrap();
        let loaded = storage.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
    }

    #[tokio::test]
    async fn load_missing_session_returns_none() {
        let storage = InMemoryStorage::new();
        assert!(storage.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exists_reflects_save_and_delete() {
        let storage = InMemoryStorage::new();
        let snapshot = SessionSnapshot::new("s1", "sys");
        assert!(!storage.exists("s1").await.unwrap());
        storage.save("s1", &snapshot).await.unwrap();
        assert!(storage.exists("s1").await.unwrap());
        storage.delete("s1").await.unwrap();
        assert!(!storage.exists("s1").await.unwrap());
    }
}
