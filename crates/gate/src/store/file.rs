// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed store: one JSON document, replaced atomically on every write.
//!
//! The document is re-read on every operation so that entries written by
//! other processes sharing the state directory are observed. Compare-and-set
//! is atomic within one process only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{KeyValueStore, StoreError, StoreResult};

const FILE_NAME: &str = "cache.json";

type Document = BTreeMap<String, String>;

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) the store under `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { path: dir.join(FILE_NAME), write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Document> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Write tmp + rename. The temp name is unique per call so concurrent
    /// saves never share a partially written file.
    async fn save(&self, doc: &Document) -> StoreResult<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self.path.with_file_name(format!(
            "{FILE_NAME}.{}.{}.tmp",
            std::process::id(),
            seq,
        ));
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        doc.insert(key.to_owned(), value);
        self.save(&doc).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        if doc.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        doc.insert(key.to_owned(), value);
        self.save(&doc).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
