// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache store: the sync timestamp and authorized node-key set.
//!
//! Both entries live in a [`KeyValueStore`] under independent keys:
//!
//! - `syncTime`: ISO-8601 UTC timestamp of the last refresh attempt start.
//! - `nodeKeys`: JSON array of authorized node keys.
//!
//! No transaction spans the two entries. Readers may briefly observe a new
//! `syncTime` next to the previous key set while a refresh is in flight.

pub mod file;
pub mod memory;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

pub use file::FileStore;
pub use memory::MemoryStore;

pub const SYNC_TIME_KEY: &str = "syncTime";
pub const NODE_KEYS_KEY: &str = "nodeKeys";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt value for {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String key-value storage shared by every request handler.
///
/// Implementations must be safe to call concurrently. `compare_and_set` is
/// the only primitive used for coordination between handlers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn put(&self, key: &str, value: String) -> StoreResult<()>;

    /// Store `value` only if the current value equals `expected`.
    ///
    /// `expected: None` means insert-if-absent. Returns `Ok(false)` when the
    /// precondition does not hold.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> StoreResult<bool>;
}

/// Available store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    File,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::File => f.write_str("file"),
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => anyhow::bail!("invalid store: {other}"),
        }
    }
}

/// Open the configured backend.
pub fn open(kind: StoreKind, state_dir: &Path) -> StoreResult<Arc<dyn KeyValueStore>> {
    Ok(match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(FileStore::open(state_dir)?),
    })
}

/// Observed state of the `syncTime` entry.
///
/// Carries the raw stored string so that a later [`CacheStore::claim_refresh`]
/// can compare against exactly what was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    raw: Option<String>,
    synced_at: Option<DateTime<Utc>>,
}

impl Freshness {
    /// Last refresh start, or `None` if never synced or unparseable.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }
}

/// Typed view of the cache entries over a [`KeyValueStore`].
#[derive(Clone)]
pub struct CacheStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn read_freshness(&self) -> StoreResult<Freshness> {
        let raw = self.kv.get(SYNC_TIME_KEY).await?;
        let synced_at = raw.as_deref().and_then(|value| match parse_timestamp(value) {
            Some(at) => Some(at),
            None => {
                tracing::warn!(value, "unparseable syncTime, treating cache as stale");
                None
            }
        });
        Ok(Freshness { raw, synced_at })
    }

    pub async fn read_keys(&self) -> StoreResult<Option<BTreeSet<String>>> {
        let Some(raw) = self.kv.get(NODE_KEYS_KEY).await? else {
            return Ok(None);
        };
        let keys: Vec<String> = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: NODE_KEYS_KEY.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Some(keys.into_iter().collect()))
    }

    pub async fn write_sync_time(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.kv.put(SYNC_TIME_KEY, format_timestamp(at)).await
    }

    pub async fn write_keys(&self, keys: &BTreeSet<String>) -> StoreResult<()> {
        let json = serde_json::to_string(keys).map_err(|e| StoreError::Corrupt {
            key: NODE_KEYS_KEY.to_owned(),
            reason: e.to_string(),
        })?;
        self.kv.put(NODE_KEYS_KEY, json).await
    }

    /// Write both entries, timestamp first.
    pub async fn write(&self, at: DateTime<Utc>, keys: &BTreeSet<String>) -> StoreResult<()> {
        self.write_sync_time(at).await?;
        self.write_keys(keys).await
    }

    /// Advance `syncTime` to `now` if it still holds the `observed` value.
    ///
    /// Returns `false` when another writer moved `syncTime` first.
    pub async fn claim_refresh(
        &self,
        observed: &Freshness,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.kv.compare_and_set(SYNC_TIME_KEY, observed.raw.as_deref(), format_timestamp(now)).await
    }
}

/// Render a timestamp as `2026-01-01T00:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
