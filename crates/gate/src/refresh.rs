// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh orchestration: staleness, claiming, fan-out, and aggregation.
//!
//! A refresh is due when `syncTime` is absent or older than
//! [`STALENESS_WINDOW`]. The refreshing handler first advances `syncTime`
//! with a compare-and-set claim, then fetches every organization's keys
//! concurrently and replaces the whole key set. Handlers that lose the claim,
//! or arrive while a claimed refresh is in flight, use the stored keys as-is.
//!
//! A failed refresh writes nothing: the previous key set stays authoritative
//! and the advanced `syncTime` suppresses retries until the window expires.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::{join_all, try_join_all};
use tracing::Instrument;

use crate::credential::oauth::exchange;
use crate::credential::OrganizationCredential;
use crate::store::{CacheStore, StoreError};
use crate::upstream::client::ApiClient;
use crate::upstream::directory::list_authorized_keys;

/// Age after which the cached key set is refreshed.
pub const STALENESS_WINDOW: TimeDelta = TimeDelta::hours(1);

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("token exchange failed for {organization}: {reason}")]
    UpstreamAuth { organization: String, status: Option<u16>, reason: String },
    #[error("device listing failed for {organization}: {reason}")]
    UpstreamDirectory { organization: String, status: Option<u16>, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How per-organization results combine into one key set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Any organization failure fails the whole refresh.
    #[default]
    AllOrNothing,
    /// Failed organizations are skipped; fails only if every one fails.
    BestEffort,
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllOrNothing => f.write_str("all-or-nothing"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all-or-nothing" => Ok(Self::AllOrNothing),
            "best-effort" => Ok(Self::BestEffort),
            other => anyhow::bail!("invalid aggregation policy: {other}"),
        }
    }
}

/// Result of [`Refresher::ensure_fresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Cache was within the staleness window; nothing fetched.
    Fresh,
    /// This call refreshed the cache.
    Refreshed { keys: usize },
    /// Cache was stale but another handler claimed the refresh first.
    ClaimLost,
}

/// `true` if a cache last synced at `synced_at` must be refreshed at `now`.
pub fn is_stale(synced_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match synced_at {
        Some(at) => now.signed_duration_since(at) > STALENESS_WINDOW,
        None => true,
    }
}

/// Union of per-organization key subsets.
pub fn union_keys(subsets: impl IntoIterator<Item = BTreeSet<String>>) -> BTreeSet<String> {
    subsets.into_iter().flatten().collect()
}

pub struct Refresher {
    api: ApiClient,
    organizations: Vec<OrganizationCredential>,
    cache: CacheStore,
    aggregation: Aggregation,
}

impl Refresher {
    pub fn new(
        api: ApiClient,
        organizations: Vec<OrganizationCredential>,
        cache: CacheStore,
        aggregation: Aggregation,
    ) -> Self {
        Self { api, organizations, cache, aggregation }
    }

    pub fn organizations(&self) -> &[OrganizationCredential] {
        &self.organizations
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub async fn ensure_fresh(&self) -> Result<RefreshOutcome, RefreshError> {
        self.ensure_fresh_at(Utc::now()).await
    }

    /// Refresh the cache if it is stale as of `now`.
    pub async fn ensure_fresh_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let freshness = self.cache.read_freshness().await?;
        if !is_stale(freshness.synced_at(), now) {
            return Ok(RefreshOutcome::Fresh);
        }

        if !self.cache.claim_refresh(&freshness, now).await? {
            tracing::debug!("refresh already claimed by another handler");
            return Ok(RefreshOutcome::ClaimLost);
        }

        let span = tracing::info_span!("refresh", refresh_id = %uuid::Uuid::new_v4());
        self.refresh(freshness.synced_at()).instrument(span).await
    }

    async fn refresh(
        &self,
        previous_sync: Option<DateTime<Utc>>,
    ) -> Result<RefreshOutcome, RefreshError> {
        tracing::info!(
            organizations = self.organizations.len(),
            aggregation = %self.aggregation,
            previous_sync = ?previous_sync,
            "refreshing authorized keys"
        );
        let keys = match self.fetch_all().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(err = %e, "refresh failed, keeping previous key set");
                return Err(e);
            }
        };
        self.cache.write_keys(&keys).await?;
        tracing::info!(keys = keys.len(), "refresh complete");
        Ok(RefreshOutcome::Refreshed { keys: keys.len() })
    }

    /// Fetch and aggregate keys for every organization without touching the cache.
    pub async fn fetch_all(&self) -> Result<BTreeSet<String>, RefreshError> {
        let fetches = self.organizations.iter().map(|org| self.fetch_organization(org));

        match self.aggregation {
            Aggregation::AllOrNothing => Ok(union_keys(try_join_all(fetches).await?)),
            Aggregation::BestEffort => {
                let mut subsets = Vec::with_capacity(self.organizations.len());
                let mut last_err = None;
                for result in join_all(fetches).await {
                    match result {
                        Ok(keys) => subsets.push(keys),
                        Err(e) => {
                            tracing::warn!(err = %e, "skipping organization");
                            last_err = Some(e);
                        }
                    }
                }
                match last_err {
                    Some(e) if subsets.is_empty() => Err(e),
                    _ => Ok(union_keys(subsets)),
                }
            }
        }
    }

    async fn fetch_organization(
        &self,
        org: &OrganizationCredential,
    ) -> Result<BTreeSet<String>, RefreshError> {
        let token = exchange(&self.api, org).await?;
        let keys = list_authorized_keys(&self.api, &token, &org.organization_name).await?;
        tracing::debug!(organization = %org.organization_name, keys = keys.len(), "fetched keys");
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
