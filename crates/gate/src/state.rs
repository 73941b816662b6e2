// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::credential::OrganizationCredential;
use crate::refresh::Refresher;
use crate::store::{CacheStore, KeyValueStore};
use crate::upstream::client::ApiClient;

/// Shared gateway state. Holds no admission data itself: every handler
/// reads and writes the cache through the store.
pub struct GateState {
    pub config: GateConfig,
    pub cache: CacheStore,
    pub refresher: Refresher,
    pub shutdown: CancellationToken,
}

impl GateState {
    pub fn new(
        config: GateConfig,
        organizations: Vec<OrganizationCredential>,
        kv: Arc<dyn KeyValueStore>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.api_base, config.upstream_timeout())?;
        let cache = CacheStore::new(kv);
        let refresher =
            Refresher::new(api, organizations, cache.clone(), config.aggregation_policy()?);
        Ok(Self { config, cache, refresher, shutdown })
    }

    /// Load organizations and open the configured store.
    pub fn from_config(config: GateConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let organizations = config.load_organizations()?;
        let kv = crate::store::open(config.store_kind()?, &config.state_dir())?;
        Self::new(config, organizations, kv, shutdown)
    }
}
