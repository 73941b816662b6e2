// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::credential::{self, OrganizationCredential};
use crate::refresh::Aggregation;
use crate::store::StoreKind;

/// Admission gateway for DERP relays backed by a cached device directory.
#[derive(Debug, Clone, Parser)]
#[command(name = "derpgate", version, about)]
pub struct GateConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DERPGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8787, env = "DERPGATE_PORT")]
    pub port: u16,

    /// Organization credentials as an inline JSON array.
    #[arg(long, env = "DERPGATE_ORGANIZATIONS", hide_env_values = true)]
    pub organizations: Option<String>,

    /// Path to a JSON file holding the organization credentials.
    #[arg(long, env = "DERPGATE_ORGANIZATIONS_FILE")]
    pub organizations_file: Option<PathBuf>,

    /// Cache store backend (file, memory).
    #[arg(long, default_value = "file", env = "DERPGATE_STORE")]
    pub store: String,

    /// Directory for the file store.
    #[arg(long, env = "DERPGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Base URL of the device directory API.
    #[arg(long, default_value = "https://api.tailscale.com", env = "DERPGATE_API_BASE")]
    pub api_base: String,

    /// Refresh aggregation policy (all-or-nothing, best-effort).
    #[arg(long, default_value = "all-or-nothing", env = "DERPGATE_AGGREGATION")]
    pub aggregation: String,

    /// Timeout for each upstream HTTP call in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "DERPGATE_UPSTREAM_TIMEOUT_MS")]
    pub upstream_timeout_ms: u64,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "DERPGATE_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DERPGATE_LOG_LEVEL")]
    pub log_level: String,
}

impl GateConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.organizations, &self.organizations_file) {
            (None, None) => {
                anyhow::bail!("either --organizations or --organizations-file must be specified")
            }
            (Some(_), Some(_)) => {
                anyhow::bail!("cannot specify both --organizations and --organizations-file")
            }
            _ => {}
        }

        self.store_kind()?;
        self.aggregation_policy()?;

        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {}", self.log_format);
        }
        if self.upstream_timeout_ms == 0 {
            anyhow::bail!("--upstream-timeout-ms must be greater than zero");
        }

        Ok(())
    }

    pub fn store_kind(&self) -> anyhow::Result<StoreKind> {
        self.store.parse()
    }

    pub fn aggregation_policy(&self) -> anyhow::Result<Aggregation> {
        self.aggregation.parse()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Load and validate the configured organization credentials.
    pub fn load_organizations(&self) -> anyhow::Result<Vec<OrganizationCredential>> {
        let raw = match (&self.organizations, &self.organizations_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("failed to read organizations file {}: {e}", path.display())
            })?,
            (None, None) => anyhow::bail!("no organizations configured"),
        };
        credential::parse_organizations(&raw)
    }

    /// Resolve the state directory for the file store.
    ///
    /// Uses `--state-dir`, then `$XDG_STATE_HOME/derpgate`,
    /// then `$HOME/.local/state/derpgate`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("derpgate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/derpgate");
        }
        PathBuf::from(".derpgate")
    }

    /// Build a minimal config for tests (memory store, port 0).
    pub fn test(organizations: &str, api_base: &str) -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            organizations: Some(organizations.to_owned()),
            organizations_file: None,
            store: "memory".to_owned(),
            state_dir: None,
            api_base: api_base.to_owned(),
            aggregation: "all-or-nothing".to_owned(),
            upstream_timeout_ms: 5_000,
            log_format: "text".to_owned(),
            log_level: "debug".to_owned(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
