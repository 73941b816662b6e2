// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Organization credentials and the client-credentials token exchange.
//!
//! Credentials are parsed once at startup from a JSON array. Every entry must
//! carry a non-empty organization name, client ID, and client secret, and
//! organization names must be unique. Startup fails otherwise.

pub mod oauth;

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

/// OAuth client credentials for one managed organization.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCredential {
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl OrganizationCredential {
    pub fn new(
        organization_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            organization_name: organization_name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn validate(&self, index: usize) -> anyhow::Result<()> {
        let missing = [
            ("organizationName", &self.organization_name),
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        if let Some((field, _)) = missing {
            anyhow::bail!("organization entry {index}: {field} must not be empty");
        }
        Ok(())
    }
}

// Keep the secret out of logs and panics.
impl fmt::Debug for OrganizationCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizationCredential")
            .field("organization_name", &self.organization_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Parse and validate the organization credential list.
pub fn parse_organizations(raw: &str) -> anyhow::Result<Vec<OrganizationCredential>> {
    let orgs: Vec<OrganizationCredential> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("invalid organizations JSON: {e}"))?;

    if orgs.is_empty() {
        anyhow::bail!("at least one organization must be configured");
    }

    let mut seen = HashSet::new();
    for (index, org) in orgs.iter().enumerate() {
        org.validate(index)?;
        if !seen.insert(org.organization_name.as_str()) {
            anyhow::bail!("duplicate organization: {}", org.organization_name);
        }
    }

    Ok(orgs)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
