// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device listing for one organization.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::credential::oauth::BearerToken;
use crate::refresh::RefreshError;
use crate::upstream::client::{describe_failure, ApiClient};

/// Device record from the directory. Only `node_key` feeds admission; the
/// other fields are kept for log context and everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub node_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Collect the non-empty node keys of `devices`.
pub fn authorized_keys(devices: &[Device]) -> BTreeSet<String> {
    devices
        .iter()
        .filter_map(|d| d.node_key.as_deref())
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Fetch the organization's devices and return their node keys.
pub async fn list_authorized_keys(
    api: &ApiClient,
    token: &BearerToken,
    organization: &str,
) -> Result<BTreeSet<String>, RefreshError> {
    let directory_error = |status: Option<u16>, reason: String| RefreshError::UpstreamDirectory {
        organization: organization.to_owned(),
        status,
        reason,
    };

    let resp = api
        .http()
        .get(api.endpoint(&["api", "v2", "tailnet", organization, "devices"]))
        .bearer_auth(token.secret())
        .send()
        .await
        .map_err(|e| directory_error(None, format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        let (status, reason) = describe_failure(resp).await;
        return Err(directory_error(Some(status), reason));
    }

    let body: DevicesResponse = resp
        .json()
        .await
        .map_err(|e| directory_error(None, format!("invalid devices response: {e}")))?;

    for device in body.devices.iter().filter(|d| d.node_key.as_deref().unwrap_or("").is_empty()) {
        tracing::debug!(
            organization,
            device_id = device.id.as_deref().unwrap_or("-"),
            hostname = device.hostname.as_deref().or(device.name.as_deref()).unwrap_or("-"),
            "device has no node key, skipping"
        );
    }

    let keys = authorized_keys(&body.devices);
    tracing::debug!(organization, devices = body.devices.len(), keys = keys.len(), "listed devices");
    Ok(keys)
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
