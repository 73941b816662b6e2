// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client wrapper for the device directory API.

use std::time::Duration;

use reqwest::{Client, Url};

/// Longest upstream error body kept in error messages.
const MAX_ERROR_BODY: usize = 256;

/// Shared HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(api_base)
            .map_err(|e| anyhow::anyhow!("invalid API base URL {api_base}: {e}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("invalid API base URL {api_base}: not a base URL");
        }
        crate::ensure_crypto();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Summarise a non-success response as `"<code> <reason>: <body>"`.
pub async fn describe_failure(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status();
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let text = resp.text().await.unwrap_or_default();
    let text = text.trim();

    let summary = if text.is_empty() {
        format!("{} {reason}", status.as_u16())
    } else {
        let body: String = text.chars().take(MAX_ERROR_BODY).collect();
        format!("{} {reason}: {body}", status.as_u16())
    };
    (status.as_u16(), summary)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
