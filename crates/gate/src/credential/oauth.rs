// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth client-credentials exchange.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::credential::OrganizationCredential;
use crate::refresh::RefreshError;
use crate::upstream::client::{describe_failure, ApiClient};

/// Read-only device listing.
pub const OAUTH_SCOPE: &str = "devices:core:read";

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
}

/// Short-lived access token. Used for one refresh and then dropped.
#[derive(Clone)]
pub struct BearerToken {
    secret: String,
    expires_in: Duration,
}

impl BearerToken {
    pub fn new(secret: impl Into<String>, expires_in: Duration) -> Self {
        Self { secret: secret.into(), expires_in }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Lifetime declared by the token endpoint. Informational only.
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken").field("expires_in", &self.expires_in).finish_non_exhaustive()
    }
}

/// Exchange one organization's client credentials for a bearer token.
pub async fn exchange(
    api: &ApiClient,
    credential: &OrganizationCredential,
) -> Result<BearerToken, RefreshError> {
    let organization = &credential.organization_name;
    let auth_error = |status: Option<u16>, reason: String| RefreshError::UpstreamAuth {
        organization: organization.clone(),
        status,
        reason,
    };

    let resp = api
        .http()
        .post(api.endpoint(&["api", "v2", "oauth", "token"]))
        .form(&[
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("scope", OAUTH_SCOPE),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await
        .map_err(|e| auth_error(None, format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        let (status, reason) = describe_failure(resp).await;
        return Err(auth_error(Some(status), reason));
    }

    let token: TokenResponse =
        resp.json().await.map_err(|e| auth_error(None, format!("invalid token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(auth_error(None, "empty access_token".to_owned()));
    }

    tracing::debug!(
        organization = %organization,
        token_type = token.token_type.as_deref().unwrap_or("unknown"),
        expires_in = token.expires_in,
        "obtained access token"
    );
    Ok(BearerToken::new(token.access_token, Duration::from_secs(token.expires_in)))
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
