// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the admission gateway.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::refresh::RefreshOutcome;
use crate::state::GateState;
use crate::store::format_timestamp;

// -- Request/Response types ---------------------------------------------------

/// Admission request sent by the relay.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdmitRequest {
    #[serde(default)]
    pub node_public: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AdmitResponse {
    pub allow: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub organizations: usize,
    pub sync_time: Option<String>,
    pub key_count: Option<usize>,
}

/// Parse an admission body; `None` if malformed or a field is empty.
pub fn parse_admit_request(body: &[u8]) -> Option<AdmitRequest> {
    let req: AdmitRequest = serde_json::from_slice(body).ok()?;
    if req.node_public.is_empty() || req.source.is_empty() {
        return None;
    }
    Some(req)
}

/// Plain-text response carrying only the status reason phrase.
fn plain(code: GateError) -> Response {
    (code.status(), code.reason()).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `POST /`: decide whether a node key may connect to the relay.
pub async fn admit(State(s): State<Arc<GateState>>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return plain(GateError::MethodNotAllowed);
    }
    let Some(req) = parse_admit_request(&body) else {
        return plain(GateError::BadRequest);
    };

    let refresh_failure = match s.refresher.ensure_fresh().await {
        Ok(RefreshOutcome::Refreshed { keys }) => {
            tracing::debug!(keys, "cache refreshed for admission request");
            None
        }
        Ok(RefreshOutcome::Fresh | RefreshOutcome::ClaimLost) => None,
        Err(e) => match GateError::from(&e) {
            GateError::StoreUnavailable => {
                tracing::error!(err = %e, "cache store unavailable");
                return GateError::StoreUnavailable.to_http_response(e.to_string()).into_response();
            }
            _ => Some(e),
        },
    };

    let keys = match s.cache.read_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!(err = %e, "failed to read authorized keys");
            return GateError::StoreUnavailable.to_http_response(e.to_string()).into_response();
        }
    };

    if let Some(e) = refresh_failure {
        if keys.is_none() {
            return GateError::UpstreamError.to_http_response(e.to_string()).into_response();
        }
        tracing::warn!(err = %e, "deciding against previous key set");
    }

    let allow = keys.is_some_and(|keys| keys.contains(&req.node_public));
    tracing::debug!(node = %req.node_public, source = %req.source, allow, "admission decision");
    Json(AdmitResponse { allow }).into_response()
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GateState>>) -> Response {
    let freshness = s.cache.read_freshness().await;
    let keys = s.cache.read_keys().await;
    match (freshness, keys) {
        (Ok(freshness), Ok(keys)) => Json(HealthResponse {
            status: "running".to_owned(),
            organizations: s.refresher.organizations().len(),
            sync_time: freshness.synced_at().map(format_timestamp),
            key_count: keys.map(|k| k.len()),
        })
        .into_response(),
        (Err(e), _) | (_, Err(e)) => {
            GateError::StoreUnavailable.to_http_response(e.to_string()).into_response()
        }
    }
}
