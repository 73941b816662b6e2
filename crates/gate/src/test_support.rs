// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a fake device directory, store doubles, and
//! assertion helpers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::credential::OrganizationCredential;
use crate::state::GateState;
use crate::store::{KeyValueStore, MemoryStore, StoreError, StoreResult};

/// Credential for `name` with predictable client ID and secret.
pub fn org(name: &str) -> OrganizationCredential {
    OrganizationCredential::new(name, format!("{name}-id"), format!("{name}-secret"))
}

/// JSON organization list for `names`, in the configuration format.
pub fn orgs_json(names: &[&str]) -> String {
    let entries: Vec<serde_json::Value> = names
        .iter()
        .map(|name| {
            let cred = org(name);
            serde_json::json!({
                "organizationName": cred.organization_name,
                "clientId": cred.client_id,
                "clientSecret": cred.client_secret,
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

/// Device record shaped like the directory API's, with the given node key.
pub fn device(hostname: &str, node_key: &str) -> serde_json::Value {
    serde_json::json!({
        "addresses": ["100.64.0.1"],
        "authorized": true,
        "clientVersion": "1.80.0",
        "hostname": hostname,
        "id": format!("id-{hostname}"),
        "name": format!("{hostname}.example.ts.net"),
        "nodeKey": node_key,
        "os": "linux",
        "user": "ops@example.com",
    })
}

#[derive(Default)]
struct FakeState {
    devices: RwLock<HashMap<String, Vec<serde_json::Value>>>,
    failing_clients: RwLock<HashSet<String>>,
    failing_orgs: RwLock<HashSet<String>>,
    last_token_form: RwLock<Option<HashMap<String, String>>>,
    token_requests: AtomicU32,
    device_requests: AtomicU32,
}

/// In-process stand-in for the device directory API.
///
/// Serves the token and device-listing endpoints on an ephemeral port.
/// Tokens are `token-<client_id>`. Stops serving when dropped.
pub struct FakeDirectory {
    base_url: String,
    state: Arc<FakeState>,
    shutdown: CancellationToken,
}

impl FakeDirectory {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(FakeState::default());
        let router = Router::new()
            .route("/api/v2/oauth/token", post(fake_token))
            .route("/api/v2/tailnet/{org}/devices", get(fake_devices))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(cancel.cancelled_owned()).await;
        });

        Ok(Self { base_url: format!("http://{addr}"), state, shutdown })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the organization's devices with one device per node key.
    pub async fn set_keys(&self, organization: &str, node_keys: &[&str]) {
        let records = node_keys
            .iter()
            .enumerate()
            .map(|(i, key)| device(&format!("{organization}-host-{i}"), key))
            .collect();
        self.set_devices(organization, records).await;
    }

    pub async fn set_devices(&self, organization: &str, records: Vec<serde_json::Value>) {
        self.state.devices.write().await.insert(organization.to_owned(), records);
    }

    /// Reject token requests for `client_id` with 401.
    pub async fn fail_token(&self, client_id: &str) {
        self.state.failing_clients.write().await.insert(client_id.to_owned());
    }

    /// Answer device listings for `organization` with 500.
    pub async fn fail_devices(&self, organization: &str) {
        self.state.failing_orgs.write().await.insert(organization.to_owned());
    }

    /// Clear all injected failures.
    pub async fn recover(&self) {
        self.state.failing_clients.write().await.clear();
        self.state.failing_orgs.write().await.clear();
    }

    pub fn token_requests(&self) -> u32 {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn device_requests(&self) -> u32 {
        self.state.device_requests.load(Ordering::SeqCst)
    }

    pub async fn last_token_form(&self) -> Option<HashMap<String, String>> {
        self.state.last_token_form.read().await.clone()
    }
}

impl Drop for FakeDirectory {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn fake_token(
    State(s): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    s.token_requests.fetch_add(1, Ordering::SeqCst);
    *s.last_token_form.write().await = Some(form.clone());

    if form.get("grant_type").map(String::as_str) != Some("client_credentials") {
        return (StatusCode::BAD_REQUEST, "unsupported grant_type").into_response();
    }
    let client_id = form.get("client_id").cloned().unwrap_or_default();
    if s.failing_clients.read().await.contains(&client_id) {
        return (StatusCode::UNAUTHORIZED, "invalid client").into_response();
    }

    Json(serde_json::json!({
        "access_token": format!("token-{client_id}"),
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

async fn fake_devices(
    State(s): State<Arc<FakeState>>,
    Path(organization): Path<String>,
    headers: HeaderMap,
) -> Response {
    s.device_requests.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }
    if s.failing_orgs.read().await.contains(&organization) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "directory unavailable").into_response();
    }

    match s.devices.read().await.get(&organization) {
        Some(devices) => Json(serde_json::json!({ "devices": devices })).into_response(),
        None => (StatusCode::NOT_FOUND, "tailnet not found").into_response(),
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("injected failure".to_owned()))
    }

    async fn put(&self, _key: &str, _value: String) -> StoreResult<()> {
        Err(StoreError::Unavailable("injected failure".to_owned()))
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _value: String,
    ) -> StoreResult<bool> {
        Err(StoreError::Unavailable("injected failure".to_owned()))
    }
}

/// Build gate state against `fake` with a fresh memory store.
pub fn test_state(
    fake: &FakeDirectory,
    organizations: &[&str],
    aggregation: &str,
) -> anyhow::Result<Arc<GateState>> {
    test_state_with_store(fake, organizations, aggregation, Arc::new(MemoryStore::new()))
}

pub fn test_state_with_store(
    fake: &FakeDirectory,
    organizations: &[&str],
    aggregation: &str,
    kv: Arc<dyn KeyValueStore>,
) -> anyhow::Result<Arc<GateState>> {
    let mut config = GateConfig::test(&orgs_json(organizations), fake.base_url());
    config.aggregation = aggregation.to_owned();
    let orgs = config.load_organizations()?;
    Ok(Arc::new(GateState::new(config, orgs, kv, CancellationToken::new())?))
}

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
