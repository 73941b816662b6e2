// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the admission HTTP API.
//!
//! Uses `axum_test::TestServer` against an in-process fake directory.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum_test::TestServer;
use chrono::{TimeDelta, Utc};
use serde_json::json;

use derpgate::state::GateState;
use derpgate::test_support::{
    device, test_state, test_state_with_store, FailingStore, FakeDirectory,
};
use derpgate::transport::build_router;

fn test_server(state: Arc<GateState>) -> anyhow::Result<TestServer> {
    Ok(TestServer::new(build_router(state))?)
}

fn admit_body(node: &str) -> serde_json::Value {
    json!({ "NodePublic": node, "Source": "203.0.113.7:41641" })
}

async fn acme_server() -> anyhow::Result<(FakeDirectory, Arc<GateState>, TestServer)> {
    let fake = FakeDirectory::start().await?;
    fake.set_devices("acme", vec![device("laptop", "nodekey:abc"), device("tv", "")]).await;
    let state = test_state(&fake, &["acme"], "all-or-nothing")?;
    let server = test_server(Arc::clone(&state))?;
    Ok((fake, state, server))
}

// -- Request validation -------------------------------------------------------

#[tokio::test]
async fn non_post_methods_are_rejected() -> anyhow::Result<()> {
    let (fake, _state, server) = acme_server().await?;

    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let resp = server.method(method.clone(), "/").await;
        resp.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.text(), "Method Not Allowed", "{method}");
    }
    assert_eq!(fake.token_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_requests_are_rejected() -> anyhow::Result<()> {
    let (fake, _state, server) = acme_server().await?;

    let bodies = [
        "",
        "NodePublic=nodekey:abc",
        "[]",
        r#"{"Source":"203.0.113.7:41641"}"#,
        r#"{"NodePublic":"nodekey:abc"}"#,
        r#"{"NodePublic":"","Source":"203.0.113.7:41641"}"#,
        r#"{"NodePublic":"nodekey:abc","Source":""}"#,
        r#"{"nodePublic":"nodekey:abc","source":"203.0.113.7:41641"}"#,
    ];
    for body in bodies {
        let resp = server.post("/").text(body).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.text(), "Bad Request", "body: {body:?}");
    }
    assert_eq!(fake.token_requests(), 0);
    Ok(())
}

// -- Admission ----------------------------------------------------------------

#[tokio::test]
async fn known_key_is_allowed() -> anyhow::Result<()> {
    let (fake, _state, server) = acme_server().await?;

    let resp = server.post("/").json(&admit_body("nodekey:abc")).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": true }));
    let content_type = resp.header("content-type");
    assert_eq!(content_type.to_str()?, "application/json");
    assert_eq!(fake.token_requests(), 1);
    assert_eq!(fake.device_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_key_is_denied() -> anyhow::Result<()> {
    let (_fake, _state, server) = acme_server().await?;

    let resp = server.post("/").json(&admit_body("nodekey:xyz")).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": false }));
    Ok(())
}

#[tokio::test]
async fn empty_node_key_record_never_admits() -> anyhow::Result<()> {
    let (_fake, state, server) = acme_server().await?;

    server.post("/").json(&admit_body("nodekey:xyz")).await.assert_status_ok();
    let cached = state.cache.read_keys().await?.unwrap_or_default();
    assert_eq!(cached.into_iter().collect::<Vec<_>>(), vec!["nodekey:abc".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn decisions_within_window_reuse_cache() -> anyhow::Result<()> {
    let (fake, _state, server) = acme_server().await?;

    for node in ["nodekey:abc", "nodekey:xyz", "nodekey:abc"] {
        server.post("/").json(&admit_body(node)).await.assert_status_ok();
    }
    assert_eq!(fake.token_requests(), 1);
    assert_eq!(fake.device_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn fresh_empty_cache_denies_without_refresh() -> anyhow::Result<()> {
    let (fake, state, server) = acme_server().await?;
    state.cache.write_sync_time(Utc::now() - TimeDelta::minutes(5)).await?;

    let resp = server.post("/").json(&admit_body("nodekey:abc")).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": false }));
    assert_eq!(fake.token_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn stale_cache_picks_up_new_devices() -> anyhow::Result<()> {
    let (fake, state, server) = acme_server().await?;
    let old = std::iter::once("nodekey:revoked".to_owned()).collect();
    state.cache.write(Utc::now() - TimeDelta::hours(2), &old).await?;

    let revoked = server.post("/").json(&admit_body("nodekey:revoked")).await;
    assert_eq!(revoked.json::<serde_json::Value>(), json!({ "Allow": false }));
    let current = server.post("/").json(&admit_body("nodekey:abc")).await;
    assert_eq!(current.json::<serde_json::Value>(), json!({ "Allow": true }));
    assert_eq!(fake.token_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn keys_from_every_organization_are_admitted() -> anyhow::Result<()> {
    let fake = FakeDirectory::start().await?;
    fake.set_keys("acme", &["nodekey:a1"]).await;
    fake.set_keys("globex", &["nodekey:g1", "nodekey:g2"]).await;
    let server = test_server(test_state(&fake, &["acme", "globex"], "all-or-nothing")?)?;

    for node in ["nodekey:a1", "nodekey:g1", "nodekey:g2"] {
        let resp = server.post("/").json(&admit_body(node)).await;
        assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": true }), "{node}");
    }
    Ok(())
}

// -- Failures -----------------------------------------------------------------

#[tokio::test]
async fn upstream_failure_without_previous_set_is_502() -> anyhow::Result<()> {
    let (fake, _state, server) = acme_server().await?;
    fake.fail_token("acme-id").await;

    let resp = server.post("/").json(&admit_body("nodekey:abc")).await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    Ok(())
}

#[tokio::test]
async fn upstream_failure_falls_back_to_previous_set() -> anyhow::Result<()> {
    let (fake, state, server) = acme_server().await?;
    let old = std::iter::once("nodekey:old".to_owned()).collect();
    state.cache.write(Utc::now() - TimeDelta::hours(2), &old).await?;
    fake.fail_devices("acme").await;

    let resp = server.post("/").json(&admit_body("nodekey:old")).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": true }));

    let resp = server.post("/").json(&admit_body("nodekey:abc")).await;
    assert_eq!(resp.json::<serde_json::Value>(), json!({ "Allow": false }));
    assert_eq!(fake.device_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn store_failure_is_503() -> anyhow::Result<()> {
    let fake = FakeDirectory::start().await?;
    let state = test_state_with_store(&fake, &["acme"], "all-or-nothing", Arc::new(FailingStore))?;
    let server = test_server(state)?;

    let resp = server.post("/").json(&admit_body("nodekey:abc")).await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
    assert_eq!(fake.token_requests(), 0);
    Ok(())
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_reports_cache_state() -> anyhow::Result<()> {
    let (_fake, _state, server) = acme_server().await?;

    let before: serde_json::Value = server.get("/api/v1/health").await.json();
    assert_eq!(before["status"], "running");
    assert_eq!(before["organizations"], 1);
    assert!(before["sync_time"].is_null());
    assert!(before["key_count"].is_null());

    server.post("/").json(&admit_body("nodekey:abc")).await.assert_status_ok();

    let after: serde_json::Value = server.get("/api/v1/health").await.json();
    assert!(after["sync_time"].is_string());
    assert_eq!(after["key_count"], 1);
    Ok(())
}

#[tokio::test]
async fn health_with_failing_store_is_503() -> anyhow::Result<()> {
    let fake = FakeDirectory::start().await?;
    let state = test_state_with_store(&fake, &["acme"], "best-effort", Arc::new(FailingStore))?;
    let server = test_server(state)?;

    server.get("/api/v1/health").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
