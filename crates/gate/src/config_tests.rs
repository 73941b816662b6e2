// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::GateConfig;
use crate::refresh::Aggregation;
use crate::store::StoreKind;

const ORGS: &str = r#"[{"organizationName":"acme","clientId":"id","clientSecret":"secret"}]"#;

fn parse(args: &[&str]) -> GateConfig {
    GateConfig::parse_from(args)
}

#[test]
fn defaults_with_inline_organizations() -> anyhow::Result<()> {
    let config = parse(&["derpgate", "--organizations", ORGS]);
    config.validate()?;
    assert_eq!(config.port, 8787);
    assert_eq!(config.store_kind()?, StoreKind::File);
    assert_eq!(config.aggregation_policy()?, Aggregation::AllOrNothing);
    assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
    assert_eq!(config.api_base, "https://api.tailscale.com");

    let orgs = config.load_organizations()?;
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].organization_name, "acme");
    Ok(())
}

#[test]
fn overrides_are_parsed() -> anyhow::Result<()> {
    let config = parse(&[
        "derpgate",
        "--organizations",
        ORGS,
        "--store",
        "memory",
        "--aggregation",
        "best-effort",
        "--upstream-timeout-ms",
        "1500",
        "--log-format",
        "json",
    ]);
    config.validate()?;
    assert_eq!(config.store_kind()?, StoreKind::Memory);
    assert_eq!(config.aggregation_policy()?, Aggregation::BestEffort);
    assert_eq!(config.upstream_timeout(), Duration::from_millis(1500));
    Ok(())
}

#[yare::parameterized(
    no_organizations   = { &["derpgate"], "--organizations or --organizations-file" },
    both_sources       = { &["derpgate", "--organizations", "[]", "--organizations-file", "/tmp/x.json"],
                           "cannot specify both" },
    bad_store          = { &["derpgate", "--organizations", "[]", "--store", "redis"], "invalid store" },
    bad_aggregation    = { &["derpgate", "--organizations", "[]", "--aggregation", "majority"],
                           "invalid aggregation" },
    bad_log_format     = { &["derpgate", "--organizations", "[]", "--log-format", "xml"], "invalid log format" },
    zero_timeout       = { &["derpgate", "--organizations", "[]", "--upstream-timeout-ms", "0"],
                           "greater than zero" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn organizations_file_is_loaded() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(ORGS.as_bytes())?;
    let path = file.path().to_string_lossy().into_owned();

    let config = parse(&["derpgate", "--organizations-file", &path]);
    config.validate()?;
    let orgs = config.load_organizations()?;
    assert_eq!(orgs[0].client_id, "id");
    Ok(())
}

#[test]
fn missing_organizations_file_fails_startup() {
    let config = parse(&["derpgate", "--organizations-file", "/nonexistent/derpgate/orgs.json"]);
    crate::assert_err_contains!(config.load_organizations(), "failed to read organizations file");
}

#[test]
fn invalid_organization_entry_fails_startup() {
    let config = parse(&[
        "derpgate",
        "--organizations",
        r#"[{"organizationName":"acme","clientId":"","clientSecret":"s"}]"#,
    ]);
    crate::assert_err_contains!(config.load_organizations(), "clientId");
}

#[test]
fn explicit_state_dir_wins() {
    let config = parse(&["derpgate", "--organizations", ORGS, "--state-dir", "/var/lib/derpgate"]);
    assert_eq!(config.state_dir(), PathBuf::from("/var/lib/derpgate"));
}
