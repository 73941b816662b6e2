// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derpgate: DERP relay admission backed by a cached device directory.

pub mod config;
pub mod credential;
pub mod error;
pub mod refresh;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;
pub mod upstream;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::state::GateState;
use crate::transport::build_router;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the gateway until shutdown.
pub async fn run(config: GateConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = GateState::from_config(config, shutdown.clone())?;
    tracing::info!(
        organizations = state.refresher.organizations().len(),
        store = %state.config.store,
        aggregation = %state.refresher.aggregation(),
        "derpgate listening on {addr}"
    );

    spawn_signal_handler(shutdown.clone());

    let router = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    tracing::info!("derpgate stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("shutdown requested");
        shutdown.cancel();
    });
}
