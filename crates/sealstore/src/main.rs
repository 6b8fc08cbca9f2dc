//! `sealstore`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP).
//! 3. Load the domain root keys (Secrets Manager + KMS, or inline).
//! 4. Build the domain cryptors, storage, blob store and services.
//! 5. Bootstrap an administrator holding every scope.
//! 6. Build the Axum router and serve it, over TLS when configured.

mod access;
mod aws;
mod blob;
mod config;
mod crypto;
mod identity;
mod keyring;
mod objects;
mod server;
mod storage;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use blob::MemoryBlobStore;
use config::Config;
use crypto::Cryptors;
use identity::ScopeSet;
use server::state::AppState;
use storage::{with_transaction, MemoryDatabase};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        tls = cfg.tls_paths().is_some(),
        "sealstore starting"
    );

    // -----------------------------------------------------------------------
    // 3. Root keys
    // -----------------------------------------------------------------------
    let root_keys = keyring::load(&cfg).await?;

    // -----------------------------------------------------------------------
    // 4. Services
    // -----------------------------------------------------------------------
    let cryptors = Cryptors::new(root_keys);
    let state = AppState::new(
        MemoryDatabase::new(),
        &cryptors,
        Arc::new(MemoryBlobStore::new()),
        cfg.token_ttl(),
    );
    info!(
        token_ttl_secs = state.identity.token_ttl().num_seconds(),
        "services ready"
    );

    // -----------------------------------------------------------------------
    // 5. Administrator
    // -----------------------------------------------------------------------
    if cfg.bootstrap_admin {
        bootstrap_admin(&state)?;
    }

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(state);
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    match cfg.tls_paths() {
        Some((cert, key)) => {
            let tls = server::tls::load_server_config(cert, key).await?;
            server::tls::serve(listener, tls, router).await?;
        }
        None => axum::serve(listener, router).await?,
    }

    Ok(())
}

/// Create an all-scope administrator and print its credentials once.
///
/// The credentials go to stdout only, never through the log pipeline.
fn bootstrap_admin(state: &AppState) -> Result<()> {
    let (user_id, password) = with_transaction(&state.db, |tx| {
        state
            .identity
            .create_user_with_default_group(tx, ScopeSet::ALL)
    })
    .context("failed to bootstrap administrator")?;

    info!(user_id = %user_id, "administrator created");
    println!("admin user_id: {user_id}");
    println!("admin password: {password}");
    Ok(())
}
