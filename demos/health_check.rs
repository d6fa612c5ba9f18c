//! Connects to the gateway configured in the environment, prints the
//! handshake result and the `health` RPC, then streams events for a few
//! seconds.
//!
//! Run with:
//!
//! ```text
//! GATEWAY_URL=ws://127.0.0.1:18789 GATEWAY_TOKEN=... \
//!     RUST_LOG=gateway_client=debug cargo run --example health_check
//! ```

use std::time::Duration;

use anyhow::Context;
use gateway_client::{Event, GatewayClient, ParsedEvent};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = GatewayClient::shared().context("invalid gateway configuration")?;
    info!(url = %client.config().url(), "Connecting");

    client
        .ensure_connected()
        .await
        .context("gateway unreachable")?;

    if let Some(hello) = client.hello() {
        info!(
            protocol = hello.protocol,
            server = %hello.server,
            scopes = ?hello.granted_scopes(),
            "Handshake complete"
        );
    }

    let health: Value = client.rpc("health", ()).await.context("health rpc")?;
    println!("{}", serde_json::to_string_pretty(&health)?);

    let _events = client.subscribe_all(|event: &Event| match event.parse() {
        ParsedEvent::Chat {
            session_key, state, ..
        } => info!(%session_key, %state, "Chat update"),
        ParsedEvent::Agent { run_id, stream, .. } => info!(%run_id, %stream, "Agent update"),
        ParsedEvent::Tick { ts } => info!(ts, "Tick"),
        ParsedEvent::Shutdown {
            reason,
            restart_expected_ms,
        } => info!(%reason, ?restart_expected_ms, "Gateway shutting down"),
        ParsedEvent::Challenge { .. } => {}
        ParsedEvent::Unknown { event, payload } => info!(%event, "{payload}"),
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    client.destroy();

    Ok(())
}
