//! # entente-server
//!
//! Hub endpoint for the entente communication core.
//!
//! This binary provides:
//! - a **libp2p GossipSub relay** that both chat clients dial, carrying
//!   room messages and call signaling between them
//! - **blob storage** for attachments (files stored as opaque bytes on
//!   disk, addressed by UUID)
//! - a **REST API** (axum) for health checks and blob upload/download
//!
//! It is not a media relay: call audio/video flows over external
//! STUN/TURN infrastructure negotiated by the clients.

mod api;
mod blob_store;
mod config;
mod error;
mod relay;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,entente_server=debug")),
        )
        .init();

    info!("Starting entente hub v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let blob_store = Arc::new(
        BlobStore::new(config.blob_storage_path.clone(), config.max_blob_size).await?,
    );

    let app_state = AppState {
        blob_store,
        config: Arc::new(config.clone()),
    };

    let relay_peer_id = relay::spawn_relay(&config.listen_addr).await?;
    info!(
        peer_id = %relay_peer_id,
        addr = %config.listen_addr,
        "Relay hub running in background"
    );

    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
