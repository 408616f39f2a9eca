//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use entente_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_RELAY_PORT, MAX_BLOB_SIZE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// libp2p multiaddr to listen on (QUIC).
    /// Env: `LISTEN_ADDR`
    /// Default: `/ip4/0.0.0.0/udp/4001/quic-v1`
    pub listen_addr: String,

    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Base URL under which stored blobs are reachable. Returned to
    /// uploaders so the reference can be relayed as-is.
    /// Env: `PUBLIC_URL`
    /// Default: `http://127.0.0.1:8080`
    pub public_url: String,

    /// Filesystem path where blobs are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Maximum blob size in bytes (50 MiB).
    pub max_blob_size: usize,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Entente Hub"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("/ip4/0.0.0.0/udp/{DEFAULT_RELAY_PORT}/quic-v1"),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            public_url: format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}"),
            blob_storage_path: PathBuf::from("./blobs"),
            max_blob_size: MAX_BLOB_SIZE,
            instance_name: "Entente Hub".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(url) = std::env::var("PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(path) = std::env::var("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.listen_addr, "/ip4/0.0.0.0/udp/4001/quic-v1");
        assert_eq!(config.max_blob_size, 50 * 1024 * 1024);
    }
}
