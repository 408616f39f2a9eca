//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so a client can start against a local
//! relay with zero configuration.

use entente_media::IceConfig;
use entente_shared::constants::CONNECT_TIMEOUT_SECS;
use entente_shared::types::{Participant, ParticipantId};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Multiaddr of the relay hub to dial.
    /// Env: `RELAY_ADDR`
    /// Default: `/ip4/127.0.0.1/udp/4001/quic-v1`
    pub relay_addr: String,

    /// Base URL of the blob storage endpoint.
    /// Env: `BLOB_URL`
    /// Default: `http://127.0.0.1:8080`
    pub blob_url: String,

    /// Stable identifier of the local participant.
    /// Env: `PARTICIPANT_ID`
    /// Default: a random UUID (ephemeral identity).
    pub participant_id: String,

    /// Display name announced to rooms.
    /// Env: `DISPLAY_NAME`
    /// Default: `"anonymous"`
    pub display_name: String,

    /// STUN/TURN-style server URLs handed to the peer layer,
    /// comma-separated.
    /// Env: `ICE_SERVERS`
    /// Default: empty (host candidates only).
    pub ice_servers: Vec<String>,

    /// Seconds to wait for the initial relay connection.
    /// Env: `CONNECT_TIMEOUT_SECS`
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_addr: "/ip4/127.0.0.1/udp/4001/quic-v1".to_string(),
            blob_url: "http://127.0.0.1:8080".to_string(),
            participant_id: uuid::Uuid::new_v4().to_string(),
            display_name: "anonymous".to_string(),
            ice_servers: Vec::new(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RELAY_ADDR") {
            config.relay_addr = addr;
        }

        if let Ok(url) = std::env::var("BLOB_URL") {
            config.blob_url = url;
        }

        if let Ok(id) = std::env::var("PARTICIPANT_ID") {
            if !id.is_empty() {
                config.participant_id = id;
            }
        }

        if let Ok(name) = std::env::var("DISPLAY_NAME") {
            if !name.is_empty() {
                config.display_name = name;
            }
        }

        if let Ok(servers) = std::env::var("ICE_SERVERS") {
            config.ice_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(val) = std::env::var("CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.connect_timeout_secs = secs;
            } else {
                tracing::warn!(value = %val, "Invalid CONNECT_TIMEOUT_SECS, using default");
            }
        }

        config
    }

    pub fn participant(&self) -> Participant {
        Participant::new(self.participant_id.clone(), self.display_name.clone())
    }

    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId::new(self.participant_id.clone())
    }

    pub fn ice(&self) -> IceConfig {
        IceConfig {
            servers: self.ice_servers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.blob_url, "http://127.0.0.1:8080");
        assert!(config.ice_servers.is_empty());
        assert!(!config.participant_id.is_empty());
    }

    #[test]
    fn test_ice_server_list_parsing() {
        let config = ClientConfig {
            ice_servers: "stun:stun.example.org, turn:turn.example.org"
                .split(',')
                .map(str::trim)
                .map(String::from)
                .collect(),
            ..ClientConfig::default()
        };
        assert_eq!(config.ice().servers.len(), 2);
        assert_eq!(config.ice().servers[0], "stun:stun.example.org");
    }
}
