/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/entente/1.0.0";

/// Application name
pub const APP_NAME: &str = "Entente";

/// Maximum wire message size in bytes (256 KiB)
pub const MAX_WIRE_MESSAGE_SIZE: usize = 262_144;

/// Maximum attachment blob size in bytes (50 MiB)
pub const MAX_BLOB_SIZE: usize = 50 * 1024 * 1024;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC port of the relay hub
pub const DEFAULT_RELAY_PORT: u16 = 4001;

/// Default HTTP API port (blob endpoint)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Interval between re-dial attempts after connection loss, in seconds
pub const RECONNECT_INTERVAL_SECS: u64 = 5;

/// How long `Transport::connect` waits for the first connection, in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Microphone capture sample rate
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Microphone capture channel count (mono)
pub const AUDIO_CHANNELS: u16 = 1;

/// Audio frame length in milliseconds
pub const AUDIO_FRAME_MS: u32 = 20;
