// Transport layer: persistent connection to the relay hub over libp2p
// (QUIC + GossipSub), carrying both chat messages and call signaling.

pub mod behaviour;
pub mod client;
pub mod error;
pub mod swarm;

pub use behaviour::{EntenteBehaviour, EntenteEvent};
pub use client::{Transport, TransportCommand, TransportConfig, TransportEvent, TransportHandle};
pub use error::TransportError;
pub use swarm::build_swarm;

pub use libp2p::Multiaddr;
