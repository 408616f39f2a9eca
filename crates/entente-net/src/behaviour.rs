//! Composed libp2p `NetworkBehaviour` for Entente nodes.
//!
//! Combines GossipSub (room pub/sub for chat and signaling) and
//! Identify (protocol negotiation with the relay hub). Peer discovery
//! and NAT traversal are external collaborators and have no behaviour
//! here.

use libp2p::{gossipsub, identify, swarm::NetworkBehaviour};

/// Composed network behaviour shared by clients and the relay hub.
///
/// All sub-behaviours are driven by the single swarm event loop.
/// Construction is handled by [`super::swarm::build_swarm`] via
/// `SwarmBuilder`.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "EntenteEvent")]
pub struct EntenteBehaviour {
    /// Pub/sub messaging for room messages and signaling
    pub gossipsub: gossipsub::Behaviour,
    /// Protocol identification and capability advertisement
    pub identify: identify::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum EntenteEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for EntenteEvent {
    fn from(event: gossipsub::Event) -> Self {
        EntenteEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for EntenteEvent {
    fn from(event: identify::Event) -> Self {
        EntenteEvent::Identify(event)
    }
}
