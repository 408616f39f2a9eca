//! libp2p relay hub setup.
//!
//! The hub is a regular GossipSub peer that both clients dial. It
//! mirrors every topic subscription it observes, so room traffic
//! published by one client is forwarded through the hub's mesh to the
//! other even when the clients have no direct connectivity.

use std::collections::HashSet;

use futures::StreamExt;
use libp2p::{gossipsub, identify, swarm::SwarmEvent, Multiaddr, PeerId};
use tracing::{debug, info, warn};

use entente_net::{build_swarm, EntenteEvent};

/// Spawn the relay hub as a background tokio task.
///
/// Listens on QUIC at the given multiaddr string. Returns the local
/// `PeerId` so that clients can address the hub.
pub async fn spawn_relay(listen_addr: &str) -> anyhow::Result<PeerId> {
    // Ephemeral hub identity; clients dial by address, not peer id.
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let local_peer_id = keypair.public().to_peer_id();

    info!(peer_id = %local_peer_id, "Starting relay hub");

    let mut swarm = build_swarm(keypair)?;

    let multiaddr: Multiaddr = listen_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen multiaddr '{}': {}", listen_addr, e))?;

    swarm.listen_on(multiaddr.clone())?;
    info!(addr = %multiaddr, "Relay hub listening");

    tokio::spawn(async move {
        let mut mirrored: HashSet<String> = HashSet::new();

        loop {
            match swarm.select_next_some().await {
                // Gossipsub only forwards on topics this node is
                // subscribed to, so mirror every topic a client joins.
                SwarmEvent::Behaviour(EntenteEvent::Gossipsub(gossipsub::Event::Subscribed {
                    peer_id,
                    topic,
                })) => {
                    let name = topic.into_string();
                    if mirrored.insert(name.clone()) {
                        match swarm
                            .behaviour_mut()
                            .gossipsub
                            .subscribe(&gossipsub::IdentTopic::new(&name))
                        {
                            Ok(_) => info!(peer = %peer_id, topic = %name, "Mirroring room topic"),
                            Err(e) => {
                                warn!(topic = %name, error = %e, "Failed to mirror topic");
                                mirrored.remove(&name);
                            }
                        }
                    } else {
                        debug!(peer = %peer_id, topic = %name, "Peer joined mirrored topic");
                    }
                }

                SwarmEvent::Behaviour(EntenteEvent::Gossipsub(gossipsub::Event::Message {
                    message,
                    ..
                })) => {
                    // Payloads are opaque to the hub; gossipsub
                    // forwards them to the mesh on its own.
                    debug!(topic = %message.topic, size = message.data.len(), "Relayed message");
                }

                SwarmEvent::Behaviour(EntenteEvent::Identify(identify::Event::Received {
                    peer_id,
                    info,
                    ..
                })) => {
                    debug!(
                        peer = %peer_id,
                        protocol = %info.protocol_version,
                        "Identify: received info from peer"
                    );
                }

                SwarmEvent::NewListenAddr { address, .. } => {
                    info!(addr = %address, "Relay hub listening on new address");
                }

                SwarmEvent::ConnectionEstablished {
                    peer_id, endpoint, ..
                } => {
                    info!(
                        peer = %peer_id,
                        addr = %endpoint.get_remote_address(),
                        "Client connected"
                    );
                }

                SwarmEvent::ConnectionClosed {
                    peer_id,
                    num_established,
                    ..
                } => {
                    if num_established == 0 {
                        debug!(peer = %peer_id, "Client fully disconnected");
                    }
                }

                SwarmEvent::IncomingConnectionError { error, .. } => {
                    warn!(error = %error, "Incoming connection error");
                }

                _ => {}
            }
        }
    });

    Ok(local_peer_id)
}
