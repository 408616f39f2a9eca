//! Transport client with tokio mpsc command/event pattern.
//!
//! The swarm event loop runs in a dedicated tokio task. Callers talk
//! to it through a typed command channel and receive inbound traffic
//! on a single bounded event channel, so events are observed strictly
//! in arrival order. Rooms map to GossipSub topics; the relay hub is
//! a regular gossipsub peer both clients dial.

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{gossipsub, identity, swarm::SwarmEvent, Multiaddr};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use entente_shared::constants::{CONNECT_TIMEOUT_SECS, RECONNECT_INTERVAL_SECS};
use entente_shared::protocol::{ChatMessage, PresenceMessage, SignalMessage, WireMessage};
use entente_shared::types::{ConnectionStatus, Participant, RoomKey};

use crate::behaviour::EntenteEvent;
use crate::error::TransportError;
use crate::swarm::build_swarm;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the transport task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Subscribe to a room topic and announce presence. Idempotent.
    JoinRoom {
        room_key: RoomKey,
        participant: Participant,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Unsubscribe from a room topic. The connection stays up.
    LeaveRoom { room_key: RoomKey },
    /// Publish a wire message on a room topic. At-most-once: a failed
    /// publish is reported through `reply`, nothing is queued.
    Publish {
        room_key: RoomKey,
        message: WireMessage,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Gracefully shut down the transport task.
    Shutdown,
}

/// Inbound events emitted *from* the transport task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A chat message arrived on a joined room.
    Chat { message: ChatMessage },
    /// A signaling payload arrived on a joined room.
    Signal { signal: SignalMessage },
    /// A participant announced presence in a joined room.
    PeerJoined {
        room_key: RoomKey,
        participant: Participant,
    },
    /// Connectivity to the relay changed. Non-fatal status indicator;
    /// the task keeps re-dialing on its own.
    Status(ConnectionStatus),
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Multiaddr of the relay hub to dial.
    pub relay_addr: Multiaddr,
    /// How long to wait for the initial connection.
    pub connect_timeout: Duration,
}

impl TransportConfig {
    pub fn new(relay_addr: Multiaddr) -> Self {
        Self {
            relay_addr,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the transport task.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    /// Wrap an existing command sender. Used by tests to script the
    /// transport side.
    pub fn new(cmd_tx: mpsc::Sender<TransportCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn join_room(
        &self,
        room_key: RoomKey,
        participant: Participant,
    ) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::JoinRoom {
                room_key,
                participant,
                reply,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    pub async fn leave_room(&self, room_key: RoomKey) -> Result<(), TransportError> {
        self.cmd_tx
            .send(TransportCommand::LeaveRoom { room_key })
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub async fn send_chat(
        &self,
        room_key: RoomKey,
        message: ChatMessage,
    ) -> Result<(), TransportError> {
        self.publish(room_key, WireMessage::Chat(message)).await
    }

    pub async fn send_signal(
        &self,
        room_key: RoomKey,
        signal: SignalMessage,
    ) -> Result<(), TransportError> {
        self.publish(room_key, WireMessage::Signal(signal)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(TransportCommand::Shutdown).await;
    }

    async fn publish(
        &self,
        room_key: RoomKey,
        message: WireMessage,
    ) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::Publish {
                room_key,
                message,
                reply,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        rx.await.map_err(|_| TransportError::ChannelClosed)?
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub struct Transport;

impl Transport {
    /// Dial the relay and spawn the transport task.
    ///
    /// Fails with [`TransportError::Unreachable`] if no connection is
    /// established within the connect timeout. After that, connection
    /// loss is surfaced as [`TransportEvent::Status`] while the task
    /// re-dials on a fixed interval.
    pub async fn connect(
        config: TransportConfig,
    ) -> Result<(TransportHandle, mpsc::Receiver<TransportEvent>), TransportError> {
        let keypair = identity::Keypair::generate_ed25519();
        let mut swarm =
            build_swarm(keypair).map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let relay_addr = config.relay_addr.clone();
        swarm
            .dial(relay_addr.clone())
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<TransportCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(256);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        tokio::spawn(run_event_loop(
            swarm,
            relay_addr.clone(),
            cmd_rx,
            event_tx,
            ready_tx,
        ));

        match tokio::time::timeout(config.connect_timeout, ready_rx).await {
            Ok(Ok(())) => Ok((TransportHandle { cmd_tx }, event_rx)),
            _ => Err(TransportError::Unreachable(relay_addr.to_string())),
        }
    }
}

async fn run_event_loop(
    mut swarm: libp2p::Swarm<crate::behaviour::EntenteBehaviour>,
    relay_addr: Multiaddr,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    event_tx: mpsc::Sender<TransportEvent>,
    ready_tx: oneshot::Sender<()>,
) {
    let mut ready = Some(ready_tx);
    let mut joined: HashSet<String> = HashSet::new();
    let mut connected = false;

    let mut redial = tokio::time::interval(Duration::from_secs(RECONNECT_INTERVAL_SECS));
    redial.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // --- Reconnection attempts ---
            _ = redial.tick() => {
                if !connected {
                    debug!(addr = %relay_addr, "Re-dialing relay");
                    if let Err(e) = swarm.dial(relay_addr.clone()) {
                        debug!(error = %e, "Re-dial failed");
                    }
                }
            }

            // --- Incoming commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::JoinRoom { room_key, participant, reply }) => {
                        let result = join_room(&mut swarm, &mut joined, &room_key, &participant);
                        let _ = reply.send(result);
                    }
                    Some(TransportCommand::LeaveRoom { room_key }) => {
                        let topic = room_key.to_topic();
                        if joined.remove(&topic) {
                            let unsubscribed = swarm
                                .behaviour_mut()
                                .gossipsub
                                .unsubscribe(&gossipsub::IdentTopic::new(&topic));
                            debug!(topic = %topic, unsubscribed = ?unsubscribed, "Left room");
                        }
                    }
                    Some(TransportCommand::Publish { room_key, message, reply }) => {
                        let _ = reply.send(publish(&mut swarm, &room_key, &message));
                    }
                    Some(TransportCommand::Shutdown) => {
                        info!("Transport shutdown requested");
                        break;
                    }
                    None => {
                        // All handles dropped
                        info!("Command channel closed, shutting down transport");
                        break;
                    }
                }
            }

            // --- Swarm events ---
            event = swarm.select_next_some() => {
                match event {
                    SwarmEvent::Behaviour(EntenteEvent::Gossipsub(
                        gossipsub::Event::Message { message, .. },
                    )) => {
                        match WireMessage::from_bytes(&message.data) {
                            Ok(WireMessage::Chat(chat)) => {
                                let _ = event_tx
                                    .send(TransportEvent::Chat { message: chat })
                                    .await;
                            }
                            Ok(WireMessage::Signal(signal)) => {
                                let _ = event_tx
                                    .send(TransportEvent::Signal { signal })
                                    .await;
                            }
                            Ok(WireMessage::Presence(PresenceMessage { room_key, participant })) => {
                                let _ = event_tx
                                    .send(TransportEvent::PeerJoined { room_key, participant })
                                    .await;
                            }
                            Err(e) => {
                                warn!(
                                    topic = %message.topic,
                                    error = %e,
                                    "Dropping malformed wire message"
                                );
                            }
                        }
                    }

                    SwarmEvent::Behaviour(EntenteEvent::Identify(
                        identify_event,
                    )) => {
                        debug!(event = ?identify_event, "Identify event");
                    }

                    SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                        info!(
                            peer = %peer_id,
                            addr = %endpoint.get_remote_address(),
                            "Connected to relay"
                        );
                        connected = true;
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(());
                        }
                        let _ = event_tx
                            .send(TransportEvent::Status(ConnectionStatus::Connected))
                            .await;
                    }

                    SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                        if num_established == 0 {
                            warn!(peer = %peer_id, "Relay connection lost");
                            connected = false;
                            let _ = event_tx
                                .send(TransportEvent::Status(ConnectionStatus::Disconnected))
                                .await;
                        }
                    }

                    SwarmEvent::OutgoingConnectionError { error, .. } => {
                        debug!(error = %error, "Outgoing connection error");
                    }

                    _ => {}
                }
            }
        }
    }

    info!("Transport event loop terminated");
}

/// Subscribe to the room topic and announce presence. Re-joining an
/// already joined room is a no-op.
fn join_room(
    swarm: &mut libp2p::Swarm<crate::behaviour::EntenteBehaviour>,
    joined: &mut HashSet<String>,
    room_key: &RoomKey,
    participant: &Participant,
) -> Result<(), TransportError> {
    let topic = room_key.to_topic();
    if joined.contains(&topic) {
        debug!(topic = %topic, "Already joined room");
        return Ok(());
    }

    swarm
        .behaviour_mut()
        .gossipsub
        .subscribe(&gossipsub::IdentTopic::new(&topic))
        .map_err(|e| TransportError::NotDelivered(e.to_string()))?;
    joined.insert(topic.clone());
    debug!(topic = %topic, "Joined room");

    // Presence is best-effort: the mesh may not have formed yet.
    let presence = WireMessage::Presence(PresenceMessage {
        room_key: room_key.clone(),
        participant: participant.clone(),
    });
    if let Err(e) = publish(swarm, room_key, &presence) {
        debug!(topic = %topic, error = %e, "Presence announcement not delivered");
    }

    Ok(())
}

fn publish(
    swarm: &mut libp2p::Swarm<crate::behaviour::EntenteBehaviour>,
    room_key: &RoomKey,
    message: &WireMessage,
) -> Result<(), TransportError> {
    let data = message
        .to_bytes()
        .map_err(|e| TransportError::Codec(e.to_string()))?;

    let topic = gossipsub::IdentTopic::new(room_key.to_topic());
    swarm
        .behaviour_mut()
        .gossipsub
        .publish(topic, data)
        .map(|_| ())
        .map_err(|e| TransportError::NotDelivered(e.to_string()))
}
