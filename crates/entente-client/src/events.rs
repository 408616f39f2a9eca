//! Events surfaced to the embedding UI.

use entente_media::{CallState, RemoteTrack};
use entente_shared::protocol::ChatMessage;
use entente_shared::types::{ConnectionStatus, MessageId, Participant, RoomKey};

/// What the client tells its UI. Delivered on a bounded channel in the
/// order the underlying transport events were observed.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A local message was appended to the open room (optimistically,
    /// before delivery resolves).
    MessageAppended { id: MessageId },

    /// A remote message arrived in the open room.
    MessageReceived { message: ChatMessage },

    /// A locally sent message could not be relayed. The entry stays in
    /// the room, marked undelivered.
    DeliveryFailed { id: MessageId },

    /// Relay connectivity changed.
    Status(ConnectionStatus),

    /// A participant announced presence in the open room.
    PeerJoined {
        room_key: RoomKey,
        participant: Participant,
    },

    /// The active call moved to a new state.
    CallStateChanged(CallState),

    /// Call setup or negotiation failed; the session is terminal.
    CallFailed { reason: String },

    /// The remote side's media track became available.
    RemoteStream { track: RemoteTrack },
}
