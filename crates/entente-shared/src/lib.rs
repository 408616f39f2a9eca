// Shared types and wire protocol for the Entente communication core.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ChatMessage, PresenceMessage, SignalKind, SignalMessage, WireMessage};
pub use types::{
    AttachmentRef, CallKind, ConnectionStatus, GeoPoint, MessageId, Participant, ParticipantId,
    RoomKey,
};
