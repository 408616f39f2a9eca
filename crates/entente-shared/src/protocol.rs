use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AttachmentRef, GeoPoint, MessageId, Participant, ParticipantId, RoomKey};

/// All wire protocol messages relayed between room participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Chat message (text, attachment, audio clip, location)
    Chat(ChatMessage),

    /// Call signaling (session offer/answer, reachability candidates, hangup)
    Signal(SignalMessage),

    /// Room join announcement
    Presence(PresenceMessage),
}

/// One chat entry. Immutable once created; lives only as long as the
/// owning room session (no persistence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_key: RoomKey,
    pub sender: ParticipantId,
    pub text: Option<String>,
    pub file: Option<AttachmentRef>,
    pub audio_url: Option<String>,
    pub location: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A message must carry at least one of text, file, audio or
    /// location. Senders reject all-empty drafts before relay.
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
            || self.file.is_some()
            || self.audio_url.is_some()
            || self.location.is_some()
    }
}

/// Signaling envelope for audio/video call negotiation. Transient:
/// applied to the call session on arrival, never retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub room_key: RoomKey,
    pub sender: ParticipantId,
    pub kind: SignalKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalKind {
    /// Session offer (SDP)
    Offer(String),
    /// Session answer (SDP)
    Answer(String),
    /// Network reachability candidate
    Candidate(String),
    /// Call ended by the remote side
    Hangup,
}

/// Announces presence in a room after joining its topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceMessage {
    pub room_key: RoomKey,
    pub participant: Participant,
}

impl WireMessage {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;

    fn sample_message() -> ChatMessage {
        let a = ParticipantId::new("org-a");
        let b = ParticipantId::new("org-b");
        ChatMessage {
            id: MessageId::generate(),
            room_key: RoomKey::between(&a, &b),
            sender: a,
            text: Some("bonjour".to_string()),
            file: None,
            audio_url: None,
            location: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_wire_message_roundtrip() {
        let msg = WireMessage::Chat(sample_message());

        let bytes = msg.to_bytes().unwrap();
        let restored = WireMessage::from_bytes(&bytes).unwrap();

        if let (WireMessage::Chat(orig), WireMessage::Chat(rest)) = (&msg, &restored) {
            assert_eq!(orig.id, rest.id);
            assert_eq!(orig.text, rest.text);
            assert_eq!(orig.room_key, rest.room_key);
        } else {
            panic!("Message type mismatch");
        }
    }

    #[test]
    fn test_signal_roundtrip() {
        let a = ParticipantId::new("org-a");
        let b = ParticipantId::new("org-b");
        let msg = WireMessage::Signal(SignalMessage {
            room_key: RoomKey::between(&a, &b),
            sender: a,
            kind: SignalKind::Candidate("candidate:1 1 udp 2130706431 10.0.0.1 54321 typ host".into()),
        });

        let bytes = msg.to_bytes().unwrap();
        assert!(matches!(
            WireMessage::from_bytes(&bytes).unwrap(),
            WireMessage::Signal(SignalMessage {
                kind: SignalKind::Candidate(_),
                ..
            })
        ));
    }

    #[test]
    fn test_has_content() {
        let mut msg = sample_message();
        assert!(msg.has_content());

        msg.text = None;
        assert!(!msg.has_content());

        msg.text = Some(String::new());
        assert!(!msg.has_content());

        msg.location = Some(GeoPoint {
            latitude: 48.85,
            longitude: 2.35,
            label: "Paris".into(),
        });
        assert!(msg.has_content());
    }
}
