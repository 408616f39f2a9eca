use serde::{Deserialize, Serialize};

// Participant identity = stable organization/user identifier string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log output. Ids come off the wire, so the cut
    /// must land on a char boundary.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote participant descriptor shown in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// Deterministic identifier binding two participants into one logical
/// conversation/call channel. Both sides derive the same key from the
/// pair of ids, so no out-of-band room-id distribution is needed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn between(a: &ParticipantId, b: &ParticipantId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("room:{}:{}", lo.0, hi.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// GossipSub topic carrying this room's traffic.
    pub fn to_topic(&self) -> String {
        self.0.clone()
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier: unix-millis plus a random suffix. Locally unique
/// without a central sequence authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u32 = rand::random();
        Self(format!("{millis}-{suffix:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call media profile. Fixed at initiation; mid-call upgrade is not
/// supported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallKind {
    Audio,
    AudioVideo,
}

impl CallKind {
    pub fn has_video(&self) -> bool {
        matches!(self, Self::AudioVideo)
    }
}

/// Geolocation payload attachable to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

/// Reference to stored file/audio content. `url == None` is the
/// degraded form used when storage failed: the filename survives as
/// plain text, the content is not retrievable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRef {
    pub name: String,
    pub url: Option<String>,
}

impl AttachmentRef {
    pub fn stored(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
        }
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.url.is_some()
    }
}

/// Transport connectivity indicator surfaced to the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_symmetric() {
        let a = ParticipantId::new("org-alpha");
        let b = ParticipantId::new("org-beta");

        assert_eq!(RoomKey::between(&a, &b), RoomKey::between(&b, &a));
        assert_eq!(RoomKey::between(&a, &b).as_str(), "room:org-alpha:org-beta");
    }

    #[test]
    fn test_room_key_same_participant() {
        let a = ParticipantId::new("org-alpha");
        assert_eq!(
            RoomKey::between(&a, &a).as_str(),
            "room:org-alpha:org-alpha"
        );
    }

    #[test]
    fn test_message_id_shape() {
        let id = MessageId::generate();
        let parts: Vec<&str> = id.as_str().splitn(2, '-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 8);
    }

    #[test]
    fn test_message_id_unique() {
        let ids: std::collections::HashSet<String> = (0..100)
            .map(|_| MessageId::generate().as_str().to_string())
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_participant_short() {
        let id = ParticipantId::new("org-with-a-long-name");
        assert_eq!(id.short(), "org-with");
        let tiny = ParticipantId::new("ab");
        assert_eq!(tiny.short(), "ab");
    }

    #[test]
    fn test_participant_short_multibyte() {
        // Ids are wire-supplied; truncation must not split a char.
        let id = ParticipantId::new("日本語テスト");
        assert_eq!(id.short(), "日本語テスト");
        let long = ParticipantId::new("日本語テストの参加者識別子");
        assert_eq!(long.short(), "日本語テストの参");
    }
}
