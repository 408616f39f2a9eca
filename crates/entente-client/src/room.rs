//! In-memory room session: the ordered message list for one open
//! conversation. Messages live only as long as the session; closing
//! the room drops the history.

use chrono::Utc;
use tracing::debug;

use entente_shared::protocol::ChatMessage;
use entente_shared::types::{
    AttachmentRef, GeoPoint, MessageId, Participant, ParticipantId, RoomKey,
};

/// One entry in the room's message list. `delivered` flips to false
/// when the transport reports the relay publish failed.
#[derive(Debug, Clone)]
pub struct MessageEntry {
    pub message: ChatMessage,
    pub delivered: bool,
}

/// Outgoing message under composition. Builds a [`ChatMessage`] only
/// when it carries at least one piece of content.
#[derive(Debug, Default)]
pub struct MessageDraft {
    text: Option<String>,
    file: Option<AttachmentRef>,
    audio_url: Option<String>,
    location: Option<GeoPoint>,
}

impl MessageDraft {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn file(mut self, file: AttachmentRef) -> Self {
        self.file = Some(file);
        self
    }

    pub fn audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    pub fn location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// `None` when the draft is all-empty; an empty draft is never
    /// relayed and never appended.
    pub fn into_message(self, room_key: RoomKey, sender: ParticipantId) -> Option<ChatMessage> {
        let message = ChatMessage {
            id: MessageId::generate(),
            room_key,
            sender,
            text: self.text,
            file: self.file,
            audio_url: self.audio_url,
            location: self.location,
            timestamp: Utc::now(),
        };
        message.has_content().then_some(message)
    }
}

/// The single open conversation. Append-only while open; the list
/// grows by exactly one per accepted message, in append order.
pub struct RoomSession {
    room_key: RoomKey,
    local: Participant,
    remote: Option<Participant>,
    messages: Vec<MessageEntry>,
}

impl RoomSession {
    pub fn new(room_key: RoomKey, local: Participant) -> Self {
        Self {
            room_key,
            local,
            remote: None,
            messages: Vec::new(),
        }
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    pub fn remote(&self) -> Option<&Participant> {
        self.remote.as_ref()
    }

    /// Record the remote participant once their presence arrives.
    pub fn set_remote(&mut self, participant: Participant) {
        self.remote = Some(participant);
    }

    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    /// Append a locally composed message, optimistically marked
    /// delivered.
    pub fn append_local(&mut self, message: ChatMessage) {
        self.messages.push(MessageEntry {
            message,
            delivered: true,
        });
    }

    /// Append a remote message. Messages without content or for a
    /// different room are dropped.
    pub fn append_remote(&mut self, message: ChatMessage) -> bool {
        if message.room_key != self.room_key {
            debug!(room = %message.room_key, "Dropping message for another room");
            return false;
        }
        if !message.has_content() {
            debug!(id = %message.id, "Dropping empty message");
            return false;
        }
        self.messages.push(MessageEntry {
            message,
            delivered: true,
        });
        true
    }

    /// Flip a local entry to undelivered after a failed relay publish.
    pub fn mark_undelivered(&mut self, id: &MessageId) {
        if let Some(entry) = self.messages.iter_mut().find(|e| &e.message.id == id) {
            entry.delivered = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> (RoomSession, ParticipantId, RoomKey) {
        let local = Participant::new("alice", "Alice");
        let remote_id = ParticipantId::new("bob");
        let key = RoomKey::between(&local.id, &remote_id);
        (RoomSession::new(key.clone(), local), remote_id, key)
    }

    #[test]
    fn test_messages_keep_append_order() {
        let (mut session, remote_id, key) = room();

        for i in 0..3 {
            let msg = MessageDraft::default()
                .text(format!("msg {i}"))
                .into_message(key.clone(), remote_id.clone())
                .unwrap();
            assert!(session.append_remote(msg));
        }

        assert_eq!(session.messages().len(), 3);
        let texts: Vec<_> = session
            .messages()
            .iter()
            .map(|e| e.message.text.clone().unwrap())
            .collect();
        assert_eq!(texts, ["msg 0", "msg 1", "msg 2"]);
    }

    #[test]
    fn test_empty_draft_builds_nothing() {
        let (_, remote_id, key) = room();
        assert!(MessageDraft::default()
            .into_message(key.clone(), remote_id.clone())
            .is_none());
        assert!(MessageDraft::default()
            .text("")
            .into_message(key, remote_id)
            .is_none());
    }

    #[test]
    fn test_message_for_other_room_dropped() {
        let (mut session, _, _) = room();
        let stranger = ParticipantId::new("carol");
        let other_key = RoomKey::between(&stranger, &ParticipantId::new("dave"));
        let msg = MessageDraft::default()
            .text("hi")
            .into_message(other_key, stranger)
            .unwrap();
        assert!(!session.append_remote(msg));
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_mark_undelivered_keeps_entry() {
        let (mut session, _, key) = room();
        let local_id = session.local().id.clone();
        let msg = MessageDraft::default()
            .text("hello")
            .into_message(key, local_id)
            .unwrap();
        let id = msg.id.clone();
        session.append_local(msg);

        session.mark_undelivered(&id);

        assert_eq!(session.messages().len(), 1);
        assert!(!session.messages()[0].delivered);
    }
}
