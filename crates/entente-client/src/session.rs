//! The client orchestrator.
//!
//! One `ChatClient` per local participant. It owns the transport
//! handle, at most one open room and one non-terminal call, the
//! capture manager and the attachment store, and consumes the
//! transport event receiver from a single task so inbound traffic is
//! applied in arrival order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use entente_media::{
    kind_from_sdp, store_or_degrade, AttachmentStore, CallError, CallSession, CallState,
    CaptureManager, CpalBackend, HttpAttachmentStore, IceConfig, Recorder,
};
use entente_net::{
    Multiaddr, Transport, TransportConfig, TransportEvent, TransportHandle,
};
use entente_shared::protocol::{SignalKind, SignalMessage};
use entente_shared::types::{CallKind, GeoPoint, MessageId, Participant, RoomKey};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::room::{MessageDraft, RoomSession};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct ChatClient {
    local: Participant,
    ice: IceConfig,
    transport: TransportHandle,
    capture: CaptureManager,
    store: Arc<dyn AttachmentStore>,
    room: Option<RoomSession>,
    call: Option<CallSession>,
    recorder: Option<Recorder>,
    events: mpsc::Sender<ClientEvent>,
}

impl ChatClient {
    /// Assemble a client from its collaborators. Tests inject a
    /// scripted transport handle and a stub capture backend here;
    /// production goes through [`ChatClient::connect`].
    pub fn new(
        local: Participant,
        ice: IceConfig,
        transport: TransportHandle,
        capture: CaptureManager,
        store: Arc<dyn AttachmentStore>,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                local,
                ice,
                transport,
                capture,
                store,
                room: None,
                call: None,
                recorder: None,
                events,
            },
            events_rx,
        )
    }

    /// Dial the relay and build a production client. Returns the
    /// client, its UI event receiver, and the transport event receiver
    /// the embedding application must feed to [`ChatClient::pump`].
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<ClientEvent>,
            mpsc::Receiver<TransportEvent>,
        ),
        ClientError,
    > {
        let relay_addr: Multiaddr = config
            .relay_addr
            .parse()
            .map_err(|e| ClientError::Config(format!("bad relay address: {e}")))?;

        let mut transport_config = TransportConfig::new(relay_addr);
        transport_config.connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let (transport, transport_rx) = Transport::connect(transport_config).await?;

        let capture = CaptureManager::new(Arc::new(CpalBackend));
        let store = Arc::new(HttpAttachmentStore::new(config.blob_url.clone()));

        let (client, events_rx) = Self::new(
            config.participant(),
            config.ice(),
            transport,
            capture,
            store,
        );
        Ok((client, events_rx, transport_rx))
    }

    pub fn room(&self) -> Option<&RoomSession> {
        self.room.as_ref()
    }

    pub fn call_state(&self) -> Option<CallState> {
        self.call.as_ref().map(|c| c.state())
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    /// Open the conversation with `remote`, replacing any previously
    /// open room (its history is dropped, its call hung up).
    pub async fn open_room(&mut self, remote: Participant) -> Result<RoomKey, ClientError> {
        if self.room.is_some() {
            self.close_room().await;
        }

        let room_key = RoomKey::between(&self.local.id, &remote.id);
        self.transport
            .join_room(room_key.clone(), self.local.clone())
            .await?;

        let mut session = RoomSession::new(room_key.clone(), self.local.clone());
        session.set_remote(remote);
        self.room = Some(session);

        info!(room = %room_key, "Room opened");
        Ok(room_key)
    }

    /// Leave the open room. Hangs up the active call and drops the
    /// message history. No-op without a room.
    pub async fn close_room(&mut self) {
        self.end_call_locally().await;
        if let Some(mut recorder) = self.recorder.take() {
            let _ = recorder.finish();
        }
        if let Some(session) = self.room.take() {
            let _ = self.transport.leave_room(session.room_key().clone()).await;
            info!(room = %session.room_key(), "Room closed");
        }
    }

    // -----------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------

    /// Relay a text message. An all-empty text is a no-op returning
    /// `None`.
    pub async fn send_text(
        &mut self,
        text: impl Into<String>,
    ) -> Result<Option<MessageId>, ClientError> {
        self.send_draft(MessageDraft::default().text(text)).await
    }

    pub async fn send_location(
        &mut self,
        location: GeoPoint,
    ) -> Result<Option<MessageId>, ClientError> {
        self.send_draft(MessageDraft::default().location(location))
            .await
    }

    /// Upload a file and relay its reference. A failed upload degrades
    /// to a filename-only message rather than failing the send.
    pub async fn send_file(
        &mut self,
        data: Vec<u8>,
        filename: &str,
    ) -> Result<Option<MessageId>, ClientError> {
        if self.room.is_none() {
            return Err(ClientError::NoRoom);
        }
        let attachment = store_or_degrade(self.store.as_ref(), data, filename).await;
        self.send_draft(MessageDraft::default().file(attachment))
            .await
    }

    async fn send_draft(&mut self, draft: MessageDraft) -> Result<Option<MessageId>, ClientError> {
        let room = self.room.as_mut().ok_or(ClientError::NoRoom)?;
        let room_key = room.room_key().clone();

        let Some(message) = draft.into_message(room_key.clone(), self.local.id.clone()) else {
            debug!("Empty draft, nothing sent");
            return Ok(None);
        };
        let id = message.id.clone();

        // Optimistic append; a failed relay flips the entry instead of
        // removing it.
        room.append_local(message.clone());
        self.emit(ClientEvent::MessageAppended { id: id.clone() })
            .await;

        if let Err(e) = self.transport.send_chat(room_key, message).await {
            warn!(id = %id, error = %e, "Message not delivered");
            if let Some(room) = self.room.as_mut() {
                room.mark_undelivered(&id);
            }
            self.emit(ClientEvent::DeliveryFailed { id: id.clone() })
                .await;
        }
        Ok(Some(id))
    }

    // -----------------------------------------------------------------
    // Voice recording
    // -----------------------------------------------------------------

    /// Start a microphone recording. Fails fast when the device is
    /// already recording or in a call.
    pub fn start_recording(&mut self) -> Result<(), ClientError> {
        if self.room.is_none() {
            return Err(ClientError::NoRoom);
        }
        let recorder = self.capture.start_recording()?;
        self.recorder = Some(recorder);
        Ok(())
    }

    /// Finish the recording, store the clip and relay an audio
    /// message. When storage fails the clip is not retrievable, so the
    /// message degrades to a text marker carrying the filename.
    /// Without an active recording this is a no-op returning `None`.
    pub async fn finish_recording(&mut self) -> Result<Option<MessageId>, ClientError> {
        let Some(mut recorder) = self.recorder.take() else {
            return Ok(None);
        };
        let Some(clip) = recorder.finish() else {
            return Ok(None);
        };

        let filename = clip.suggested_filename();
        let attachment = store_or_degrade(self.store.as_ref(), clip.data, &filename).await;

        let draft = match attachment.url {
            Some(url) => MessageDraft::default().audio(url),
            None => MessageDraft::default().text(format!("[audio] {}", attachment.name)),
        };
        self.send_draft(draft).await
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    /// Offer a call to the open room's remote participant. Capture
    /// failures surface immediately; nothing is retried.
    pub async fn start_call(&mut self, kind: CallKind) -> Result<(), ClientError> {
        let room = self.room.as_ref().ok_or(ClientError::NoRoom)?;
        if self
            .call
            .as_ref()
            .is_some_and(|c| !c.state().is_terminal())
        {
            return Err(ClientError::CallInProgress);
        }
        let remote = room
            .remote()
            .ok_or(ClientError::Config("remote participant unknown".to_string()))?
            .id
            .clone();
        let room_key = room.room_key().clone();

        let media = match self.capture.acquire_call_media(kind) {
            Ok(media) => media,
            Err(e) => {
                let err = CallError::MediaSetup(e);
                self.emit(ClientEvent::CallFailed {
                    reason: err.to_string(),
                })
                .await;
                return Err(err.into());
            }
        };

        let mut call = CallSession::new(
            room_key.clone(),
            self.local.id.clone(),
            remote,
            kind,
            media,
            self.ice.clone(),
        );
        let offer = call.initiate()?;
        let state = call.state();
        self.call = Some(call);

        self.transport.send_signal(room_key, offer).await?;
        self.emit(ClientEvent::CallStateChanged(state)).await;
        Ok(())
    }

    /// Hang up the active call. Idempotent; a second call is a no-op.
    pub async fn hangup(&mut self) {
        self.end_call_locally().await;
    }

    async fn end_call_locally(&mut self) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if let Some(signal) = call.hangup() {
            let room_key = call.room_key().clone();
            // Best-effort: the call is over locally either way.
            if let Err(e) = self.transport.send_signal(room_key, signal).await {
                debug!(error = %e, "Hangup signal not delivered");
            }
            self.emit(ClientEvent::CallStateChanged(CallState::Ended))
                .await;
        }
    }

    // -----------------------------------------------------------------
    // Transport event pump
    // -----------------------------------------------------------------

    /// Drive the client from the transport event stream. Runs until
    /// the transport task ends.
    pub async fn pump(&mut self, rx: &mut mpsc::Receiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_transport_event(event).await;
        }
        info!("Transport event stream ended");
    }

    /// Apply one inbound transport event.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Chat { message } => {
                let Some(room) = self.room.as_mut() else {
                    debug!(id = %message.id, "Chat without an open room, dropped");
                    return;
                };
                // Own messages come back through the relay mesh;
                // they are already in the list.
                if message.sender == self.local.id {
                    return;
                }
                if room.append_remote(message.clone()) {
                    self.emit(ClientEvent::MessageReceived { message }).await;
                }
            }

            TransportEvent::Signal { signal } => {
                if signal.sender == self.local.id {
                    return;
                }
                self.handle_signal(signal).await;
            }

            TransportEvent::PeerJoined {
                room_key,
                participant,
            } => {
                if participant.id == self.local.id {
                    return;
                }
                let Some(room) = self.room.as_mut() else {
                    return;
                };
                if room.room_key() == &room_key {
                    room.set_remote(participant.clone());
                    self.emit(ClientEvent::PeerJoined {
                        room_key,
                        participant,
                    })
                    .await;
                }
            }

            TransportEvent::Status(status) => {
                self.emit(ClientEvent::Status(status)).await;
            }
        }
    }

    async fn handle_signal(&mut self, signal: SignalMessage) {
        let has_live_call = self
            .call
            .as_ref()
            .is_some_and(|c| !c.state().is_terminal());

        if !has_live_call {
            if let SignalKind::Offer(sdp) = &signal.kind {
                self.answer_inbound_offer(signal.clone(), sdp).await;
            } else {
                debug!(room = %signal.room_key, "Signal without a live call, dropped");
            }
            return;
        }

        let Some(call) = self.call.as_mut() else {
            return;
        };
        let seen_tracks = call.remote_tracks().len();
        match call.handle_signal(&signal) {
            Ok(reply) => {
                let state = call.state();
                let room_key = call.room_key().clone();
                let new_tracks = call.remote_tracks()[seen_tracks..].to_vec();
                if let Some(reply) = reply {
                    if let Err(e) = self.transport.send_signal(room_key, reply).await {
                        warn!(error = %e, "Signal reply not delivered");
                    }
                }
                for track in new_tracks {
                    self.emit(ClientEvent::RemoteStream { track }).await;
                }
                self.emit(ClientEvent::CallStateChanged(state)).await;
            }
            Err(e) => {
                warn!(error = %e, "Call negotiation failed");
                self.emit(ClientEvent::CallFailed {
                    reason: e.to_string(),
                })
                .await;
            }
        }
    }

    /// Callee path: an offer arrived with no live call. Acquire media
    /// for the offered kind and auto-answer; a capture failure
    /// declines the call with a hangup signal.
    async fn answer_inbound_offer(&mut self, signal: SignalMessage, sdp: &str) {
        let Some(room) = self.room.as_ref() else {
            debug!(room = %signal.room_key, "Offer without an open room, dropped");
            return;
        };
        if room.room_key() != &signal.room_key {
            debug!(room = %signal.room_key, "Offer for another room, dropped");
            return;
        }

        let kind = kind_from_sdp(sdp);
        let media = match self.capture.acquire_call_media(kind) {
            Ok(media) => media,
            Err(e) => {
                let err = CallError::MediaSetup(e);
                warn!(error = %err, "Cannot accept call, declining");
                let decline = SignalMessage {
                    room_key: signal.room_key.clone(),
                    sender: self.local.id.clone(),
                    kind: SignalKind::Hangup,
                };
                if let Err(send_err) = self
                    .transport
                    .send_signal(signal.room_key.clone(), decline)
                    .await
                {
                    debug!(error = %send_err, "Decline signal not delivered");
                }
                self.emit(ClientEvent::CallFailed {
                    reason: err.to_string(),
                })
                .await;
                return;
            }
        };

        let mut call = CallSession::new(
            signal.room_key.clone(),
            self.local.id.clone(),
            signal.sender.clone(),
            kind,
            media,
            self.ice.clone(),
        );
        match call.handle_signal(&signal) {
            Ok(reply) => {
                let state = call.state();
                let room_key = call.room_key().clone();
                let tracks = call.remote_tracks().to_vec();
                self.call = Some(call);
                if let Some(reply) = reply {
                    if let Err(e) = self.transport.send_signal(room_key, reply).await {
                        warn!(error = %e, "Answer not delivered");
                    }
                }
                for track in tracks {
                    self.emit(ClientEvent::RemoteStream { track }).await;
                }
                self.emit(ClientEvent::CallStateChanged(state)).await;
            }
            Err(e) => {
                self.emit(ClientEvent::CallFailed {
                    reason: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: ClientEvent) {
        // A slow or absent UI consumer never blocks the pump forever;
        // drop the event if the channel stays full.
        if self.events.try_send(event).is_err() {
            debug!("UI event channel full, event dropped");
        }
    }
}
