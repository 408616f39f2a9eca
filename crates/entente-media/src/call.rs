//! Call negotiation state machine.
//!
//! One [`CallSession`] per negotiation attempt. The session owns the
//! device media acquired for the call and the [`PeerConnection`]
//! handle, and consumes signaling messages one at a time; the client
//! event pump drives it from a single task, so inbound signals are
//! applied in order without interior locking.

use tracing::{debug, info, warn};

use entente_shared::protocol::{SignalKind, SignalMessage};
use entente_shared::types::{CallKind, ParticipantId, RoomKey};

use crate::capture::MediaStream;
use crate::error::CallError;
use crate::peer::{tracks_from_sdp, IceConfig, PeerConnection, RemoteTrack, SessionDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Local offer created but not yet handed to the transport.
    LocalOffering,
    AwaitingAnswer,
    RemoteOfferReceived,
    /// Inbound offer accepted, answer being produced.
    Answering,
    Connected,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }
}

/// A single audio or audio+video call with one remote participant.
pub struct CallSession {
    room_key: RoomKey,
    local: ParticipantId,
    remote: ParticipantId,
    kind: CallKind,
    state: CallState,
    peer: PeerConnection,
    media: Option<MediaStream>,
}

impl CallSession {
    /// Device media must be acquired before a session exists; capture
    /// failure is a call-setup failure, not a session state.
    pub fn new(
        room_key: RoomKey,
        local: ParticipantId,
        remote: ParticipantId,
        kind: CallKind,
        media: MediaStream,
        ice: IceConfig,
    ) -> Self {
        Self {
            room_key,
            local,
            remote,
            kind,
            state: CallState::Idle,
            peer: PeerConnection::new(ice),
            media: Some(media),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        self.peer.remote_tracks()
    }

    /// Start the outbound leg: attach local tracks, produce the offer.
    /// The returned signal must reach the remote side for the call to
    /// progress; the session rests at `AwaitingAnswer`.
    pub fn initiate(&mut self) -> Result<SignalMessage, CallError> {
        if self.state != CallState::Idle {
            return Err(CallError::InvalidState("call already started"));
        }
        self.state = CallState::LocalOffering;

        self.attach_local_tracks();
        let offer = self.peer.create_offer();
        self.peer.set_local_description(offer.clone())?;
        self.state = CallState::AwaitingAnswer;

        info!(room = %self.room_key, remote = %self.remote.short(), kind = ?self.kind, "Call offered");
        Ok(self.signal(SignalKind::Offer(offer.sdp)))
    }

    /// Apply one inbound signal. Returns a signal to send back when the
    /// transition produces one (an answer, or nothing).
    pub fn handle_signal(
        &mut self,
        signal: &SignalMessage,
    ) -> Result<Option<SignalMessage>, CallError> {
        if self.state.is_terminal() {
            debug!(room = %self.room_key, "Signal after call end, ignored");
            return Ok(None);
        }
        if signal.room_key != self.room_key {
            return Err(self.fail("signal for a different room"));
        }

        match &signal.kind {
            SignalKind::Offer(sdp) => self.on_remote_offer(sdp),
            SignalKind::Answer(sdp) => self.on_remote_answer(sdp),
            SignalKind::Candidate(candidate) => {
                if let Err(e) = self.peer.add_remote_candidate(candidate.clone()) {
                    warn!(room = %self.room_key, error = %e, "Bad reachability candidate");
                    return Err(self.fail("malformed reachability candidate"));
                }
                Ok(None)
            }
            SignalKind::Hangup => {
                info!(room = %self.room_key, remote = %self.remote.short(), "Remote hung up");
                self.release();
                self.state = CallState::Ended;
                Ok(None)
            }
        }
    }

    fn on_remote_offer(&mut self, sdp: &str) -> Result<Option<SignalMessage>, CallError> {
        match self.state {
            CallState::Idle => {
                self.state = CallState::RemoteOfferReceived;
                self.answer_offer(sdp)
            }
            CallState::AwaitingAnswer => {
                // Both sides offered at once. The lexicographically
                // smaller participant id stays the offerer; the other
                // side abandons its offer and answers instead.
                if self.local < self.remote {
                    debug!(room = %self.room_key, "Simultaneous offers, keeping ours");
                    Ok(None)
                } else {
                    debug!(room = %self.room_key, "Simultaneous offers, answering theirs");
                    self.peer.rollback_local();
                    self.state = CallState::RemoteOfferReceived;
                    self.answer_offer(sdp)
                }
            }
            _ => Err(self.fail("unexpected offer")),
        }
    }

    fn answer_offer(&mut self, sdp: &str) -> Result<Option<SignalMessage>, CallError> {
        if let Err(e) = self
            .peer
            .set_remote_description(SessionDescription::offer(sdp))
        {
            warn!(room = %self.room_key, error = %e, "Rejecting inbound offer");
            return Err(self.fail("malformed offer"));
        }
        self.state = CallState::Answering;
        for track in tracks_from_sdp(sdp) {
            self.on_remote_track(track);
        }

        self.attach_local_tracks();
        let answer = self.peer.create_answer()?;
        self.peer.set_local_description(answer.clone())?;
        self.state = CallState::Connected;

        info!(room = %self.room_key, remote = %self.remote.short(), "Call answered");
        Ok(Some(self.signal(SignalKind::Answer(answer.sdp))))
    }

    fn on_remote_answer(&mut self, sdp: &str) -> Result<Option<SignalMessage>, CallError> {
        if self.state != CallState::AwaitingAnswer {
            return Err(self.fail("unexpected answer"));
        }
        if let Err(e) = self
            .peer
            .set_remote_description(SessionDescription::answer(sdp))
        {
            warn!(room = %self.room_key, error = %e, "Rejecting inbound answer");
            return Err(self.fail("malformed answer"));
        }
        for track in tracks_from_sdp(sdp) {
            self.on_remote_track(track);
        }
        self.state = CallState::Connected;
        info!(room = %self.room_key, remote = %self.remote.short(), "Call connected");
        Ok(None)
    }

    /// Terminate locally. Returns the `Hangup` signal to send the first
    /// time; any later call is a no-op returning `None`.
    pub fn hangup(&mut self) -> Option<SignalMessage> {
        if self.state.is_terminal() {
            return None;
        }
        info!(room = %self.room_key, remote = %self.remote.short(), "Hanging up");
        self.release();
        self.state = CallState::Ended;
        Some(self.signal(SignalKind::Hangup))
    }

    /// Remote media announced by the peer layer. May arrive before or
    /// after `Connected`; never drives a state transition.
    pub fn on_remote_track(&mut self, track: RemoteTrack) {
        self.peer.on_remote_track(track);
    }

    fn attach_local_tracks(&mut self) {
        if let Some(media) = &self.media {
            for track in media.tracks() {
                self.peer.add_track(track.clone());
            }
        }
    }

    fn fail(&mut self, reason: &'static str) -> CallError {
        warn!(room = %self.room_key, reason, "Call failed");
        self.release();
        self.state = CallState::Failed;
        CallError::Negotiation(reason.to_string())
    }

    fn release(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.stop();
        }
        self.peer.close();
    }

    fn signal(&self, kind: SignalKind) -> SignalMessage {
        SignalMessage {
            room_key: self.room_key.clone(),
            sender: self.local.clone(),
            kind,
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureManager, StubBackend};
    use crate::peer::TrackKind;
    use std::sync::Arc;

    fn manager() -> CaptureManager {
        CaptureManager::new(Arc::new(StubBackend::working()))
    }

    fn session(local: &str, remote: &str, kind: CallKind) -> CallSession {
        let media = manager().acquire_call_media(kind).unwrap();
        CallSession::new(
            RoomKey::between(&ParticipantId::new(local), &ParticipantId::new(remote)),
            ParticipantId::new(local),
            ParticipantId::new(remote),
            kind,
            media,
            IceConfig::default(),
        )
    }

    fn offer_of(sig: &SignalMessage) -> String {
        match &sig.kind {
            SignalKind::Offer(sdp) => sdp.clone(),
            other => panic!("expected offer, got {other:?}"),
        }
    }

    fn answer_of(sig: &SignalMessage) -> String {
        match &sig.kind {
            SignalKind::Answer(sdp) => sdp.clone(),
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[test]
    fn test_caller_callee_handshake() {
        let mut alice = session("alice", "bob", CallKind::Audio);
        let mut bob = session("bob", "alice", CallKind::Audio);

        let offer = alice.initiate().unwrap();
        assert_eq!(alice.state(), CallState::AwaitingAnswer);

        let answer = bob.handle_signal(&offer).unwrap().unwrap();
        assert_eq!(bob.state(), CallState::Connected);
        assert!(matches!(answer.kind, SignalKind::Answer(_)));

        assert!(alice.handle_signal(&answer).unwrap().is_none());
        assert_eq!(alice.state(), CallState::Connected);
    }

    #[test]
    fn test_glare_both_sides_agree_on_offerer() {
        let mut alice = session("alice", "bob", CallKind::Audio);
        let mut bob = session("bob", "alice", CallKind::Audio);

        let alice_offer = alice.initiate().unwrap();
        let bob_offer = bob.initiate().unwrap();

        // "alice" < "bob": alice keeps her offer, bob answers it.
        assert!(alice.handle_signal(&bob_offer).unwrap().is_none());
        assert_eq!(alice.state(), CallState::AwaitingAnswer);

        let answer = bob.handle_signal(&alice_offer).unwrap().unwrap();
        assert_eq!(bob.state(), CallState::Connected);
        assert!(answer_of(&answer).starts_with("v=0"));

        assert!(alice.handle_signal(&answer).unwrap().is_none());
        assert_eq!(alice.state(), CallState::Connected);
    }

    #[test]
    fn test_candidates_before_offer_are_deferred_then_flushed() {
        let mut bob = session("bob", "alice", CallKind::Audio);
        let mut alice = session("alice", "bob", CallKind::Audio);
        let offer = alice.initiate().unwrap();

        let candidate = SignalMessage {
            room_key: offer.room_key.clone(),
            sender: offer.sender.clone(),
            kind: SignalKind::Candidate("cand-1".to_string()),
        };
        assert!(bob.handle_signal(&candidate).unwrap().is_none());
        assert_eq!(bob.state(), CallState::Idle);

        bob.handle_signal(&offer).unwrap();
        assert_eq!(bob.state(), CallState::Connected);
    }

    #[test]
    fn test_handshake_exposes_remote_tracks_on_both_sides() {
        let mut alice = session("alice", "bob", CallKind::Audio);
        let mut bob = session("bob", "alice", CallKind::Audio);

        let offer = alice.initiate().unwrap();
        let answer = bob.handle_signal(&offer).unwrap().unwrap();

        // Callee records the caller's track while answering.
        assert_eq!(bob.remote_tracks().len(), 1);
        assert_eq!(bob.remote_tracks()[0].kind, TrackKind::Audio);

        alice.handle_signal(&answer).unwrap();
        assert_eq!(alice.remote_tracks().len(), 1);

        // A late track (renegotiated by the media plane) still lands
        // after `Connected` and drives no transition.
        alice.on_remote_track(RemoteTrack {
            id: "late".into(),
            kind: TrackKind::Audio,
        });
        assert_eq!(alice.remote_tracks().len(), 2);
        assert_eq!(alice.state(), CallState::Connected);
    }

    #[test]
    fn test_hangup_is_idempotent() {
        let mut alice = session("alice", "bob", CallKind::Audio);
        alice.initiate().unwrap();

        let first = alice.hangup();
        assert!(matches!(first, Some(SignalMessage { kind: SignalKind::Hangup, .. })));
        assert_eq!(alice.state(), CallState::Ended);

        assert!(alice.hangup().is_none());
        assert_eq!(alice.state(), CallState::Ended);
    }

    #[test]
    fn test_remote_hangup_ends_and_releases_device() {
        let mgr = manager();
        let media = mgr.acquire_call_media(CallKind::Audio).unwrap();
        let local = ParticipantId::new("alice");
        let remote = ParticipantId::new("bob");
        let room = RoomKey::between(&local, &remote);
        let mut call = CallSession::new(
            room.clone(),
            local,
            remote.clone(),
            CallKind::Audio,
            media,
            IceConfig::default(),
        );
        call.initiate().unwrap();
        assert!(!mgr.is_idle());

        let hangup = SignalMessage {
            room_key: room,
            sender: remote,
            kind: SignalKind::Hangup,
        };
        assert!(call.handle_signal(&hangup).unwrap().is_none());
        assert_eq!(call.state(), CallState::Ended);
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_malformed_offer_fails_session() {
        let mut bob = session("bob", "alice", CallKind::Audio);
        let bad = SignalMessage {
            room_key: RoomKey::between(
                &ParticipantId::new("alice"),
                &ParticipantId::new("bob"),
            ),
            sender: ParticipantId::new("alice"),
            kind: SignalKind::Offer("   ".to_string()),
        };
        assert!(bob.handle_signal(&bad).is_err());
        assert_eq!(bob.state(), CallState::Failed);

        // Terminal sessions swallow further signals.
        assert!(bob.handle_signal(&bad).unwrap().is_none());
    }

    #[test]
    fn test_signal_for_wrong_room_fails_session() {
        let mut alice = session("alice", "bob", CallKind::Audio);
        alice.initiate().unwrap();

        let stray = SignalMessage {
            room_key: RoomKey::between(
                &ParticipantId::new("carol"),
                &ParticipantId::new("dave"),
            ),
            sender: ParticipantId::new("bob"),
            kind: SignalKind::Hangup,
        };
        assert!(alice.handle_signal(&stray).is_err());
        assert_eq!(alice.state(), CallState::Failed);
    }

    #[test]
    fn test_video_call_offers_video_section() {
        let mut alice = session("alice", "bob", CallKind::AudioVideo);
        let offer = alice.initiate().unwrap();
        assert!(offer_of(&offer).lines().any(|l| l.starts_with("m=video")));
    }
}
