//! Peer-connection handle driven by the call negotiation machine.
//!
//! Tracks session descriptions, local/remote tracks and reachability
//! candidates for one call. The media plane itself (ICE connectivity
//! checks, RTP) is carried by external infrastructure configured via
//! [`IceConfig`]; this handle owns the negotiation-visible state.
//!
//! Candidates that arrive before the remote description are queued and
//! flushed in arrival order once it is set.

use std::collections::VecDeque;

use tracing::debug;
use uuid::Uuid;

use entente_shared::types::CallKind;

use crate::capture::LocalTrack;
use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// An incoming media track announced by the peer layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let trimmed = self.sdp.trim();
        !trimmed.is_empty() && trimmed.starts_with("v=0")
    }

    /// Whether the description negotiates a video section.
    pub fn has_video(&self) -> bool {
        self.sdp.lines().any(|l| l.starts_with("m=video"))
    }
}

/// Call kind implied by an offer's media sections.
pub fn kind_from_sdp(sdp: &str) -> CallKind {
    if sdp.lines().any(|l| l.starts_with("m=video")) {
        CallKind::AudioVideo
    } else {
        CallKind::Audio
    }
}

/// Tracks announced by a remote description, one per media section
/// carrying an msid.
pub fn tracks_from_sdp(sdp: &str) -> Vec<RemoteTrack> {
    let mut tracks = Vec::new();
    let mut kind = None;
    for line in sdp.lines() {
        if line.starts_with("m=audio") {
            kind = Some(TrackKind::Audio);
        } else if line.starts_with("m=video") {
            kind = Some(TrackKind::Video);
        } else if let Some(id) = line.strip_prefix("a=msid:- ") {
            if let Some(kind) = kind.take() {
                tracks.push(RemoteTrack {
                    id: id.trim().to_string(),
                    kind,
                });
            }
        }
    }
    tracks
}

/// Reachability/relay infrastructure configuration (STUN/TURN-style
/// server URLs). Supplied by the embedding application; this crate
/// never talks to those servers itself.
#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub servers: Vec<String>,
}

/// Negotiation state for one call. Exclusively owned by its
/// [`crate::call::CallSession`].
pub struct PeerConnection {
    session_id: Uuid,
    ice: IceConfig,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    local_tracks: Vec<LocalTrack>,
    remote_tracks: Vec<RemoteTrack>,
    pending_candidates: VecDeque<String>,
    applied_candidates: Vec<String>,
    closed: bool,
}

impl PeerConnection {
    pub fn new(ice: IceConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            ice,
            local_description: None,
            remote_description: None,
            local_tracks: Vec::new(),
            remote_tracks: Vec::new(),
            pending_candidates: VecDeque::new(),
            applied_candidates: Vec::new(),
            closed: false,
        }
    }

    pub fn ice_servers(&self) -> &[String] {
        &self.ice.servers
    }

    pub fn add_track(&mut self, track: LocalTrack) {
        self.local_tracks.push(track);
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// Generate an offer describing the attached local tracks.
    pub fn create_offer(&self) -> SessionDescription {
        SessionDescription::offer(self.build_sdp())
    }

    /// Generate an answer. Requires a remote description.
    pub fn create_answer(&self) -> Result<SessionDescription, CallError> {
        if self.remote_description.is_none() {
            return Err(CallError::Negotiation(
                "cannot answer without a remote offer".to_string(),
            ));
        }
        Ok(SessionDescription::answer(self.build_sdp()))
    }

    pub fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), CallError> {
        if self.closed {
            return Err(CallError::InvalidState("peer connection closed"));
        }
        self.local_description = Some(desc);
        Ok(())
    }

    /// Apply the remote offer/answer and flush any queued candidates
    /// in arrival order.
    pub fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), CallError> {
        if self.closed {
            return Err(CallError::InvalidState("peer connection closed"));
        }
        if !desc.is_valid() {
            return Err(CallError::Negotiation("malformed session description".to_string()));
        }
        self.remote_description = Some(desc);

        let deferred = self.pending_candidates.len();
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.applied_candidates.push(candidate);
        }
        if deferred > 0 {
            debug!(count = deferred, "Flushed deferred reachability candidates");
        }
        Ok(())
    }

    /// Abandon the local offer (glare loser path).
    pub fn rollback_local(&mut self) {
        debug!(session = %self.session_id, "Rolling back local description");
        self.local_description = None;
    }

    /// Apply a remote reachability candidate. Candidates arriving
    /// before the remote description are deferred, never dropped.
    pub fn add_remote_candidate(&mut self, candidate: String) -> Result<(), CallError> {
        if self.closed {
            return Err(CallError::InvalidState("peer connection closed"));
        }
        if candidate.trim().is_empty() {
            return Err(CallError::Negotiation("empty reachability candidate".to_string()));
        }
        if self.remote_description.is_some() {
            self.applied_candidates.push(candidate);
        } else {
            self.pending_candidates.push_back(candidate);
        }
        Ok(())
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn applied_candidates(&self) -> &[String] {
        &self.applied_candidates
    }

    /// Record an incoming media track. May arrive before or after the
    /// negotiation handshake completes.
    pub fn on_remote_track(&mut self, track: RemoteTrack) {
        debug!(id = %track.id, kind = ?track.kind, "Remote track arrived");
        self.remote_tracks.push(track);
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    /// Close the connection and drop any undelivered candidate state.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_candidates.clear();
        debug!(session = %self.session_id, "Peer connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn build_sdp(&self) -> String {
        let mut sdp = String::new();
        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!(
            "o=- {} 0 IN IP4 0.0.0.0\r\n",
            self.session_id.simple()
        ));
        sdp.push_str("s=entente\r\n");
        sdp.push_str("t=0 0\r\n");
        for (index, track) in self.local_tracks.iter().enumerate() {
            match track.kind {
                TrackKind::Audio => sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"),
                TrackKind::Video => sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n"),
            }
            sdp.push_str(&format!("a=mid:{index}\r\n"));
            sdp.push_str(&format!("a=msid:- {}\r\n", track.id));
        }
        sdp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_deferred_until_remote_description() {
        let mut peer = PeerConnection::new(IceConfig::default());

        peer.add_remote_candidate("candidate-a".to_string()).unwrap();
        peer.add_remote_candidate("candidate-b".to_string()).unwrap();
        assert_eq!(peer.pending_candidate_count(), 2);
        assert!(peer.applied_candidates().is_empty());

        peer.set_remote_description(SessionDescription::offer("v=0\r\ns=x\r\n"))
            .unwrap();
        assert_eq!(peer.pending_candidate_count(), 0);
        assert_eq!(peer.applied_candidates(), ["candidate-a", "candidate-b"]);

        // After the remote description, candidates apply directly.
        peer.add_remote_candidate("candidate-c".to_string()).unwrap();
        assert_eq!(
            peer.applied_candidates(),
            ["candidate-a", "candidate-b", "candidate-c"]
        );
    }

    #[test]
    fn test_malformed_remote_description_rejected() {
        let mut peer = PeerConnection::new(IceConfig::default());
        assert!(peer
            .set_remote_description(SessionDescription::offer("   "))
            .is_err());
        assert!(peer
            .set_remote_description(SessionDescription::offer("not-sdp"))
            .is_err());
    }

    #[test]
    fn test_answer_requires_remote_offer() {
        let peer = PeerConnection::new(IceConfig::default());
        assert!(peer.create_answer().is_err());
    }

    #[test]
    fn test_offer_sdp_reflects_kind() {
        let mut audio_peer = PeerConnection::new(IceConfig::default());
        audio_peer.add_track(crate::capture::LocalTrack {
            id: "t1".into(),
            kind: TrackKind::Audio,
        });
        let offer = audio_peer.create_offer();
        assert!(offer.is_valid());
        assert!(!offer.has_video());
        assert_eq!(kind_from_sdp(&offer.sdp), CallKind::Audio);

        audio_peer.add_track(crate::capture::LocalTrack {
            id: "t2".into(),
            kind: TrackKind::Video,
        });
        let offer = audio_peer.create_offer();
        assert!(offer.has_video());
        assert_eq!(kind_from_sdp(&offer.sdp), CallKind::AudioVideo);
    }

    #[test]
    fn test_tracks_extracted_from_remote_description() {
        let mut peer = PeerConnection::new(IceConfig::default());
        peer.add_track(crate::capture::LocalTrack {
            id: "mic".into(),
            kind: TrackKind::Audio,
        });
        peer.add_track(crate::capture::LocalTrack {
            id: "cam".into(),
            kind: TrackKind::Video,
        });

        let tracks = tracks_from_sdp(&peer.create_offer().sdp);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0], RemoteTrack { id: "mic".into(), kind: TrackKind::Audio });
        assert_eq!(tracks[1], RemoteTrack { id: "cam".into(), kind: TrackKind::Video });
    }

    #[test]
    fn test_close_idempotent() {
        let mut peer = PeerConnection::new(IceConfig::default());
        peer.add_remote_candidate("x".to_string()).unwrap();
        peer.close();
        peer.close();
        assert!(peer.is_closed());
        assert_eq!(peer.pending_candidate_count(), 0);
        assert!(peer.add_remote_candidate("y".to_string()).is_err());
    }
}
