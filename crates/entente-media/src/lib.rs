// Media side of the communication core: device capture (microphone
// recording, call media), the call negotiation state machine, and the
// attachment/upload adapter.

pub mod attach;
pub mod call;
pub mod capture;
pub mod error;
pub mod peer;

pub use attach::{store_or_degrade, AttachmentStore, HttpAttachmentStore, MemoryAttachmentStore};
pub use call::{CallSession, CallState};
pub use capture::{
    AudioBackend, AudioClip, AudioConfig, CaptureManager, CpalBackend, LocalTrack, MediaStream,
    Recorder, StubBackend,
};
pub use error::{CallError, CaptureError, StorageError};
pub use peer::{
    kind_from_sdp, tracks_from_sdp, IceConfig, PeerConnection, RemoteTrack, SdpKind,
    SessionDescription, TrackKind,
};
