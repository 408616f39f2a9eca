//! Local device capture: microphone recording into attachable audio
//! clips and media acquisition for calls.
//!
//! The microphone/camera is a scarce resource: at most one capture
//! operation (recording or call) holds it at a time, and a second
//! attempt fails fast with [`CaptureError::DeviceBusy`] instead of
//! preempting the first. Every acquired handle releases the device on
//! `stop`/`finish` and on `Drop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use entente_shared::constants::{AUDIO_CHANNELS, AUDIO_FRAME_MS, AUDIO_SAMPLE_RATE};
use entente_shared::types::CallKind;

use crate::error::CaptureError;
use crate::peer::TrackKind;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            channels: AUDIO_CHANNELS,
            frame_size_ms: AUDIO_FRAME_MS,
        }
    }
}

impl AudioConfig {
    pub fn frame_size_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_size_ms as usize) / 1000
    }
}

/// Buffer that captured f32 frames are appended to.
pub type FrameSink = Arc<Mutex<Vec<f32>>>;

/// Handle to a running input stream. Stopping flips the shared active
/// flag; the device callback becomes a no-op and the OS stream winds
/// down.
pub struct InputStream {
    active: Arc<AtomicBool>,
}

impl InputStream {
    pub fn new(active: Arc<AtomicBool>) -> Self {
        Self { active }
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// Audio device access, behind a trait so capture logic is testable
/// without hardware.
pub trait AudioBackend: Send + Sync {
    /// Open the default input device and stream f32 samples into
    /// `sink` until the returned handle is stopped.
    fn open_input(&self, config: &AudioConfig, sink: FrameSink) -> Result<InputStream, CaptureError>;
}

// ---------------------------------------------------------------------------
// cpal backend
// ---------------------------------------------------------------------------

/// Production backend over the host's default input device.
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        config: &AudioConfig,
        sink: FrameSink,
    ) -> Result<InputStream, CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::DeviceUnavailable)?;

        info!(device = ?device.name(), "Using input device");

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let active = Arc::new(AtomicBool::new(true));
        let active_cb = active.clone();

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !active_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Ok(mut buffer) = sink.lock() {
                        buffer.extend_from_slice(data);
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
                cpal::BuildStreamError::BackendSpecific { err } => {
                    CaptureError::PermissionDenied(err.to_string())
                }
                other => CaptureError::Stream(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        // Keep stream alive (cleaned up via active flag — callback becomes no-op)
        std::mem::forget(stream);

        debug!("Audio capture started");
        Ok(InputStream::new(active))
    }
}

// ---------------------------------------------------------------------------
// Stub backend (tests, headless environments)
// ---------------------------------------------------------------------------

enum StubMode {
    Working,
    NoDevice,
    Denied,
}

/// In-memory backend for tests and headless runs. The working variant
/// keeps every opened sink so samples can be injected from outside.
pub struct StubBackend {
    mode: StubMode,
    sinks: Mutex<Vec<FrameSink>>,
}

impl StubBackend {
    pub fn working() -> Self {
        Self {
            mode: StubMode::Working,
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn no_device() -> Self {
        Self {
            mode: StubMode::NoDevice,
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            mode: StubMode::Denied,
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Sink of the most recently opened stream.
    pub fn last_sink(&self) -> Option<FrameSink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl AudioBackend for StubBackend {
    fn open_input(
        &self,
        _config: &AudioConfig,
        sink: FrameSink,
    ) -> Result<InputStream, CaptureError> {
        match self.mode {
            StubMode::Working => {
                self.sinks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(sink);
                Ok(InputStream::new(Arc::new(AtomicBool::new(true))))
            }
            StubMode::NoDevice => Err(CaptureError::DeviceUnavailable),
            StubMode::Denied => Err(CaptureError::PermissionDenied(
                "microphone access refused".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceUsage {
    Idle,
    Recording,
    InCall,
}

type UsageSlot = Arc<Mutex<DeviceUsage>>;

fn lock_usage(slot: &UsageSlot) -> std::sync::MutexGuard<'_, DeviceUsage> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release_slot(slot: &UsageSlot) {
    *lock_usage(slot) = DeviceUsage::Idle;
}

/// Produces attachable content and call media from local devices.
pub struct CaptureManager {
    backend: Arc<dyn AudioBackend>,
    config: AudioConfig,
    usage: UsageSlot,
}

impl CaptureManager {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self::with_config(backend, AudioConfig::default())
    }

    pub fn with_config(backend: Arc<dyn AudioBackend>, config: AudioConfig) -> Self {
        Self {
            backend,
            config,
            usage: Arc::new(Mutex::new(DeviceUsage::Idle)),
        }
    }

    pub fn is_idle(&self) -> bool {
        *lock_usage(&self.usage) == DeviceUsage::Idle
    }

    fn claim(&self, want: DeviceUsage) -> Result<(), CaptureError> {
        let mut guard = lock_usage(&self.usage);
        if *guard != DeviceUsage::Idle {
            return Err(CaptureError::DeviceBusy);
        }
        *guard = want;
        Ok(())
    }

    /// Begin buffering microphone audio. Exclusive: fails fast if a
    /// recording or call capture already holds the device.
    pub fn start_recording(&self) -> Result<Recorder, CaptureError> {
        self.claim(DeviceUsage::Recording)?;

        let sink: FrameSink = Arc::new(Mutex::new(Vec::new()));
        match self.backend.open_input(&self.config, sink.clone()) {
            Ok(stream) => {
                debug!("Recording started");
                Ok(Recorder {
                    sink,
                    stream: Some(stream),
                    usage: self.usage.clone(),
                    config: self.config.clone(),
                    finished: false,
                })
            }
            Err(e) => {
                // Device never opened: free the slot so nothing leaks.
                release_slot(&self.usage);
                Err(e)
            }
        }
    }

    /// Acquire microphone (and a camera track for video calls) for the
    /// duration of a call. The call machine surfaces failure as call
    /// setup failure; there is no automatic retry.
    pub fn acquire_call_media(&self, kind: CallKind) -> Result<MediaStream, CaptureError> {
        self.claim(DeviceUsage::InCall)?;

        let sink: FrameSink = Arc::new(Mutex::new(Vec::new()));
        match self.backend.open_input(&self.config, sink) {
            Ok(stream) => {
                let mut tracks = vec![LocalTrack::new(TrackKind::Audio)];
                if kind.has_video() {
                    tracks.push(LocalTrack::new(TrackKind::Video));
                }
                info!(?kind, tracks = tracks.len(), "Call media acquired");
                Ok(MediaStream {
                    kind,
                    tracks,
                    stream: Some(stream),
                    usage: self.usage.clone(),
                    stopped: false,
                })
            }
            Err(e) => {
                release_slot(&self.usage);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// An in-progress microphone recording.
pub struct Recorder {
    sink: FrameSink,
    stream: Option<InputStream>,
    usage: UsageSlot,
    config: AudioConfig,
    finished: bool,
}

impl Recorder {
    /// Finalize the buffered frames into a single WAV clip and release
    /// the microphone. Finishing twice is a no-op returning `None`.
    pub fn finish(&mut self) -> Option<AudioClip> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        release_slot(&self.usage);

        let samples = std::mem::take(
            &mut *self.sink.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let duration_ms = (samples.len() as u64 * 1000)
            / (self.config.sample_rate as u64 * self.config.channels as u64);

        debug!(samples = samples.len(), duration_ms, "Recording finished");

        Some(AudioClip {
            data: encode_wav(&samples, self.config.sample_rate, self.config.channels),
            duration_ms,
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Recorder dropped without finish, releasing microphone");
            if let Some(stream) = self.stream.take() {
                stream.stop();
            }
            release_slot(&self.usage);
        }
    }
}

/// A finalized audio clip ready for attachment storage.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// 16-bit PCM WAV bytes.
    pub data: Vec<u8>,
    pub duration_ms: u64,
}

impl AudioClip {
    pub fn suggested_filename(&self) -> String {
        format!("clip-{}.wav", chrono::Utc::now().timestamp())
    }
}

// ---------------------------------------------------------------------------
// Call media stream
// ---------------------------------------------------------------------------

/// A local track attached to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl LocalTrack {
    fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
        }
    }
}

/// Device media held for the duration of one call.
pub struct MediaStream {
    kind: CallKind,
    tracks: Vec<LocalTrack>,
    stream: Option<InputStream>,
    usage: UsageSlot,
    stopped: bool,
}

impl MediaStream {
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Stop all device tracks and release the capture slot. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        release_slot(&self.usage);
        debug!("Call media released");
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// WAV framing
// ---------------------------------------------------------------------------

/// Encode f32 samples as a 16-bit PCM WAV file.
fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<StubBackend>, CaptureManager) {
        let backend = Arc::new(StubBackend::working());
        let manager = CaptureManager::new(backend.clone());
        (backend, manager)
    }

    #[test]
    fn test_second_recording_fails_without_killing_first() {
        let (backend, manager) = manager();

        let mut first = manager.start_recording().unwrap();
        assert!(matches!(
            manager.start_recording(),
            Err(CaptureError::DeviceBusy)
        ));

        // First recording still works end to end.
        backend
            .last_sink()
            .unwrap()
            .lock()
            .unwrap()
            .extend_from_slice(&[0.1, -0.1, 0.5]);
        let clip = first.finish().unwrap();
        assert_eq!(clip.data.len(), 44 + 3 * 2);
    }

    #[test]
    fn test_call_media_excluded_while_recording() {
        let (_backend, manager) = manager();

        let mut rec = manager.start_recording().unwrap();
        assert!(matches!(
            manager.acquire_call_media(CallKind::Audio),
            Err(CaptureError::DeviceBusy)
        ));

        rec.finish();
        assert!(manager.acquire_call_media(CallKind::Audio).is_ok());
    }

    #[test]
    fn test_finish_twice_is_noop() {
        let (_backend, manager) = manager();

        let mut rec = manager.start_recording().unwrap();
        assert!(rec.finish().is_some());
        assert!(rec.finish().is_none());
        assert!(manager.is_idle());
    }

    #[test]
    fn test_permission_denied_leaks_no_device_slot() {
        let manager = CaptureManager::new(Arc::new(StubBackend::permission_denied()));

        assert!(matches!(
            manager.start_recording(),
            Err(CaptureError::PermissionDenied(_))
        ));
        assert!(manager.is_idle());
    }

    #[test]
    fn test_no_device() {
        let manager = CaptureManager::new(Arc::new(StubBackend::no_device()));

        assert!(matches!(
            manager.acquire_call_media(CallKind::Audio),
            Err(CaptureError::DeviceUnavailable)
        ));
        assert!(manager.is_idle());
    }

    #[test]
    fn test_drop_releases_slot() {
        let (_backend, manager) = manager();
        {
            let _rec = manager.start_recording().unwrap();
            assert!(!manager.is_idle());
        }
        assert!(manager.is_idle());
    }

    #[test]
    fn test_call_media_tracks_match_kind() {
        let (_backend, manager) = manager();

        let mut audio = manager.acquire_call_media(CallKind::Audio).unwrap();
        assert_eq!(audio.tracks().len(), 1);
        audio.stop();

        let mut video = manager.acquire_call_media(CallKind::AudioVideo).unwrap();
        assert_eq!(video.tracks().len(), 2);
        assert!(video.tracks().iter().any(|t| t.kind == TrackKind::Video));
        video.stop();
        // stop twice is fine
        video.stop();
        assert!(manager.is_idle());
    }

    #[test]
    fn test_wav_header() {
        let wav = encode_wav(&[0.0, 1.0, -1.0], 48_000, 1);
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 6);
        // sample rate little-endian at offset 24
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 48_000);
    }
}
