use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device access denied: {0}")]
    PermissionDenied(String),

    #[error("No compatible capture device available")]
    DeviceUnavailable,

    #[error("Capture device busy with another recording or call")]
    DeviceBusy,

    #[error("Audio stream error: {0}")]
    Stream(String),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Operation not valid in current call state: {0}")]
    InvalidState(&'static str),

    #[error("Media setup failed: {0}")]
    MediaSetup(#[from] CaptureError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Attachment rejected by storage: {0}")]
    Rejected(String),

    #[error("Storage endpoint error: {0}")]
    Network(String),

    #[error("Attachment too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}
