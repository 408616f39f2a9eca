use thiserror::Error;

use entente_media::{CallError, CaptureError};
use entente_net::TransportError;

/// Top-level client error. Every variant is contained to the failing
/// operation; none of them tears down the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("No room is open")]
    NoRoom,

    #[error("A call is already in progress")]
    CallInProgress,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
