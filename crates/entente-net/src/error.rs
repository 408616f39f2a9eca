use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Relay endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Message not delivered: {0}")]
    NotDelivered(String),

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Transport task closed")]
    ChannelClosed,

    #[error("Wire codec error: {0}")]
    Codec(String),
}
