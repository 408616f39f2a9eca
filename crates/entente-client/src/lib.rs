// Client orchestration: owns the transport handle, the active room
// and call, device capture and attachment storage, and turns transport
// traffic into UI-facing events.

pub mod config;
pub mod error;
pub mod events;
pub mod room;
pub mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use events::ClientEvent;
pub use room::{MessageDraft, MessageEntry, RoomSession};
pub use session::ChatClient;
