// xfinity-api: Message vocabularies and WebSocket session for Xfinity set-top boxes

pub mod action;
pub mod control;
pub mod error;
pub mod event;
pub mod registry;
pub mod transport;
pub mod websocket;

pub use action::Action;
pub use control::{Control, ControlCommand, ControlContext, ValidationError};
pub use error::{DecodeError, Error};
pub use event::DeviceEvent;
pub use registry::Vocabulary;
pub use transport::{ConnectionConfig, TlsMode};
pub use websocket::{BoxConnection, LinkEvent, Phase};
