// xfinity-core: Device state, control handling, and orchestration between the box and the bus.

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::SessionToken;
pub use bus::BusMessage;
pub use config::{GatewayConfig, Topics};
pub use error::CoreError;
pub use gateway::{DeviceLink, Gateway, InboundMessage};
pub use store::{DeviceState, LastError, StateStore};
