//! HTTP handlers for the read and live-update side.

pub mod health;
pub mod status;
pub mod websocket;

pub use health::health_check;
pub use status::{UserStatus, user_status};
