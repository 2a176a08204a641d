//! WebSocket client library
//!
//! Opens a connection, sends one subscription request, captures the
//! acknowledgment and then forwards every frame to a channel.

mod client;
mod types;

pub use client::{WsClient, WsConnection};
pub use types::{WsConfig, WsError, WsMessage};
