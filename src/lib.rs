//! # discord-gateway
//!
//! The core of a gateway client for a chat-platform real-time API: a
//! persistent WebSocket session that authenticates a bot, keeps the
//! connection alive through the heartbeat protocol, tracks the event
//! sequence, resumes after transient disconnects and demultiplexes
//! inbound op codes into a typed event stream.
//!
//! ## Features
//!
//! - **Session state machine**: Hello → Identify | Resume handshake,
//!   sequence-integrity checks with forced resynchronization
//! - **Heartbeat pulsator**: single-flight guarded, with a per-beat
//!   acknowledgement watchdog
//! - **Reconnect controller**: debounced, bounded retries with backoff,
//!   coordinated with shutdown
//! - **Ordered I/O**: one receiver and one emitter per connection, each
//!   draining a single FIFO channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use discord_gateway::{Config, GatewayClient};
//!
//! #[tokio::main]
//! async fn main() -> discord_gateway::Result<()> {
//!     let client = GatewayClient::new(Config::new(token));
//!     client.register_event("MESSAGE_CREATE");
//!     client.connect().await?;
//!
//!     let events = client.events();
//!     while let Ok(event) = events.recv() {
//!         println!("{}: {} bytes", event.name, event.data.len());
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod client;
pub mod cmd;
pub mod config;
pub mod error;
pub mod event;
pub mod opcode;
pub mod packet;
pub mod transport;

mod discovery;
mod heartbeat;
mod ratelimit;
mod state;

pub use client::GatewayClient;
pub use config::Config;
pub use error::{GatewayError, Result};
pub use event::Event;
pub use packet::{ClientPacket, GatewayPacket};
pub use transport::{Transport, WsTransport};
