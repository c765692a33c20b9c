//! Broadcast process chatter to socket readers
//!
//! `chatter-rs` exposes a process's diagnostic text ("chatter") on TCP or
//! Unix-domain sockets. Every message emitted on a channel is sent to every
//! reader currently connected to it, and a slow reader never holds up the
//! producer or the other readers.
//!
//! # Architecture
//!
//! ```text
//!   ChatterHandle / ChatterLayer
//!              │  LoopEvent::Chatter
//!              ▼
//!   ┌──────────────────── server loop (one task) ────────────────────┐
//!   │ ChannelRegistry                                                │
//!   │   "default" ─► BroadcastBuffer { MessageLog, connections }     │
//!   │   "debug"   ─► BroadcastBuffer { MessageLog, connections }     │
//!   └───────▲──────────────────────────────▲─────────────────────────┘
//!           │ LoopEvent::Accepted          │ LoopEvent::Writable
//!     accept tasks                  TokioEvents watchers
//! ```
//!
//! Each connection is tracked at its own offset into the channel's byte
//! stream. Writes are non-blocking; a connection whose socket is full keeps
//! its offset and resumes when the socket drains. Messages are reclaimed once
//! every live connection has received them.
//!
//! # Example
//!
//! ```no_run
//! use chatter_rs::{ChatterServer, ListenerConfig, ServerConfig};
//!
//! # async fn run() -> chatter_rs::Result<()> {
//! let config = ServerConfig::with_listener(ListenerConfig::tcp(7777));
//! let server = ChatterServer::bind(config).await?;
//!
//! let chatter = server.handle();
//! chatter.chatter("router started");
//!
//! server.run().await
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod event;
pub mod handle;
pub mod protocol;
pub mod registry;
pub mod seq;
pub mod server;
pub mod stats;

pub use channel::{BroadcastBuffer, Connection, ConnectionId, MessageLog, SocketWrite};
pub use error::{Error, Result};
pub use event::{EventSource, NoEvents};
pub use handle::{ChatterHandle, ChatterLayer};
pub use registry::{ChannelPolicy, ChannelRegistry, ChatterSink, RegistryConfig};
pub use seq::StreamOffset;
pub use server::{ChatterServer, ListenerConfig, ServerConfig, Transport};
