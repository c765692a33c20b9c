//! Channel registry for chatter routing
//!
//! The registry maps channel names to broadcast buffers and routes both
//! chatter text and socket events to them. It is owned by the event loop and
//! handed to nothing else; producers reach it through a
//! [`ChatterHandle`](crate::handle::ChatterHandle).
//!
//! # Architecture
//!
//! ```text
//!                       ChannelRegistry
//!               ┌─────────────────────────────┐
//!               │ channels: HashMap<Name,     │
//!               │   Channel {                 │
//!               │     buffer: log + conns,    │
//!               │     base: ChatterSink,      │
//!               │     subscribers,            │
//!               │   }                         │
//!               │ >                           │
//!               └──────────────┬──────────────┘
//!                              │
//!      chatter("default", ..)  │   on_writable(id)
//!               │              │         │
//!               ▼              ▼         ▼
//!         base sink       append ──► flush ──► try_write ──► socket
//! ```
//!
//! # Channel lifetime
//!
//! A channel is created by its first subscriber (a listening endpoint) and
//! destroyed when the last one leaves. While the `default` channel exists the
//! registry's default sink is a [`ChannelSink`] feeding that channel, and the
//! channel passes its text on to the sink it displaced. Teardown puts the
//! displaced sink back.

pub mod config;
pub mod entry;
pub mod error;
pub mod sink;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Channel, ChannelInfo, ChannelPolicy, SubscriberId};
pub use error::RegistryError;
pub use sink::{ChannelSink, ChatterSink, MemorySink, SilentSink, StderrSink, TracingSink};
pub use store::ChannelRegistry;
