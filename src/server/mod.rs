//! Chatter socket server
//!
//! Socket setup plus the single event loop that owns the
//! [`ChannelRegistry`](crate::registry::ChannelRegistry).

pub mod config;
pub mod events;
pub mod listener;
pub mod socket;

pub use config::{ListenerConfig, ServerConfig, Transport};
pub use events::{LoopEvent, TokioEvents};
pub use listener::{ChatterServer, ServerRegistry};
pub use socket::{ChatterStream, Listener};
