//! Broadcast channels
//!
//! A channel is an append-only [`MessageLog`] read by any number of
//! non-blocking [`Connection`]s, each at its own offset. The
//! [`BroadcastBuffer`] ties them together: it appends, flushes, and
//! reclaims messages once no live connection needs them.

pub mod buffer;
pub mod connection;
pub mod log;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::BroadcastBuffer;
pub use connection::{
    CloseReason, Connection, ConnectionId, ConnectionPhase, FlushOutcome, SocketWrite,
};
pub use log::{Message, MessageLog};
