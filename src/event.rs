//! Readiness notification seam
//!
//! Channels never wait on sockets themselves. When a write would block they
//! ask the event source to report the connection once it becomes writable;
//! the loop that owns the registry then calls
//! [`ChannelRegistry::on_writable`](crate::registry::ChannelRegistry::on_writable).
//!
//! ```text
//!   flush ── WouldBlock ──► want_writable(id)
//!                                  │
//!                       (socket drains, edge fires)
//!                                  │
//!   on_writable(id) ◄── loop ◄─────┘
//! ```
//!
//! Each `want_writable` call produces at most one notification, so a
//! connection that is caught up costs nothing.

use crate::channel::ConnectionId;

/// Source of per-connection writability notifications
pub trait EventSource<W> {
    /// Start tracking a newly accepted connection
    fn register(&mut self, id: ConnectionId, writer: &W);

    /// Report `id` once its socket can accept more bytes
    fn want_writable(&mut self, id: ConnectionId);

    /// Stop tracking `id`
    fn unregister(&mut self, id: ConnectionId);
}

/// Event source that never reports anything
///
/// Useful when the caller drives flushing itself, for example by polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl<W> EventSource<W> for NoEvents {
    fn register(&mut self, _id: ConnectionId, _writer: &W) {}

    fn want_writable(&mut self, _id: ConnectionId) {}

    fn unregister(&mut self, _id: ConnectionId) {}
}
