//! Per-connection delivery state
//!
//! A connection tracks how far into the channel's stream its reader has
//! got. Flushing writes from that offset onwards, message by message, until
//! the socket stops accepting bytes or the reader is caught up.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::seq::StreamOffset;
use crate::stats::ConnectionStats;

use super::log::MessageLog;

/// Identifier of an accepted connection, unique within a registry
pub type ConnectionId = u64;

/// Non-blocking write half of a chatter socket
///
/// `try_write` must never block: when the socket cannot take more bytes it
/// returns `ErrorKind::WouldBlock`.
pub trait SocketWrite {
    /// Write as many bytes of `buf` as the socket accepts right now
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl<W: SocketWrite + ?Sized> SocketWrite for Arc<W> {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).try_write(buf)
    }
}

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Socket accepted, nothing written yet
    Accepted,
    /// Greeting banner attempted
    Greeted,
    /// Receiving chatter
    Streaming,
    /// Torn down
    Closed,
}

/// Why a connection was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer went away (broken pipe, reset)
    PeerClosed,
    /// Fell further behind than the channel's backlog limit
    Lagging,
    /// Channel or server shutting down
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Lagging => write!(f, "backlog exceeded"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Result of a flush attempt
#[derive(Debug)]
pub enum FlushOutcome {
    /// Everything in the log has been written
    Drained,
    /// The socket is full; `needed` is the first message not fully written
    Blocked { needed: usize },
    /// A transient error stopped the pass; retry on the next writable event
    Stalled { needed: usize, error: io::Error },
    /// The peer is gone
    Broken(io::Error),
    /// The connection was already closed
    Closed,
}

impl FlushOutcome {
    /// Index of the earliest message this connection still needs
    ///
    /// `None` means the connection no longer holds anything back.
    pub fn needed(&self, log_len: usize) -> Option<usize> {
        match self {
            FlushOutcome::Drained => Some(log_len),
            FlushOutcome::Blocked { needed } | FlushOutcome::Stalled { needed, .. } => {
                Some(*needed)
            }
            FlushOutcome::Broken(_) | FlushOutcome::Closed => None,
        }
    }

    /// Whether the connection must wait for writability before progressing
    pub fn wants_writable(&self) -> bool {
        matches!(
            self,
            FlushOutcome::Blocked { .. } | FlushOutcome::Stalled { .. }
        )
    }
}

/// Errors after which the peer can no longer receive anything
fn is_fatal(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

/// A reader attached to a channel
#[derive(Debug)]
pub struct Connection<W> {
    /// Connection ID
    pub id: ConnectionId,

    /// Write half; dropped on close
    writer: Option<W>,

    /// Current phase
    phase: ConnectionPhase,

    /// Next byte this reader has not received
    delivery_offset: StreamOffset,

    /// Write interest is armed with the event source
    pub(crate) awaiting_writable: bool,

    /// Delivery statistics
    pub stats: ConnectionStats,

    /// When the connection was accepted
    pub accepted_at: Instant,
}

impl<W: SocketWrite> Connection<W> {
    /// Create a connection positioned at `offset`
    pub fn new(id: ConnectionId, writer: W, offset: StreamOffset) -> Self {
        Self {
            id,
            writer: Some(writer),
            phase: ConnectionPhase::Accepted,
            delivery_offset: offset,
            awaiting_writable: false,
            stats: ConnectionStats::new(),
            accepted_at: Instant::now(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Whether the connection can still receive chatter
    pub fn is_alive(&self) -> bool {
        self.phase != ConnectionPhase::Closed
    }

    /// Next byte this reader has not received
    pub fn delivery_offset(&self) -> StreamOffset {
        self.delivery_offset
    }

    /// Write the greeting banner in a single non-blocking attempt
    ///
    /// The banner is not part of the stream, so the delivery offset is left
    /// alone. A short write is reported as `WriteZero`.
    pub fn greet(&mut self, banner: &[u8]) -> io::Result<()> {
        let Some(writer) = self.writer.as_ref() else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        self.phase = ConnectionPhase::Greeted;
        let written = writer.try_write(banner)?;
        self.stats.bytes_sent += written as u64;
        if written != banner.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("greeting truncated after {} bytes", written),
            ));
        }
        Ok(())
    }

    /// Enter the streaming phase
    pub fn start_streaming(&mut self) {
        if self.is_alive() {
            self.phase = ConnectionPhase::Streaming;
        }
    }

    /// Write as much of the log as the socket will take
    pub fn flush(&mut self, log: &MessageLog) -> FlushOutcome {
        let Some(writer) = self.writer.as_ref() else {
            return FlushOutcome::Closed;
        };

        let mut index = match log.locate(self.delivery_offset) {
            Some(index) => index,
            None => {
                // Only reachable if messages were reclaimed under us.
                tracing::warn!(
                    connection = self.id,
                    offset = %self.delivery_offset,
                    tail = %log.tail(),
                    "Delivery offset outside retained log, resyncing to tail"
                );
                self.delivery_offset = log.tail();
                0
            }
        };

        while let Some(message) = log.get(index) {
            let chunk = message.remaining_from(self.delivery_offset);

            match writer.try_write(chunk) {
                Ok(0) => return FlushOutcome::Blocked { needed: index },
                Ok(n) => {
                    self.delivery_offset = self.delivery_offset.advance(n);
                    self.stats.bytes_sent += n as u64;
                    if n >= chunk.len() {
                        self.stats.messages_sent += 1;
                        index += 1;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return FlushOutcome::Blocked { needed: index };
                }
                Err(e) if is_fatal(&e) => return FlushOutcome::Broken(e),
                Err(e) => {
                    self.stats.write_errors += 1;
                    return FlushOutcome::Stalled {
                        needed: index,
                        error: e,
                    };
                }
            }
        }

        FlushOutcome::Drained
    }

    /// Bytes appended to the log that this reader has not received yet
    pub fn backlog(&self, log: &MessageLog) -> usize {
        log.head().distance_from(self.delivery_offset)
    }

    /// Backlog queued behind the message currently being written
    ///
    /// A record larger than the socket buffer does not count against the
    /// reader until it has moved past it.
    pub fn queued(&self, log: &MessageLog) -> usize {
        let in_flight_end = log
            .locate(self.delivery_offset)
            .and_then(|index| log.get(index))
            .map_or(self.delivery_offset, |message| message.end());
        log.head().distance_from(in_flight_end)
    }

    /// Tear the connection down, releasing the socket
    ///
    /// Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == ConnectionPhase::Closed {
            return false;
        }
        self.phase = ConnectionPhase::Closed;
        self.writer = None;
        self.awaiting_writable = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::channel::mock::MockSocket;

    fn log_with(lines: &[&'static str]) -> MessageLog {
        let mut log = MessageLog::new();
        for line in lines {
            log.append(Bytes::from_static(line.as_bytes()));
        }
        log
    }

    #[test]
    fn test_flush_drains_everything() {
        let log = log_with(&["hello\n", "world\n"]);
        let socket = MockSocket::unlimited();
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::ZERO);

        let outcome = conn.flush(&log);

        assert!(matches!(outcome, FlushOutcome::Drained));
        assert_eq!(outcome.needed(log.len()), Some(2));
        assert_eq!(socket.received(), b"hello\nworld\n");
        assert_eq!(conn.delivery_offset(), StreamOffset::new(12));
        assert_eq!(conn.stats.messages_sent, 2);
        assert_eq!(conn.stats.bytes_sent, 12);
    }

    #[test]
    fn test_partial_write_resumes_at_exact_byte() {
        let log = log_with(&["hello\n", "world\n"]);
        let socket = MockSocket::with_capacity(8);
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::ZERO);

        let outcome = conn.flush(&log);
        assert!(matches!(outcome, FlushOutcome::Blocked { needed: 1 }));
        assert_eq!(conn.delivery_offset(), StreamOffset::new(8));
        assert_eq!(socket.received(), b"hello\nwo");

        socket.grant(100);
        let outcome = conn.flush(&log);
        assert!(matches!(outcome, FlushOutcome::Drained));
        assert_eq!(socket.received(), b"hello\nworld\n");
    }

    #[test]
    fn test_flush_starts_mid_stream() {
        let log = log_with(&["hello\n", "world\n"]);
        let socket = MockSocket::unlimited();
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::new(6));

        conn.flush(&log);

        assert_eq!(socket.received(), b"world\n");
    }

    #[test]
    fn test_interrupted_write_is_retried() {
        let log = log_with(&["hello\n"]);
        let socket = MockSocket::unlimited();
        socket.fail_next(io::ErrorKind::Interrupted);
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::ZERO);

        assert!(matches!(conn.flush(&log), FlushOutcome::Drained));
        assert_eq!(socket.received(), b"hello\n");
    }

    #[test]
    fn test_broken_pipe_is_fatal() {
        let log = log_with(&["hello\n"]);
        let socket = MockSocket::unlimited();
        socket.fail_next(io::ErrorKind::BrokenPipe);
        let mut conn = Connection::new(1, socket, StreamOffset::ZERO);

        let outcome = conn.flush(&log);

        assert!(matches!(outcome, FlushOutcome::Broken(_)));
        assert_eq!(outcome.needed(log.len()), None);
        assert_eq!(conn.delivery_offset(), StreamOffset::ZERO);
    }

    #[test]
    fn test_transient_error_keeps_offset() {
        let log = log_with(&["hello\n"]);
        let socket = MockSocket::unlimited();
        socket.fail_next(io::ErrorKind::OutOfMemory);
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::ZERO);

        let outcome = conn.flush(&log);
        assert!(matches!(outcome, FlushOutcome::Stalled { needed: 0, .. }));
        assert!(outcome.wants_writable());
        assert_eq!(conn.delivery_offset(), StreamOffset::ZERO);
        assert_eq!(conn.stats.write_errors, 1);

        assert!(matches!(conn.flush(&log), FlushOutcome::Drained));
        assert_eq!(socket.received(), b"hello\n");
    }

    #[test]
    fn test_greeting_does_not_move_offset() {
        let socket = MockSocket::unlimited();
        let mut conn = Connection::new(1, socket.clone(), StreamOffset::new(42));

        conn.greet(b"Chatter::ChatterSocket/1.0\r\n").unwrap();
        conn.start_streaming();

        assert_eq!(conn.phase(), ConnectionPhase::Streaming);
        assert_eq!(conn.delivery_offset(), StreamOffset::new(42));
        assert_eq!(socket.received(), b"Chatter::ChatterSocket/1.0\r\n");
    }

    #[test]
    fn test_short_greeting_reports_error() {
        let socket = MockSocket::with_capacity(4);
        let mut conn = Connection::new(1, socket, StreamOffset::ZERO);

        let err = conn.greet(b"Chatter::ChatterSocket/1.0\r\n").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(conn.phase(), ConnectionPhase::Greeted);
    }

    #[test]
    fn test_close_is_idempotent() {
        let log = log_with(&["hello\n"]);
        let mut conn = Connection::new(1, MockSocket::unlimited(), StreamOffset::ZERO);

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_alive());
        assert!(matches!(conn.flush(&log), FlushOutcome::Closed));
    }

    #[test]
    fn test_unreachable_peer_is_fatal() {
        let log = log_with(&["hello\n"]);
        for kind in [io::ErrorKind::TimedOut, io::ErrorKind::HostUnreachable] {
            let socket = MockSocket::unlimited();
            socket.fail_next(kind);
            let mut conn = Connection::new(1, socket, StreamOffset::ZERO);

            assert!(matches!(conn.flush(&log), FlushOutcome::Broken(_)));
        }
    }

    #[test]
    fn test_queued_excludes_message_in_flight() {
        let log = log_with(&["a long first record\n", "b\n", "c\n"]);
        let mut conn = Connection::new(1, MockSocket::unlimited(), StreamOffset::new(3));
        assert_eq!(conn.backlog(&log), 21);
        assert_eq!(conn.queued(&log), 4);

        conn.delivery_offset = log.head();
        assert_eq!(conn.queued(&log), 0);
    }

    #[test]
    fn test_backlog() {
        let log = log_with(&["hello\n", "world\n"]);
        let conn = Connection::new(1, MockSocket::unlimited(), StreamOffset::new(6));

        assert_eq!(conn.backlog(&log), 6);
    }
}
