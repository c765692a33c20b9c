//! Broadcast buffer: one message log fanned out to many connections
//!
//! Appending a message immediately tries to push it to every connection.
//! Connections whose sockets are full keep their offset and are picked up
//! again on the next writable notification. After each pass the buffer
//! reclaims messages that every live connection has received.

use std::collections::HashMap;
use std::ops::Range;

use bytes::Bytes;

use crate::event::EventSource;
use crate::registry::RegistryConfig;
use crate::seq::StreamOffset;
use crate::stats::ChannelStats;

use super::connection::{CloseReason, Connection, ConnectionId, FlushOutcome, SocketWrite};
use super::log::MessageLog;

/// Message log plus the connections reading from it
#[derive(Debug)]
pub struct BroadcastBuffer<W> {
    /// Messages not yet seen by every live connection
    log: MessageLog,

    /// Live connections
    connections: HashMap<ConnectionId, Connection<W>>,

    /// Reclaimable messages needed before collecting
    gc_threshold: usize,

    /// Undelivered bytes tolerated per connection (0 = unlimited)
    max_backlog: usize,

    /// Channel statistics
    stats: ChannelStats,
}

impl<W: SocketWrite> BroadcastBuffer<W> {
    /// Create an empty buffer
    pub fn new(config: &RegistryConfig) -> Self {
        Self::with_log(config, MessageLog::new())
    }

    /// Create a buffer around an existing log
    pub fn with_log(config: &RegistryConfig, log: MessageLog) -> Self {
        Self {
            log,
            connections: HashMap::new(),
            gc_threshold: config.gc_threshold,
            max_backlog: config.max_backlog,
            stats: ChannelStats::new(),
        }
    }

    /// The message log
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Channel statistics
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Look up a connection
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection<W>> {
        self.connections.get(&id)
    }

    /// IDs of live connections
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Smallest delivery offset over live connections
    pub fn watermark(&self) -> Option<StreamOffset> {
        self.connections
            .values()
            .map(|c| c.delivery_offset())
            .reduce(StreamOffset::min)
    }

    /// Attach a newly accepted socket
    ///
    /// The connection starts at the current head, so it only sees messages
    /// appended from now on. When `greeting` is given it is written once;
    /// failure to write it is logged and otherwise ignored.
    pub fn accept<E: EventSource<W>>(
        &mut self,
        id: ConnectionId,
        writer: W,
        greeting: Option<&[u8]>,
        events: &mut E,
    ) {
        events.register(id, &writer);

        let mut conn = Connection::new(id, writer, self.log.head());
        if let Some(banner) = greeting {
            if let Err(e) = conn.greet(banner) {
                tracing::warn!(connection = id, error = %e, "Unable to write greeting");
            }
        }
        conn.start_streaming();

        self.connections.insert(id, conn);
        self.stats.connections_accepted += 1;

        tracing::debug!(
            connection = id,
            offset = %self.log.head(),
            connections = self.connections.len(),
            "Connection attached"
        );
    }

    /// Append a message and push it out to every connection
    pub fn append<E: EventSource<W>>(&mut self, text: Bytes, events: &mut E) -> Range<StreamOffset> {
        let len = text.len();
        let range = self.log.append(text);
        if len > 0 {
            self.stats.messages_appended += 1;
            self.stats.bytes_appended += len as u64;
        }

        self.flush(events);
        range
    }

    /// Handle a writable notification for `id`
    pub fn on_writable<E: EventSource<W>>(&mut self, id: ConnectionId, events: &mut E) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.awaiting_writable = false;
        }
        self.flush(events);
    }

    /// Flush every connection, drop dead ones, and collect garbage
    pub fn flush<E: EventSource<W>>(&mut self, events: &mut E) {
        let mut min_needed = self.log.len();
        let mut dead = Vec::new();

        for conn in self.connections.values_mut() {
            let outcome = conn.flush(&self.log);

            match &outcome {
                FlushOutcome::Broken(e) => {
                    tracing::debug!(connection = conn.id, error = %e, "Write failed");
                    dead.push((conn.id, CloseReason::PeerClosed));
                    continue;
                }
                FlushOutcome::Stalled { error, .. } => {
                    tracing::debug!(
                        connection = conn.id,
                        error = %error,
                        "Transient write error, retrying when writable"
                    );
                }
                _ => {}
            }

            if self.max_backlog > 0 && conn.queued(&self.log) > self.max_backlog {
                dead.push((conn.id, CloseReason::Lagging));
                continue;
            }

            if outcome.wants_writable() && !conn.awaiting_writable {
                conn.awaiting_writable = true;
                events.want_writable(conn.id);
            }

            if let Some(needed) = outcome.needed(self.log.len()) {
                min_needed = min_needed.min(needed);
            }
        }

        for (id, reason) in dead {
            self.close(id, reason, events);
        }

        self.collect(min_needed);
    }

    /// Reclaim messages before index `min_needed`
    fn collect(&mut self, min_needed: usize) {
        let removed = if self.connections.is_empty() {
            self.log.gc(None)
        } else if min_needed >= self.gc_threshold {
            let watermark = self.log.offset_of(min_needed);
            self.log.gc(watermark)
        } else {
            0
        };

        if removed > 0 {
            self.stats.messages_collected += removed as u64;
            tracing::trace!(
                removed = removed,
                retained = self.log.len(),
                "Collected delivered messages"
            );
        }
    }

    /// Close and discard a connection
    ///
    /// Returns false if no such connection exists.
    pub fn close<E: EventSource<W>>(
        &mut self,
        id: ConnectionId,
        reason: CloseReason,
        events: &mut E,
    ) -> bool {
        let Some(mut conn) = self.connections.remove(&id) else {
            return false;
        };

        events.unregister(id);
        conn.close();
        self.stats.connections_closed += 1;

        if reason == CloseReason::Lagging {
            self.stats.connections_evicted += 1;
            tracing::warn!(
                connection = id,
                backlog = conn.backlog(&self.log),
                limit = self.max_backlog,
                "Connection dropped: backlog exceeded"
            );
        } else {
            tracing::debug!(
                connection = id,
                reason = %reason,
                bytes_sent = conn.stats.bytes_sent,
                "Connection closed"
            );
        }
        true
    }

    /// Close every connection
    pub fn close_all<E: EventSource<W>>(&mut self, events: &mut E) {
        for id in self.connection_ids() {
            self.close(id, CloseReason::Shutdown, events);
        }
        self.collect(self.log.len());
    }
}
