//! Statistics for chatter channels and connections

use std::time::{Duration, Instant};

/// Connection-level statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Total bytes written, greeting included
    pub bytes_sent: u64,
    /// Messages written in full
    pub messages_sent: u64,
    /// Transient write errors seen
    pub write_errors: u64,
}

impl ConnectionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }
}

/// Channel-level statistics
#[derive(Debug, Clone)]
pub struct ChannelStats {
    /// When the channel was created
    pub created_at: Instant,
    /// Messages appended
    pub messages_appended: u64,
    /// Bytes appended
    pub bytes_appended: u64,
    /// Messages reclaimed by garbage collection
    pub messages_collected: u64,
    /// Connections accepted
    pub connections_accepted: u64,
    /// Connections closed for any reason
    pub connections_closed: u64,
    /// Connections dropped for exceeding the backlog limit
    pub connections_evicted: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            messages_appended: 0,
            bytes_appended: 0,
            messages_collected: 0,
            connections_accepted: 0,
            connections_closed: 0,
            connections_evicted: 0,
        }
    }

    /// Time since the channel was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Average appended bytes per second
    pub fn byte_rate(&self) -> u64 {
        let secs = self.age().as_secs();
        if secs > 0 {
            self.bytes_appended / secs
        } else {
            0
        }
    }
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::new()
    }
}
