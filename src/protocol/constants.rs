//! Chatter socket protocol constants

/// Protocol version announced in the greeting
pub const PROTOCOL_VERSION: &str = "1.0";

/// Product name announced in the greeting
pub const DEFAULT_PRODUCT: &str = "Chatter";

/// Name of the channel that intercepts the process default sink
pub const DEFAULT_CHANNEL: &str = "default";

/// Pending-connection backlog for listening sockets
pub const LISTEN_BACKLOG: u32 = 2;

/// Reclaimable messages that trigger garbage collection
pub const DEFAULT_GC_THRESHOLD: usize = 10;

/// Undelivered bytes after which a connection is dropped (4MB)
pub const DEFAULT_MAX_BACKLOG: usize = 4 * 1024 * 1024;
