//! Registry error types
//!
//! Error types for channel registry operations.

use crate::channel::ConnectionId;

use super::entry::SubscriberId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No channel with this name
    ChannelNotFound(String),
    /// Subscriber is not attached to the channel
    SubscriberNotFound {
        /// Channel name
        channel: String,
        /// Subscriber ID
        id: SubscriberId,
    },
    /// No live connection with this ID
    ConnectionNotFound(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ChannelNotFound(name) => write!(f, "Channel not found: {}", name),
            RegistryError::SubscriberNotFound { channel, id } => {
                write!(f, "Subscriber {} not attached to channel {}", id, channel)
            }
            RegistryError::ConnectionNotFound(id) => write!(f, "Connection not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
