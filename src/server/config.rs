//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::protocol::constants::DEFAULT_CHANNEL;
use crate::registry::{ChannelPolicy, RegistryConfig};

/// Where a chatter socket listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// TCP socket
    Tcp(SocketAddr),
    /// Unix-domain stream socket at a filesystem path
    Unix(PathBuf),
}

/// One listening chatter socket
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Where to listen
    pub transport: Transport,

    /// Channel whose chatter this socket serves
    pub channel: String,

    /// Keep the channel's chatter out of the default sink
    pub quiet_channel: bool,

    /// Greet new connections with the protocol banner
    pub greeting: bool,
}

impl ListenerConfig {
    /// Listen on a TCP port on all interfaces
    pub fn tcp(port: u16) -> Self {
        Self::with_transport(Transport::Tcp(SocketAddr::from((
            Ipv4Addr::UNSPECIFIED,
            port,
        ))))
    }

    /// Listen on a specific TCP address
    pub fn tcp_addr(addr: SocketAddr) -> Self {
        Self::with_transport(Transport::Tcp(addr))
    }

    /// Listen on a Unix-domain socket
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::with_transport(Transport::Unix(path.into()))
    }

    fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            channel: DEFAULT_CHANNEL.to_string(),
            quiet_channel: true,
            greeting: true,
        }
    }

    /// Set the channel
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set whether the channel is quiet
    pub fn quiet_channel(mut self, quiet: bool) -> Self {
        self.quiet_channel = quiet;
        self
    }

    /// Set whether connections are greeted
    pub fn greeting(mut self, greeting: bool) -> Self {
        self.greeting = greeting;
        self
    }

    /// Channel policy derived from this listener
    pub fn policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            quiet: self.quiet_channel,
            greeting: self.greeting,
        }
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Chatter sockets to open
    pub listeners: Vec<ListenerConfig>,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on accepted TCP connections
    pub tcp_nodelay: bool,

    /// Channel registry settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a config with a single listener
    pub fn with_listener(listener: ListenerConfig) -> Self {
        Self::default().listener(listener)
    }

    /// Add a listener
    pub fn listener(mut self, listener: ListenerConfig) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set TCP_NODELAY
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Set registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}
