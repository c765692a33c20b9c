//! Listening sockets and accepted streams

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream, UnixListener, UnixStream};

use crate::channel::SocketWrite;
use crate::error::{Error, Result};
use crate::protocol::constants::LISTEN_BACKLOG;

use super::config::{ListenerConfig, Transport};

/// Longest Unix socket path `sockaddr_un` can hold, excluding the NUL
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub const MAX_UNIX_PATH: usize = 103;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
pub const MAX_UNIX_PATH: usize = 107;

/// An accepted chatter connection
///
/// Cheap to clone: the channel writes through one clone while the event
/// source waits for writability on another.
#[derive(Debug, Clone)]
pub enum ChatterStream {
    Tcp(Arc<TcpStream>),
    Unix(Arc<UnixStream>),
}

impl ChatterStream {
    /// Wait until the socket can accept more bytes
    pub async fn writable(&self) -> io::Result<()> {
        match self {
            ChatterStream::Tcp(s) => s.writable().await,
            ChatterStream::Unix(s) => s.writable().await,
        }
    }
}

impl SocketWrite for ChatterStream {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ChatterStream::Tcp(s) => s.try_write(buf),
            ChatterStream::Unix(s) => s.try_write(buf),
        }
    }
}

/// Removes a Unix socket file when dropped
#[derive(Debug)]
pub struct SocketPath(PathBuf);

impl SocketPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SocketPath {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

/// A bound, listening chatter socket
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Bind and listen according to `config`
    ///
    /// For Unix sockets the returned guard removes the socket file when it
    /// is dropped.
    pub fn bind(config: &ListenerConfig) -> Result<(Self, Option<SocketPath>)> {
        match &config.transport {
            Transport::Tcp(addr) => Ok((Self::bind_tcp(*addr)?, None)),
            Transport::Unix(path) => {
                let path_len = path.as_os_str().len();
                if path_len > MAX_UNIX_PATH {
                    return Err(Error::PathTooLong {
                        path: path.clone(),
                        max: MAX_UNIX_PATH,
                    });
                }

                let listener = UnixListener::bind(path)?;
                Ok((Listener::Unix(listener), Some(SocketPath(path.clone()))))
            }
        }
    }

    fn bind_tcp(addr: SocketAddr) -> Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Err(e) = socket.set_reuseaddr(true) {
            tracing::warn!(error = %e, "setsockopt SO_REUSEADDR failed");
        }
        socket.bind(addr)?;
        Ok(Listener::Tcp(socket.listen(LISTEN_BACKLOG)?))
    }

    /// Local TCP address, if this is a TCP listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr().ok(),
            Listener::Unix(_) => None,
        }
    }

    /// Accept the next connection
    ///
    /// Returns the stream and a printable peer description.
    pub async fn accept(&self, tcp_nodelay: bool) -> io::Result<(ChatterStream, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                if tcp_nodelay {
                    stream.set_nodelay(true)?;
                }
                Ok((ChatterStream::Tcp(Arc::new(stream)), peer.to_string()))
            }
            Listener::Unix(l) => {
                let (stream, peer) = l.accept().await?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix:unnamed".to_string());
                Ok((ChatterStream::Unix(Arc::new(stream)), peer))
            }
        }
    }
}
