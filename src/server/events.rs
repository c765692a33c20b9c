//! Event loop plumbing
//!
//! Everything that can change registry state arrives at the server loop as a
//! [`LoopEvent`] over one unbounded channel: accepted sockets from the accept
//! tasks, chatter from [`ChatterHandle`](crate::handle::ChatterHandle)s, and
//! writability from the per-connection watchers below.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::channel::ConnectionId;
use crate::event::EventSource;

use super::socket::ChatterStream;

/// Input to the server loop
#[derive(Debug)]
pub enum LoopEvent {
    /// A listener accepted a connection
    Accepted {
        /// Channel the listener serves
        channel: String,
        /// The new socket
        stream: ChatterStream,
        /// Printable peer address
        peer: String,
    },
    /// Chatter text for a channel
    Chatter {
        /// Target channel
        channel: Cow<'static, str>,
        /// Message text
        text: String,
    },
    /// A connection's socket can take more bytes
    Writable(ConnectionId),
}

/// Per-connection writability watcher
#[derive(Debug)]
struct Watcher {
    armed: Arc<Notify>,
    task: JoinHandle<()>,
}

/// [`EventSource`] backed by tokio readiness
///
/// Each registered connection gets a small task that sleeps until armed,
/// waits for the socket to become writable, and posts one
/// [`LoopEvent::Writable`].
#[derive(Debug)]
pub struct TokioEvents {
    tx: mpsc::UnboundedSender<LoopEvent>,
    watchers: HashMap<ConnectionId, Watcher>,
}

impl TokioEvents {
    /// Create an event source posting to `tx`
    pub fn new(tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            tx,
            watchers: HashMap::new(),
        }
    }

    /// Number of connections being watched
    pub fn watched(&self) -> usize {
        self.watchers.len()
    }
}

impl EventSource<ChatterStream> for TokioEvents {
    fn register(&mut self, id: ConnectionId, writer: &ChatterStream) {
        let armed = Arc::new(Notify::new());
        let stream = writer.clone();
        let tx = self.tx.clone();
        let wait = Arc::clone(&armed);

        let task = tokio::spawn(async move {
            loop {
                wait.notified().await;
                let ready = stream.writable().await;
                if tx.send(LoopEvent::Writable(id)).is_err() {
                    break;
                }
                if let Err(e) = ready {
                    // The next flush sees the error; stop watching.
                    tracing::debug!(connection = id, error = %e, "Writability wait failed");
                    break;
                }
            }
        });

        if let Some(old) = self.watchers.insert(id, Watcher { armed, task }) {
            old.task.abort();
        }
    }

    fn want_writable(&mut self, id: ConnectionId) {
        if let Some(watcher) = self.watchers.get(&id) {
            watcher.armed.notify_one();
        }
    }

    fn unregister(&mut self, id: ConnectionId) {
        if let Some(watcher) = self.watchers.remove(&id) {
            watcher.task.abort();
        }
    }
}

impl Drop for TokioEvents {
    fn drop(&mut self) {
        for watcher in self.watchers.values() {
            watcher.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn stream_pair() -> (ChatterStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (ChatterStream::Tcp(Arc::new(server)), client)
    }

    #[tokio::test]
    async fn test_armed_watcher_reports_writable() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut events = TokioEvents::new(tx);
        let (stream, _client) = stream_pair().await;

        events.register(7, &stream);
        events.want_writable(7);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(LoopEvent::Writable(7))));
    }

    #[tokio::test]
    async fn test_unarmed_watcher_stays_quiet() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut events = TokioEvents::new(tx);
        let (stream, _client) = stream_pair().await;

        events.register(7, &stream);

        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unregister_stops_watching() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut events = TokioEvents::new(tx);
        let (stream, _client) = stream_pair().await;

        events.register(7, &stream);
        assert_eq!(events.watched(), 1);

        events.unregister(7);
        events.want_writable(7);
        assert_eq!(events.watched(), 0);
    }
}
