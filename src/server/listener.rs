//! Chatter server
//!
//! Binds the configured chatter sockets and runs the event loop that owns
//! the channel registry.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::handle::ChatterHandle;
use crate::registry::{ChannelRegistry, ChatterSink, SubscriberId};
use crate::server::config::{ListenerConfig, ServerConfig};
use crate::server::events::{LoopEvent, TokioEvents};
use crate::server::socket::{ChatterStream, Listener, SocketPath};

/// Registry type driven by the server loop
pub type ServerRegistry = ChannelRegistry<ChatterStream, TokioEvents>;

/// Pause after a failed accept, so a full fd table does not spin the task
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A listener bound during setup
struct BoundListener {
    config: ListenerConfig,
    listener: Listener,
    path: Option<SocketPath>,
}

/// Chatter server
pub struct ChatterServer {
    config: ServerConfig,
    listeners: Vec<BoundListener>,
    default_sink: Option<std::sync::Arc<dyn ChatterSink>>,
    tx: mpsc::UnboundedSender<LoopEvent>,
    rx: mpsc::UnboundedReceiver<LoopEvent>,
}

impl ChatterServer {
    /// Bind every configured listener
    ///
    /// Any socket, bind, or listen failure aborts startup.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        if config.listeners.is_empty() {
            return Err(Error::Config("no listeners configured".to_string()));
        }

        let mut listeners = Vec::with_capacity(config.listeners.len());

        for listener_config in &config.listeners {
            let (listener, path) = Listener::bind(listener_config)?;
            tracing::info!(
                transport = ?listener_config.transport,
                channel = %listener_config.channel,
                "Chatter socket listening"
            );
            listeners.push(BoundListener {
                config: listener_config.clone(),
                listener,
                path,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            listeners,
            default_sink: None,
            tx,
            rx,
        })
    }

    /// Replace the process default sink (stderr unless set)
    pub fn with_default_sink(mut self, sink: std::sync::Arc<dyn ChatterSink>) -> Self {
        self.default_sink = Some(sink);
        self
    }

    /// Handle for emitting chatter into this server
    pub fn handle(&self) -> ChatterHandle {
        ChatterHandle::new(self.tx.clone())
    }

    /// Local TCP addresses, in listener order (`None` for Unix sockets)
    pub fn local_addrs(&self) -> Vec<Option<SocketAddr>> {
        self.listeners.iter().map(|l| l.listener.local_addr()).collect()
    }

    /// Run the server until the process ends
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let ChatterServer {
            config,
            listeners,
            default_sink,
            tx,
            mut rx,
        } = self;

        let mut registry =
            ChannelRegistry::with_config(config.registry.clone(), TokioEvents::new(tx.clone()));
        if let Some(sink) = default_sink {
            registry = registry.with_default_sink(sink);
        }

        let mut subscriptions: Vec<(String, SubscriberId)> = Vec::new();
        let mut accept_tasks = Vec::new();
        let mut socket_paths = Vec::new();

        for bound in listeners {
            let id = registry.subscribe(&bound.config.channel, bound.config.policy());
            subscriptions.push((bound.config.channel.clone(), id));
            accept_tasks.push(spawn_accept_loop(
                bound.listener,
                bound.config.channel,
                config.tcp_nodelay,
                tx.clone(),
            ));
            socket_paths.extend(bound.path);
        }
        drop(tx);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => handle_event(&mut registry, event, config.max_connections),
                    None => break,
                },
            }
        }

        for task in &accept_tasks {
            task.abort();
        }
        registry.close_all();
        for (channel, id) in subscriptions {
            if let Err(e) = registry.unsubscribe(&channel, id) {
                tracing::warn!(channel = %channel, error = %e, "Unsubscribe failed");
            }
        }
        drop(socket_paths);

        Ok(())
    }
}

/// Forward accepted sockets from `listener` to the loop
fn spawn_accept_loop(
    listener: Listener,
    channel: String,
    tcp_nodelay: bool,
    tx: mpsc::UnboundedSender<LoopEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept(tcp_nodelay).await {
                Ok((stream, peer)) => {
                    let event = LoopEvent::Accepted {
                        channel: channel.clone(),
                        stream,
                        peer,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    })
}

/// Apply one loop event to the registry
fn handle_event(registry: &mut ServerRegistry, event: LoopEvent, max_connections: usize) {
    match event {
        LoopEvent::Accepted {
            channel,
            stream,
            peer,
        } => {
            // Check connection limit
            if max_connections > 0 && registry.connection_count() >= max_connections {
                tracing::warn!(peer = %peer, "Connection rejected: limit reached");
                return;
            }

            match registry.accept(&channel, stream) {
                Ok(id) => {
                    tracing::debug!(connection = id, peer = %peer, channel = %channel, "New connection");
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Connection dropped");
                }
            }
        }
        LoopEvent::Chatter { channel, text } => {
            registry.chatter(&channel, &text);
        }
        LoopEvent::Writable(id) => registry.on_writable(id),
    }
}
