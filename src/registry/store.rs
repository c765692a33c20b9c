//! Channel registry implementation
//!
//! The central registry that owns every chatter channel and routes text and
//! socket events to them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::channel::{CloseReason, ConnectionId, SocketWrite};
use crate::event::EventSource;
use crate::protocol;
use crate::protocol::constants::DEFAULT_CHANNEL;
use crate::seq::StreamOffset;

use super::config::RegistryConfig;
use super::entry::{Channel, ChannelInfo, ChannelPolicy, SubscriberId};
use super::error::RegistryError;
use super::sink::{ChannelSink, ChatterSink, SilentSink, StderrSink};

/// Registry of all chatter channels
///
/// Owned by a single event loop; every method runs to completion without
/// blocking, so no locking is involved.
pub struct ChannelRegistry<W, E> {
    /// Map of channel name to channel entry
    channels: HashMap<String, Channel<W>>,

    /// Channel each live connection belongs to
    routes: HashMap<ConnectionId, String>,

    /// Readiness notifications
    events: E,

    /// Current process default sink; the forwarding stand-in while the
    /// default channel exists
    default_sink: Arc<dyn ChatterSink>,

    /// Sink the default channel took over, handed back on teardown
    intercepted: Option<Arc<dyn ChatterSink>>,

    /// Queue behind the stand-in default sink
    forward: ChannelSink,

    /// Configuration
    config: RegistryConfig,

    next_subscriber_id: SubscriberId,
    next_connection_id: ConnectionId,
}

impl<W: SocketWrite, E: EventSource<W>> ChannelRegistry<W, E> {
    /// Create a new registry with default configuration
    pub fn new(events: E) -> Self {
        Self::with_config(RegistryConfig::default(), events)
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig, events: E) -> Self {
        Self {
            channels: HashMap::new(),
            routes: HashMap::new(),
            events,
            default_sink: Arc::new(StderrSink),
            intercepted: None,
            forward: ChannelSink::new(),
            config,
            next_subscriber_id: 1,
            next_connection_id: 1,
        }
    }

    /// Use `sink` as the process default sink
    pub fn with_default_sink(mut self, sink: Arc<dyn ChatterSink>) -> Self {
        self.default_sink = sink;
        self
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The event source
    pub fn events(&self) -> &E {
        &self.events
    }

    /// The event source, mutably
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// The process default sink
    ///
    /// While the `default` channel exists this is a [`ChannelSink`] whose
    /// text is appended to that channel.
    pub fn default_sink(&self) -> &Arc<dyn ChatterSink> {
        &self.default_sink
    }

    /// Get or create a channel
    ///
    /// A new `default` channel intercepts the current default sink: the
    /// channel passes its text on to that sink, and the registry's default
    /// sink becomes a [`ChannelSink`] feeding the channel. Other new channels
    /// pass text to the silent sink when `quiet`, else to the intercepted
    /// (original) default sink. The policy of an existing channel is left
    /// unchanged.
    pub fn get_or_create(&mut self, name: &str, policy: ChannelPolicy) -> &mut Channel<W> {
        let channel = match self.channels.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let base: Arc<dyn ChatterSink> = if name == DEFAULT_CHANNEL {
                    let stand_in: Arc<dyn ChatterSink> = Arc::new(self.forward.clone());
                    let prior = std::mem::replace(&mut self.default_sink, stand_in);
                    self.intercepted = Some(Arc::clone(&prior));
                    prior
                } else if policy.quiet {
                    Arc::new(SilentSink)
                } else {
                    Arc::clone(self.intercepted.as_ref().unwrap_or(&self.default_sink))
                };

                tracing::info!(
                    channel = name,
                    quiet = policy.quiet,
                    greeting = policy.greeting,
                    "Channel created"
                );
                entry.insert(Channel::new(name, policy, base, &self.config))
            }
        };

        if channel.policy() != policy {
            tracing::debug!(
                channel = name,
                requested = ?policy,
                kept = ?channel.policy(),
                "Channel exists, keeping its original policy"
            );
        }
        channel
    }

    /// Attach a listening endpoint to a channel, creating it if needed
    pub fn subscribe(&mut self, name: &str, policy: ChannelPolicy) -> SubscriberId {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        let channel = self.get_or_create(name, policy);
        channel.add_subscriber(id);

        tracing::debug!(
            channel = name,
            subscriber = id,
            subscribers = channel.subscriber_count(),
            "Subscriber added"
        );
        id
    }

    /// Detach a listening endpoint
    ///
    /// Removing the last subscriber closes the channel's connections, drops
    /// the channel, and for `default` restores the intercepted sink. Returns
    /// whether the channel was torn down.
    pub fn unsubscribe(&mut self, name: &str, id: SubscriberId) -> Result<bool, RegistryError> {
        let channel = self
            .channels
            .get_mut(name)
            .ok_or_else(|| RegistryError::ChannelNotFound(name.to_string()))?;

        if !channel.remove_subscriber(id) {
            return Err(RegistryError::SubscriberNotFound {
                channel: name.to_string(),
                id,
            });
        }

        tracing::debug!(
            channel = name,
            subscriber = id,
            subscribers = channel.subscriber_count(),
            "Subscriber removed"
        );

        if channel.subscriber_count() > 0 {
            return Ok(false);
        }

        self.teardown(name);
        Ok(true)
    }

    /// Drop a channel and everything it owns
    fn teardown(&mut self, name: &str) {
        if name == DEFAULT_CHANNEL {
            self.drain_default_sink();
        }
        let Some(mut channel) = self.channels.remove(name) else {
            return;
        };

        for id in channel.buffer.connection_ids() {
            self.routes.remove(&id);
        }
        channel.buffer.close_all(&mut self.events);

        if name == DEFAULT_CHANNEL {
            if let Some(prior) = self.intercepted.take() {
                self.restore_default_sink(prior);
            }
        }

        tracing::info!(channel = name, "Channel removed");
    }

    /// Make `sink` the default sink again after the default channel goes
    ///
    /// Text still queued behind the stand-in sink is passed to `sink`.
    pub fn restore_default_sink(&mut self, sink: Arc<dyn ChatterSink>) {
        for text in self.forward.take() {
            sink.emit(&text);
        }
        tracing::debug!(sink = ?sink, "Default sink restored");
        self.default_sink = sink;
    }

    /// Append text queued on the stand-in default sink to the default channel
    ///
    /// Runs at the start of every registry turn; call it directly after
    /// emitting to [`default_sink`](Self::default_sink) to deliver at once.
    pub fn drain_default_sink(&mut self) {
        let pending = self.forward.take();
        if pending.is_empty() {
            return;
        }

        match self.channels.get_mut(DEFAULT_CHANNEL) {
            Some(channel) => {
                for text in pending {
                    let record = protocol::to_record(&text);
                    if !record.is_empty() {
                        channel.capture(record, &mut self.events);
                    }
                }
            }
            None => {
                for text in pending {
                    self.default_sink.emit(&text);
                }
            }
        }
    }

    /// Emit chatter on a channel
    ///
    /// The text gets a trailing newline if it lacks one, is passed to the
    /// channel's base sink, and is broadcast to its connections. Text for
    /// `default` while that channel does not exist goes to the default sink;
    /// text for any other missing channel is discarded. Empty text is
    /// ignored.
    pub fn chatter(&mut self, name: &str, text: &str) -> Option<Range<StreamOffset>> {
        self.drain_default_sink();

        let record = protocol::to_record(text);
        if record.is_empty() {
            return None;
        }

        if let Some(channel) = self.channels.get_mut(name) {
            return Some(channel.capture(record, &mut self.events));
        }

        if name == DEFAULT_CHANNEL {
            if let Ok(text) = std::str::from_utf8(&record) {
                self.default_sink.emit(text);
            }
        } else {
            tracing::trace!(channel = name, "No such channel, chatter discarded");
        }
        None
    }

    /// Attach an accepted socket to a channel
    pub fn accept(&mut self, name: &str, writer: W) -> Result<ConnectionId, RegistryError> {
        self.drain_default_sink();

        let channel = self
            .channels
            .get_mut(name)
            .ok_or_else(|| RegistryError::ChannelNotFound(name.to_string()))?;

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        channel.accept(id, writer, &mut self.events);
        self.routes.insert(id, name.to_string());
        Ok(id)
    }

    /// Handle a writable notification
    ///
    /// Notifications for connections that are already gone are ignored.
    pub fn on_writable(&mut self, id: ConnectionId) {
        self.drain_default_sink();

        let Some(name) = self.routes.get(&id) else {
            return;
        };
        if let Some(channel) = self.channels.get_mut(name) {
            channel.buffer.on_writable(id, &mut self.events);
        }
        self.prune_routes();
    }

    /// Force a connection closed
    pub fn close_connection(&mut self, id: ConnectionId) -> Result<(), RegistryError> {
        let name = self
            .routes
            .remove(&id)
            .ok_or(RegistryError::ConnectionNotFound(id))?;

        if let Some(channel) = self.channels.get_mut(&name) {
            channel
                .buffer
                .close(id, CloseReason::Shutdown, &mut self.events);
        }
        Ok(())
    }

    /// Forget routes of connections their channel has dropped
    fn prune_routes(&mut self) {
        let channels = &self.channels;
        self.routes.retain(|id, name| {
            channels
                .get(name)
                .is_some_and(|c| c.buffer().connection(*id).is_some())
        });
    }

    /// Look up a channel
    pub fn channel(&self, name: &str) -> Option<&Channel<W>> {
        self.channels.get(name)
    }

    /// Snapshot of a channel
    pub fn channel_info(&self, name: &str) -> Option<ChannelInfo> {
        self.channels.get(name).map(Channel::info)
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of live connections across all channels
    pub fn connection_count(&self) -> usize {
        self.channels
            .values()
            .map(|c| c.buffer().connection_count())
            .sum()
    }

    /// Close every connection on every channel
    pub fn close_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.buffer.close_all(&mut self.events);
        }
        self.routes.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::channel::mock::{MockSocket, RecordingEvents};
    use crate::registry::sink::MemorySink;

    type TestRegistry = ChannelRegistry<MockSocket, RecordingEvents>;

    fn registry_with_sink() -> (TestRegistry, MemorySink) {
        let sink = MemorySink::new();
        let registry =
            ChannelRegistry::new(RecordingEvents::default()).with_default_sink(Arc::new(sink.clone()));
        (registry, sink)
    }

    fn no_greeting() -> ChannelPolicy {
        ChannelPolicy {
            quiet: true,
            greeting: false,
        }
    }

    #[test]
    fn test_subscribe_creates_and_unsubscribe_destroys() {
        let (mut registry, _) = registry_with_sink();

        let a = registry.subscribe("debug", no_greeting());
        let b = registry.subscribe("debug", no_greeting());
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.channel_info("debug").unwrap().subscriber_count, 2);

        assert_eq!(registry.unsubscribe("debug", a), Ok(false));
        assert_eq!(registry.channel_count(), 1);

        assert_eq!(registry.unsubscribe("debug", b), Ok(true));
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_unsubscribe_errors() {
        let (mut registry, _) = registry_with_sink();

        assert_eq!(
            registry.unsubscribe("missing", 1),
            Err(RegistryError::ChannelNotFound("missing".into()))
        );

        registry.subscribe("debug", no_greeting());
        assert!(matches!(
            registry.unsubscribe("debug", 99),
            Err(RegistryError::SubscriberNotFound { id: 99, .. })
        ));
    }

    #[test]
    fn test_default_channel_scenario() {
        let (mut registry, _) = registry_with_sink();
        registry.subscribe(DEFAULT_CHANNEL, no_greeting());

        let x = MockSocket::with_capacity(6);
        let x_id = registry.accept(DEFAULT_CHANNEL, x.clone()).unwrap();

        let range = registry.chatter(DEFAULT_CHANNEL, "hello").unwrap();
        assert_eq!(range, StreamOffset::new(0)..StreamOffset::new(6));
        assert_eq!(x.received(), b"hello\n");

        registry.chatter(DEFAULT_CHANNEL, "world\n");
        let info = registry.channel_info(DEFAULT_CHANNEL).unwrap();
        assert_eq!(info.retained_messages, 2);
        assert_eq!(info.head, StreamOffset::new(12));

        let y = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, y.clone()).unwrap();
        registry.chatter(DEFAULT_CHANNEL, "fresh");
        assert_eq!(y.received(), b"fresh\n");

        x.grant(100);
        registry.on_writable(x_id);
        assert_eq!(x.received(), b"hello\nworld\nfresh\n");
    }

    #[test]
    fn test_default_channel_intercepts_and_restores_sink() {
        let (mut registry, sink) = registry_with_sink();

        let id = registry.subscribe(DEFAULT_CHANNEL, ChannelPolicy::default());
        let socket = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, socket.clone()).unwrap();

        // Quiet is ignored for the default channel: text still reaches the sink
        registry.chatter(DEFAULT_CHANNEL, "captured");
        assert_eq!(sink.lines(), vec!["captured\n"]);
        assert!(socket.received().ends_with(b"captured\n"));

        registry.unsubscribe(DEFAULT_CHANNEL, id).unwrap();
        assert_eq!(registry.connection_count(), 0);

        registry.chatter(DEFAULT_CHANNEL, "after");
        assert_eq!(sink.lines(), vec!["captured\n", "after\n"]);
        assert!(!socket.received().ends_with(b"after\n"));
    }

    #[test]
    fn test_quiet_channel_suppresses_base_sink() {
        let (mut registry, sink) = registry_with_sink();
        registry.subscribe("quiet", no_greeting());
        let socket = MockSocket::unlimited();
        registry.accept("quiet", socket.clone()).unwrap();

        registry.chatter("quiet", "secret");

        assert!(sink.lines().is_empty());
        assert_eq!(socket.received(), b"secret\n");
    }

    #[test]
    fn test_loud_channel_passes_through() {
        let (mut registry, sink) = registry_with_sink();
        registry.subscribe(
            "loud",
            ChannelPolicy {
                quiet: false,
                greeting: false,
            },
        );

        registry.chatter("loud", "visible");

        assert_eq!(sink.lines(), vec!["visible\n"]);
    }

    #[test]
    fn test_unclaimed_channel_is_discarded() {
        let (mut registry, sink) = registry_with_sink();

        assert!(registry.chatter(DEFAULT_CHANNEL, "no listener").is_none());
        assert!(registry.chatter("nobody", "orphan").is_none());
        assert_eq!(sink.lines(), vec!["no listener\n"]);

        registry.subscribe(DEFAULT_CHANNEL, no_greeting());
        let socket = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, socket.clone()).unwrap();

        assert!(registry.chatter("nobody", "still orphan").is_none());
        assert!(socket.received().is_empty());
        assert_eq!(sink.lines(), vec!["no listener\n"]);
    }

    #[test]
    fn test_default_sink_feeds_default_channel() {
        let (mut registry, sink) = registry_with_sink();
        let id = registry.subscribe(DEFAULT_CHANNEL, no_greeting());
        let socket = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, socket.clone()).unwrap();

        let stand_in = Arc::clone(registry.default_sink());
        stand_in.emit("from elsewhere");
        registry.drain_default_sink();

        assert_eq!(socket.received(), b"from elsewhere\n");
        assert_eq!(sink.lines(), vec!["from elsewhere\n"]);

        registry.unsubscribe(DEFAULT_CHANNEL, id).unwrap();
        registry.default_sink().emit("restored\n");

        assert_eq!(sink.lines(), vec!["from elsewhere\n", "restored\n"]);
        assert_eq!(socket.received(), b"from elsewhere\n");
    }

    #[test]
    fn test_queued_default_text_survives_teardown() {
        let (mut registry, sink) = registry_with_sink();
        let id = registry.subscribe(DEFAULT_CHANNEL, no_greeting());
        let socket = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, socket.clone()).unwrap();

        registry.default_sink().emit("last words\n");
        registry.unsubscribe(DEFAULT_CHANNEL, id).unwrap();

        assert_eq!(sink.lines(), vec!["last words\n"]);
        assert_eq!(socket.received(), b"last words\n");
    }

    #[test]
    fn test_loud_channel_uses_intercepted_sink() {
        let (mut registry, sink) = registry_with_sink();
        registry.subscribe(DEFAULT_CHANNEL, no_greeting());
        let default_socket = MockSocket::unlimited();
        registry.accept(DEFAULT_CHANNEL, default_socket.clone()).unwrap();
        registry.subscribe(
            "loud",
            ChannelPolicy {
                quiet: false,
                greeting: false,
            },
        );

        registry.chatter("loud", "visible");

        assert_eq!(sink.lines(), vec!["visible\n"]);
        assert!(default_socket.received().is_empty());
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut registry, _) = registry_with_sink();
        registry.subscribe("a", no_greeting());
        registry.subscribe("b", no_greeting());
        let a = MockSocket::unlimited();
        let b = MockSocket::unlimited();
        registry.accept("a", a.clone()).unwrap();
        registry.accept("b", b.clone()).unwrap();

        registry.chatter("a", "for a");
        registry.chatter("b", "for b");

        assert_eq!(a.received(), b"for a\n");
        assert_eq!(b.received(), b"for b\n");
    }

    #[test]
    fn test_greeting_uses_configured_product() {
        let config = RegistryConfig::default().product("Click");
        let mut registry: TestRegistry =
            ChannelRegistry::with_config(config, RecordingEvents::default());
        registry.subscribe(DEFAULT_CHANNEL, ChannelPolicy::default());
        let socket = MockSocket::unlimited();

        registry.accept(DEFAULT_CHANNEL, socket.clone()).unwrap();

        assert_eq!(socket.received(), b"Click::ChatterSocket/1.0\r\n");
    }

    #[test]
    fn test_accept_unknown_channel() {
        let (mut registry, _) = registry_with_sink();

        let result = registry.accept("missing", MockSocket::unlimited());

        assert_eq!(
            result,
            Err(RegistryError::ChannelNotFound("missing".into()))
        );
    }

    #[test]
    fn test_broken_connection_route_pruned() {
        let (mut registry, _) = registry_with_sink();
        registry.subscribe("debug", no_greeting());
        let socket = MockSocket::with_capacity(0);
        let id = registry.accept("debug", socket.clone()).unwrap();

        registry.chatter("debug", "stuck");
        socket.fail_next(io::ErrorKind::ConnectionReset);
        registry.on_writable(id);

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(
            registry.close_connection(id),
            Err(RegistryError::ConnectionNotFound(id))
        );
        // Stale notification is harmless
        registry.on_writable(id);
    }

    #[test]
    fn test_close_connection() {
        let (mut registry, _) = registry_with_sink();
        registry.subscribe("debug", no_greeting());
        let id = registry.accept("debug", MockSocket::unlimited()).unwrap();

        registry.close_connection(id).unwrap();

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.events().unregistered, vec![id]);
    }

    #[test]
    fn test_existing_policy_kept() {
        let (mut registry, _) = registry_with_sink();
        registry.subscribe("debug", no_greeting());

        let channel = registry.get_or_create(
            "debug",
            ChannelPolicy {
                quiet: false,
                greeting: true,
            },
        );

        assert_eq!(channel.policy(), no_greeting());
    }
}
