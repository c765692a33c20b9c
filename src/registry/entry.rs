//! Channel entry and policy types
//!
//! This module defines the per-channel state stored in the registry.

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;

use crate::channel::{BroadcastBuffer, ConnectionId, SocketWrite};
use crate::event::EventSource;
use crate::seq::StreamOffset;
use crate::stats::ChannelStats;

use super::config::RegistryConfig;
use super::sink::ChatterSink;

/// Identifier of a listening endpoint attached to a channel
pub type SubscriberId = u64;

/// Per-channel behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPolicy {
    /// Keep this channel's chatter out of the process default sink
    pub quiet: bool,
    /// Send the greeting banner to new connections
    pub greeting: bool,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            quiet: true,
            greeting: true,
        }
    }
}

/// Entry for a single channel in the registry
#[derive(Debug)]
pub struct Channel<W> {
    /// Channel name
    name: String,

    /// Message log and connections
    pub(super) buffer: BroadcastBuffer<W>,

    /// Policy fixed at creation
    policy: ChannelPolicy,

    /// Where captured text is passed on to
    pub(super) base: Arc<dyn ChatterSink>,

    /// Attached listening endpoints
    subscribers: Vec<SubscriberId>,

    /// Banner for new connections, if greeting is on
    greeting: Option<Bytes>,
}

impl<W: SocketWrite> Channel<W> {
    /// Create a new channel entry
    pub(super) fn new(
        name: impl Into<String>,
        policy: ChannelPolicy,
        base: Arc<dyn ChatterSink>,
        config: &RegistryConfig,
    ) -> Self {
        let greeting = policy
            .greeting
            .then(|| crate::protocol::greeting(&config.product));

        Self {
            name: name.into(),
            buffer: BroadcastBuffer::new(config),
            policy,
            base,
            subscribers: Vec::new(),
            greeting,
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel policy
    pub fn policy(&self) -> ChannelPolicy {
        self.policy
    }

    /// The broadcast buffer
    pub fn buffer(&self) -> &BroadcastBuffer<W> {
        &self.buffer
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Attach a subscriber; attaching twice is a no-op
    pub(super) fn add_subscriber(&mut self, id: SubscriberId) {
        if !self.subscribers.contains(&id) {
            self.subscribers.push(id);
        }
    }

    /// Detach a subscriber, returning whether it was attached
    pub(super) fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        match self.subscribers.iter().position(|s| *s == id) {
            Some(pos) => {
                self.subscribers.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Capture one record: pass it to the base sink and broadcast it
    pub(super) fn capture<E: EventSource<W>>(
        &mut self,
        record: Bytes,
        events: &mut E,
    ) -> Range<StreamOffset> {
        if let Ok(text) = std::str::from_utf8(&record) {
            self.base.emit(text);
        }
        self.buffer.append(record, events)
    }

    /// Attach an accepted socket
    pub(super) fn accept<E: EventSource<W>>(&mut self, id: ConnectionId, writer: W, events: &mut E) {
        self.buffer
            .accept(id, writer, self.greeting.as_deref(), events);
    }

    /// Snapshot of the channel's state
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self.name.clone(),
            policy: self.policy,
            subscriber_count: self.subscribers.len(),
            connection_count: self.buffer.connection_count(),
            retained_messages: self.buffer.log().len(),
            retained_bytes: self.buffer.log().size(),
            head: self.buffer.log().head(),
            stats: self.buffer.stats().clone(),
        }
    }
}

/// Snapshot of a channel
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// Channel name
    pub name: String,
    /// Channel policy
    pub policy: ChannelPolicy,
    /// Attached subscribers
    pub subscriber_count: usize,
    /// Live connections
    pub connection_count: usize,
    /// Messages still held for slow connections
    pub retained_messages: usize,
    /// Bytes still held for slow connections
    pub retained_bytes: usize,
    /// Current end of the stream
    pub head: StreamOffset,
    /// Counters
    pub stats: ChannelStats,
}
