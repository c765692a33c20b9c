//! Producer side: emitting chatter
//!
//! [`ChatterHandle`] is what the rest of the process holds to emit chatter.
//! Sending never blocks and never fails loudly: once the server has stopped,
//! messages are simply dropped.
//!
//! [`ChatterLayer`] plugs the handle into `tracing`, so every event the
//! process logs also becomes a line on a chatter channel:
//!
//! ```text
//!  INFO my_app::worker: job finished job=42 elapsed_ms=17
//! ```

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::protocol::constants::DEFAULT_CHANNEL;
use crate::registry::sink::SINK_TARGET;
use crate::server::LoopEvent;

/// Cloneable handle for emitting chatter into a running server
#[derive(Debug, Clone)]
pub struct ChatterHandle {
    tx: mpsc::UnboundedSender<LoopEvent>,
}

impl ChatterHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { tx }
    }

    /// Emit text on the default channel
    ///
    /// Returns false if the server is no longer running.
    pub fn chatter(&self, text: impl Into<String>) -> bool {
        self.chatter_to(DEFAULT_CHANNEL, text)
    }

    /// Emit text on a named channel
    pub fn chatter_to(&self, channel: impl Into<Cow<'static, str>>, text: impl Into<String>) -> bool {
        self.tx
            .send(LoopEvent::Chatter {
                channel: channel.into(),
                text: text.into(),
            })
            .is_ok()
    }

    /// Whether the server has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A `tracing` layer forwarding events to the default channel
    pub fn layer(&self) -> ChatterLayer {
        ChatterLayer::new(self.clone())
    }
}

/// `tracing` layer that turns events into chatter
#[derive(Debug, Clone)]
pub struct ChatterLayer {
    handle: ChatterHandle,
    channel: Cow<'static, str>,
}

impl ChatterLayer {
    /// Forward events to the default channel
    pub fn new(handle: ChatterHandle) -> Self {
        Self {
            handle,
            channel: Cow::Borrowed(DEFAULT_CHANNEL),
        }
    }

    /// Forward events to `channel` instead
    pub fn channel(mut self, channel: impl Into<Cow<'static, str>>) -> Self {
        self.channel = channel.into();
        self
    }
}

impl<S: Subscriber> Layer<S> for ChatterLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // Sink output would come straight back here.
        if meta.target() == SINK_TARGET {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{:>5} {}: {}{}",
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        );
        self.handle.chatter_to(self.channel.clone(), line);
    }
}

/// Collects an event's message and `key=value` fields
#[derive(Debug, Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
