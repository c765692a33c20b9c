//! Base sinks for chatter text
//!
//! Every channel passes the text it captures on to a base sink: the process
//! default for the `default` channel and loud named channels, or the silent
//! sink for quiet ones.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Target used by [`TracingSink`]; chatter layers skip it
pub const SINK_TARGET: &str = "chatter_rs::sink";

/// Destination for chatter text
pub trait ChatterSink: fmt::Debug + Send + Sync {
    /// Deliver one newline-terminated message
    fn emit(&self, text: &str);
}

/// Writes chatter to standard error
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ChatterSink for StderrSink {
    fn emit(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        // Nowhere left to report a failing stderr.
        let _ = stderr.write_all(text.as_bytes());
    }
}

/// Discards chatter
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ChatterSink for SilentSink {
    fn emit(&self, _text: &str) {}
}

/// Re-emits chatter as `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ChatterSink for TracingSink {
    fn emit(&self, text: &str) {
        tracing::info!(target: SINK_TARGET, "{}", text.trim_end_matches('\n'));
    }
}

/// Keeps chatter in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl ChatterSink for MemorySink {
    fn emit(&self, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(text.to_string());
        }
    }
}

/// Stands in for the process default sink while the `default` channel is open
///
/// Emitted text is queued; the registry appends it to the `default` channel
/// on its next turn.
#[derive(Debug, Default, Clone)]
pub struct ChannelSink {
    pending: Arc<Mutex<Vec<String>>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything queued so far
    pub(crate) fn take(&self) -> Vec<String> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl ChatterSink for ChannelSink {
    fn emit(&self, text: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(text.to_string());
        }
    }
}
