//! In-memory socket for exercising flush behavior

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::event::EventSource;

use super::connection::{ConnectionId, SocketWrite};

#[derive(Debug, Default)]
struct MockState {
    received: Vec<u8>,
    /// Bytes the socket will still accept; `None` is unlimited
    budget: Option<usize>,
    failures: VecDeque<io::ErrorKind>,
}

/// A socket whose send buffer size is controlled by the test
#[derive(Debug, Clone, Default)]
pub(crate) struct MockSocket {
    state: Arc<Mutex<MockState>>,
}

impl MockSocket {
    pub(crate) fn unlimited() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(budget: usize) -> Self {
        let socket = Self::default();
        socket.state.lock().unwrap().budget = Some(budget);
        socket
    }

    /// Let `n` more bytes through
    pub(crate) fn grant(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        if let Some(budget) = state.budget.as_mut() {
            *budget += n;
        }
    }

    /// Make the next write fail with `kind`
    pub(crate) fn fail_next(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().failures.push_back(kind);
    }

    pub(crate) fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }
}

impl SocketWrite for MockSocket {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();

        if let Some(kind) = state.failures.pop_front() {
            return Err(kind.into());
        }

        let n = match state.budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => budget.min(buf.len()),
            None => buf.len(),
        };
        if let Some(budget) = state.budget.as_mut() {
            *budget -= n;
        }
        state.received.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Event source that remembers what it was asked to do
#[derive(Debug, Default)]
pub(crate) struct RecordingEvents {
    pub(crate) registered: Vec<ConnectionId>,
    pub(crate) armed: Vec<ConnectionId>,
    pub(crate) unregistered: Vec<ConnectionId>,
}

impl RecordingEvents {
    /// Take the pending writability requests
    pub(crate) fn take_armed(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.armed)
    }
}

impl<W> EventSource<W> for RecordingEvents {
    fn register(&mut self, id: ConnectionId, _writer: &W) {
        self.registered.push(id);
    }

    fn want_writable(&mut self, id: ConnectionId) {
        self.armed.push(id);
    }

    fn unregister(&mut self, id: ConnectionId) {
        self.unregistered.push(id);
    }
}
