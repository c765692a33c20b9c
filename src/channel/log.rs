//! Append-only message log
//!
//! The log holds the tail of a channel's virtual byte stream. Each message
//! remembers the stream offset of its first byte, so a connection that has
//! received up to offset `n` can find exactly where to resume:
//!
//! ```text
//!   start: 0        6         12        19
//!          |hello\n |world\n  |again\n  |
//!                      ^
//!                      delivery_offset = 8  → message 1, byte 2
//! ```
//!
//! Messages leave the log only through [`MessageLog::gc`], once every live
//! connection has moved past them.

use std::collections::VecDeque;
use std::ops::Range;

use bytes::Bytes;

use crate::seq::StreamOffset;

/// A chatter message stamped with its position in the stream
#[derive(Debug, Clone)]
pub struct Message {
    /// Offset of the first byte
    pub start: StreamOffset,
    /// Message text, always newline-terminated
    pub text: Bytes,
}

impl Message {
    /// Offset one past the last byte
    pub fn end(&self) -> StreamOffset {
        self.start.advance(self.text.len())
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the message carries no bytes
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Remaining bytes for a reader positioned at `offset`
    ///
    /// `offset` must lie inside `[start, end)`.
    pub fn remaining_from(&self, offset: StreamOffset) -> &[u8] {
        let skip = offset.distance_from(self.start).min(self.text.len());
        &self.text[skip..]
    }
}

/// Ordered log of messages not yet reclaimed
#[derive(Debug, Default)]
pub struct MessageLog {
    /// Retained messages, oldest first
    messages: VecDeque<Message>,
    /// Offset the next appended message will receive
    head: StreamOffset,
    /// Bytes currently retained
    size: usize,
}

impl MessageLog {
    /// Create an empty log starting at offset zero
    pub fn new() -> Self {
        Self::starting_at(StreamOffset::ZERO)
    }

    /// Create an empty log whose first message starts at `head`
    pub fn starting_at(head: StreamOffset) -> Self {
        Self {
            messages: VecDeque::new(),
            head,
            size: 0,
        }
    }

    /// Append a message and return the range of offsets it occupies
    ///
    /// Empty text is not stored and yields an empty range at the head.
    pub fn append(&mut self, text: Bytes) -> Range<StreamOffset> {
        let start = self.head;
        if text.is_empty() {
            return start..start;
        }

        let end = start.advance(text.len());
        self.size += text.len();
        self.messages.push_back(Message { start, text });
        self.head = end;

        start..end
    }

    /// Offset one past the newest byte
    pub fn head(&self) -> StreamOffset {
        self.head
    }

    /// Offset of the oldest retained byte (the head if the log is empty)
    pub fn tail(&self) -> StreamOffset {
        self.messages.front().map_or(self.head, |m| m.start)
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are retained
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Retained bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Message at `index`
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Start offset of message `index`, or the head when `index == len()`
    pub fn offset_of(&self, index: usize) -> Option<StreamOffset> {
        if index == self.messages.len() {
            Some(self.head)
        } else {
            self.messages.get(index).map(|m| m.start)
        }
    }

    /// Index of the message containing `offset`
    ///
    /// Returns `Some(len())` when `offset` is the head (nothing left to send)
    /// and `None` when `offset` falls outside the retained range.
    pub fn locate(&self, offset: StreamOffset) -> Option<usize> {
        if offset == self.head {
            return Some(self.messages.len());
        }
        if offset.lt(self.tail()) || offset.gt(self.head) {
            return None;
        }

        // First message starting after `offset`; the one before it covers it.
        let after = self.messages.partition_point(|m| m.start.leq(offset));
        Some(after - 1)
    }

    /// Discard every message that ends at or before `watermark`
    ///
    /// `None` stands for an unbounded watermark and empties the log. Returns
    /// the number of messages removed.
    pub fn gc(&mut self, watermark: Option<StreamOffset>) -> usize {
        let Some(watermark) = watermark else {
            let removed = self.messages.len();
            self.messages.clear();
            self.size = 0;
            return removed;
        };

        let mut removed = 0;
        while let Some(front) = self.messages.front() {
            if !front.end().leq(watermark) {
                break;
            }
            self.size -= front.len();
            self.messages.pop_front();
            removed += 1;
        }
        removed
    }

    /// Iterate over retained messages, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
