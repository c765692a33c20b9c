//! Chatter socket wire protocol
//!
//! The stream is plain text: one chatter message per line, each terminated
//! by `\n`, with no other framing. A connection may optionally receive a
//! single greeting line before the stream starts:
//!
//! ```text
//! Chatter::ChatterSocket/1.0\r\n
//! first message\n
//! second message\n
//! ```

pub mod constants;

use bytes::{BufMut, Bytes, BytesMut};

use constants::PROTOCOL_VERSION;

/// Build the greeting banner for `product`
pub fn greeting(product: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(product.len() + 32);
    buf.put_slice(product.as_bytes());
    buf.put_slice(b"::ChatterSocket/");
    buf.put_slice(PROTOCOL_VERSION.as_bytes());
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Turn chatter text into a stream record
///
/// Appends the terminating newline when missing. Empty text stays empty.
pub fn to_record(text: &str) -> Bytes {
    if text.is_empty() || text.ends_with('\n') {
        return Bytes::copy_from_slice(text.as_bytes());
    }

    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        assert_eq!(&greeting("Chatter")[..], b"Chatter::ChatterSocket/1.0\r\n");
        assert_eq!(&greeting("Click")[..], b"Click::ChatterSocket/1.0\r\n");
    }

    #[test]
    fn test_record_adds_newline() {
        assert_eq!(&to_record("hello")[..], b"hello\n");
    }

    #[test]
    fn test_record_keeps_existing_newline() {
        assert_eq!(&to_record("hello\n")[..], b"hello\n");
        assert_eq!(&to_record("two\nlines\n")[..], b"two\nlines\n");
    }

    #[test]
    fn test_empty_record() {
        assert!(to_record("").is_empty());
    }
}
