//! The raw bytes received from a client in a single read.
//!
//! Clients send the message text followed by a terminating NUL byte, so a
//! five-character message arrives as six bytes.  The server
//! does not require the terminator, but [`Payload::text`] stops at the first
//! NUL so a terminated message renders without a trailing control character.

use std::borrow::Cow;
use std::fmt;

/// Bytes delivered by one read on a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Wraps an owned byte buffer.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Copies the filled prefix of a read buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Returns the raw bytes exactly as read from the socket.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes received, including any NUL terminator.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` if the last byte is a NUL terminator.
    pub fn is_nul_terminated(&self) -> bool {
        self.bytes.last() == Some(&0)
    }

    /// Text up to (not including) the first NUL byte.
    ///
    /// Invalid UTF-8 sequences are replaced with `U+FFFD`, so this never
    /// fails; it is meant for logging, not for parsing.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }

    /// Space-separated lowercase hex rendering of every byte.
    pub fn hex_dump(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len() * 3);
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// Consumes the payload and returns the owned buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Encodes `text` the way the one-shot client sends it: UTF-8 bytes followed
/// by a single NUL terminator.
///
/// # Examples
///
/// ```rust
/// use portgate_core::encode_message;
///
/// let wire = encode_message("hello");
/// assert_eq!(wire, b"hello\0");
/// assert_eq!(wire.len(), 6);
/// ```
pub fn encode_message(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────
