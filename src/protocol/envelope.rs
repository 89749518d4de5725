//! The top-level message envelope.
//!
//! Wire layout, in order: 4-byte signature (a caller-supplied constant
//! identifying protocol and version), 2-byte little-endian payload length,
//! the payload (each top-level tag framed by the codec), and a 2-byte
//! checksum over the payload bytes only.

use std::rc::Rc;

use tracing::trace;

use crate::arena::{Alloc, Arena};
use crate::protocol::checksum::crc16;
use crate::protocol::codec::{self, WireError};
use crate::tree::Tag;

/// Signature plus payload length field.
pub const HEADER_LEN: usize = 6;
/// Trailing checksum field.
pub const TRAILER_LEN: usize = 2;

/// A complete protocol message: a list of sibling tag trees plus the
/// passive retry fields an external sender consults.
///
/// The ownership mode of every node under the message — individually
/// heap-owned or carved from one shared arena — is fixed at construction
/// ([`new`](Self::new) vs [`with_arena`](Self::with_arena)) and inherited
/// by all tags and variables created through it.
///
/// # Examples
///
/// ```rust
/// use tagwire::Message;
///
/// let mut msg = Message::new();
/// msg.add_tag(5).add_u8(3, 200);
/// let bytes = msg.encode(0x1234_5678);
/// let decoded = Message::decode(0x1234_5678, &bytes).unwrap();
/// assert_eq!(decoded.tags(), msg.tags());
/// ```
#[derive(Debug, Default)]
pub struct Message {
    tags: Vec<Tag>,
    /// Earliest time an external sender should try this message again.
    /// Passive: nothing in this crate reads or advances it.
    next_resend_at: u64,
    /// Whether an external sender should drop the message once sent.
    delete_after_send: bool,
    alloc: Alloc,
}

impl Message {
    /// Creates an empty message whose nodes are individually heap-owned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty message whose node payloads are carved from one
    /// arena of `capacity` bytes, reclaimed in a single step when the
    /// message is dropped.
    pub fn with_arena(capacity: usize) -> Self {
        Self {
            alloc: Alloc::Arena(Rc::new(Arena::with_capacity(capacity))),
            ..Self::default()
        }
    }

    /// The message's arena, when it owns one.
    pub fn arena(&self) -> Option<&Arena> {
        match &self.alloc {
            Alloc::Heap => None,
            Alloc::Arena(arena) => Some(arena),
        }
    }

    /// Appends a top-level tag and returns it for population.
    pub fn add_tag(&mut self, id: u16) -> &mut Tag {
        self.tags.push(Tag::with_alloc(id, self.alloc.clone()));
        self.tags.last_mut().expect("just pushed")
    }

    /// Top-level tags in insertion order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut [Tag] {
        &mut self.tags
    }

    /// First top-level tag with the given identifier.
    pub fn tag(&self, id: u16) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id() == id)
    }

    pub fn tag_mut(&mut self, id: u16) -> Option<&mut Tag> {
        self.tags.iter_mut().find(|t| t.id() == id)
    }

    /// Earliest next send attempt, as recorded by the caller.
    pub fn next_resend_at(&self) -> u64 {
        self.next_resend_at
    }

    pub fn set_next_resend_at(&mut self, at: u64) {
        self.next_resend_at = at;
    }

    /// Whether the external sender should drop the message once sent.
    pub fn delete_after_send(&self) -> bool {
        self.delete_after_send
    }

    pub fn set_delete_after_send(&mut self, delete: bool) {
        self.delete_after_send = delete;
    }

    // ── Encoding ─────────────────────────────────────────────────────────────

    /// Exact size [`encode`](Self::encode) will produce, computable in
    /// advance so callers can size buffers correctly.
    pub fn encoded_size(&self) -> usize {
        HEADER_LEN + self.payload_size() + TRAILER_LEN
    }

    fn payload_size(&self) -> usize {
        self.tags.iter().map(codec::encoded_tag_len).sum()
    }

    /// Serializes the message under the caller's protocol signature.
    ///
    /// The payload length field is 2 bytes; the serialized tags must fit
    /// in 65535 bytes, which [`encoded_size`](Self::encoded_size) lets the
    /// caller check in advance.
    pub fn encode(&self, signature: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(signature, &mut buf);
        buf
    }

    /// Appends the serialized message to `buf`, returning the number of
    /// bytes written.
    pub fn encode_into(&self, signature: u32, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();
        buf.extend_from_slice(&signature.to_le_bytes());

        let len_field = buf.len();
        buf.extend_from_slice(&[0, 0]);

        let payload_start = buf.len();
        for tag in &self.tags {
            codec::encode_tag(buf, tag);
        }
        let payload_len = buf.len() - payload_start;
        debug_assert!(payload_len <= u16::MAX as usize, "payload exceeds the 2-byte length field");
        buf[len_field..len_field + 2].copy_from_slice(&(payload_len as u16).to_le_bytes());

        let crc = crc16(&buf[payload_start..]);
        buf.extend_from_slice(&crc.to_le_bytes());

        let written = buf.len() - start;
        trace!(tags = self.tags.len(), bytes = written, "encoded message");
        written
    }

    // ── Decoding ─────────────────────────────────────────────────────────────

    /// Parses a message with individually heap-owned nodes.
    ///
    /// Fails closed: signature, declared length, and checksum are all
    /// verified before any tag is reconstructed, and no partial tree is
    /// ever returned.  A buffer longer than the declared length is
    /// accepted (trailing bytes ignored); a shorter one is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] on signature mismatch, length inconsistency,
    /// checksum mismatch, or any malformed tag or variable.
    pub fn decode(signature: u32, bytes: &[u8]) -> Result<Message, WireError> {
        Self::decode_with(signature, bytes, Alloc::Heap)
    }

    /// Like [`decode`](Self::decode), but every reconstructed payload is
    /// carved from a fresh arena of `capacity` bytes.
    pub fn decode_with_arena(
        signature: u32,
        bytes: &[u8],
        capacity: usize,
    ) -> Result<Message, WireError> {
        Self::decode_with(
            signature,
            bytes,
            Alloc::Arena(Rc::new(Arena::with_capacity(capacity))),
        )
    }

    fn decode_with(signature: u32, bytes: &[u8], alloc: Alloc) -> Result<Message, WireError> {
        let found = match bytes.get(..4) {
            Some(&[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]),
            _ => {
                return Err(WireError::InsufficientData {
                    needed: HEADER_LEN + TRAILER_LEN,
                    available: bytes.len(),
                })
            }
        };
        if found != signature {
            return Err(WireError::SignatureMismatch {
                expected: signature,
                found,
            });
        }

        let declared = match bytes.get(4..6) {
            Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]) as usize,
            _ => {
                return Err(WireError::InsufficientData {
                    needed: HEADER_LEN + TRAILER_LEN,
                    available: bytes.len(),
                })
            }
        };
        let needed = HEADER_LEN + declared + TRAILER_LEN;
        if bytes.len() < needed {
            return Err(WireError::InsufficientData {
                needed,
                available: bytes.len(),
            });
        }

        // Checksum over exactly the declared payload, before any node is
        // built.  Anything after the trailer is ignored.
        let payload = &bytes[HEADER_LEN..HEADER_LEN + declared];
        let carried = u16::from_le_bytes([bytes[HEADER_LEN + declared], bytes[HEADER_LEN + declared + 1]]);
        let computed = crc16(payload);
        if carried != computed {
            return Err(WireError::ChecksumMismatch { carried, computed });
        }

        let mut tags = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let (tag, consumed) = codec::decode_tag(&payload[offset..], &alloc)?;
            offset += consumed;
            tags.push(tag);
        }
        trace!(tags = tags.len(), bytes = needed, "decoded message");
        Ok(Message {
            tags,
            next_resend_at: 0,
            delete_after_send: false,
            alloc,
        })
    }
}
