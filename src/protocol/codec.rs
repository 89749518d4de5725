//! Wire framing for tags and variables.
//!
//! Every node opens with a 2-byte little-endian identifier whose numeric
//! range alone says what follows:
//!
//! ```text
//! 2–10001       nested tag        (tag id + 1)
//! 30001–40000   variable          (variable id + 30001)
//! 0xFFFF        end of children
//! ```
//!
//! A tag is `[id+1][framed children...][FFFF]`; a variable is
//! `[id+30001][type byte][length field, if the type carries one][payload]`.
//! All integers are little-endian.

use thiserror::Error;

use crate::arena::Alloc;
use crate::tree::variable::LenPrefix;
use crate::tree::{Node, Tag, VarType, Variable};

/// Bias applied to tag identifiers on the wire.
pub const TAG_WIRE_BIAS: u16 = 1;
/// Bias applied to variable identifiers on the wire.
pub const VAR_WIRE_BIAS: u16 = 30_001;
/// Reserved identifier closing a tag's child list.
pub const END_OF_CHILDREN: u16 = 0xFFFF;

/// Wire range occupied by biased tag identifiers.
const TAG_WIRE_MIN: u16 = crate::tree::TAG_ID_MIN + TAG_WIRE_BIAS;
const TAG_WIRE_MAX: u16 = crate::tree::TAG_ID_MAX + TAG_WIRE_BIAS;
/// Wire range occupied by biased variable identifiers.
const VAR_WIRE_MIN: u16 = VAR_WIRE_BIAS;
const VAR_WIRE_MAX: u16 = crate::tree::VAR_ID_MAX + VAR_WIRE_BIAS;

/// Errors that can occur while decoding a message or a subtree.
///
/// Any error aborts the whole parse; a partially built tree is never
/// handed to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    /// The buffer does not open with the caller's protocol signature.
    #[error("signature mismatch: expected 0x{expected:08X}, found 0x{found:08X}")]
    SignatureMismatch { expected: u32, found: u32 },

    /// The byte slice is shorter than the structure it claims to hold.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The checksum carried by the message does not match the payload.
    #[error("checksum mismatch: message carries 0x{carried:04X}, payload computes 0x{computed:04X}")]
    ChecksumMismatch { carried: u16, computed: u16 },

    /// A 2-byte identifier field falls outside every reserved range.
    #[error("identifier 0x{0:04X} is outside the tag and variable ranges")]
    IdOutOfRange(u16),

    /// A variable's type byte is not assigned (0x94–0xFF).
    #[error("unknown variable type tag: 0x{0:02X}")]
    UnknownTypeTag(u8),

    /// A declared payload length runs past the end of the buffer.
    #[error("declared payload length {declared} exceeds available {available}")]
    TruncatedPayload { declared: usize, available: usize },
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Appends the framed form of `tag` (children and sentinel included).
pub(crate) fn encode_tag(buf: &mut Vec<u8>, tag: &Tag) {
    buf.extend_from_slice(&(tag.id() + TAG_WIRE_BIAS).to_le_bytes());
    for child in tag.children() {
        match child {
            Node::Tag(t) => encode_tag(buf, t),
            Node::Variable(v) => encode_variable(buf, v),
        }
    }
    buf.extend_from_slice(&END_OF_CHILDREN.to_le_bytes());
}

fn encode_variable(buf: &mut Vec<u8>, var: &Variable) {
    buf.extend_from_slice(&(var.id() + VAR_WIRE_BIAS).to_le_bytes());
    buf.push(var.var_type().wire_byte());
    let payload = var.payload_bytes();
    match var.var_type().length_prefix() {
        Some(LenPrefix::One) => buf.push(payload.len() as u8),
        Some(LenPrefix::Two) => buf.extend_from_slice(&(payload.len() as u16).to_le_bytes()),
        None => {}
    }
    buf.extend_from_slice(&payload);
}

/// Serialized size of `tag` in bytes, computable without encoding.
pub(crate) fn encoded_tag_len(tag: &Tag) -> usize {
    let children: usize = tag
        .children()
        .iter()
        .map(|child| match child {
            Node::Tag(t) => encoded_tag_len(t),
            Node::Variable(v) => encoded_variable_len(v),
        })
        .sum();
    // id + children + sentinel
    2 + children + 2
}

fn encoded_variable_len(var: &Variable) -> usize {
    let prefix = match var.var_type().length_prefix() {
        Some(LenPrefix::One) => 1,
        Some(LenPrefix::Two) => 2,
        None => 0,
    };
    // id + type byte + length field + payload
    2 + 1 + prefix + var.size() as usize
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one framed tag from the start of `bytes`.
///
/// Returns the tag and the number of bytes consumed so the caller can
/// advance its cursor.  Children are manufactured recursively until the
/// end-of-children sentinel.
pub(crate) fn decode_tag(bytes: &[u8], alloc: &Alloc) -> Result<(Tag, usize), WireError> {
    let wire_id = read_u16(bytes, 0)?;
    if !(TAG_WIRE_MIN..=TAG_WIRE_MAX).contains(&wire_id) {
        return Err(WireError::IdOutOfRange(wire_id));
    }
    let mut tag = Tag::with_alloc(wire_id - TAG_WIRE_BIAS, alloc.clone());
    let mut offset = 2;
    loop {
        let marker = read_u16(bytes, offset)?;
        if marker == END_OF_CHILDREN {
            offset += 2;
            return Ok((tag, offset));
        }
        if (TAG_WIRE_MIN..=TAG_WIRE_MAX).contains(&marker) {
            let (child, consumed) = decode_tag(&bytes[offset..], alloc)?;
            tag.push_tag(child);
            offset += consumed;
        } else if (VAR_WIRE_MIN..=VAR_WIRE_MAX).contains(&marker) {
            let (child, consumed) = decode_variable(&bytes[offset..], alloc)?;
            tag.push_var(child);
            offset += consumed;
        } else {
            return Err(WireError::IdOutOfRange(marker));
        }
    }
}

fn decode_variable(bytes: &[u8], alloc: &Alloc) -> Result<(Variable, usize), WireError> {
    let wire_id = read_u16(bytes, 0)?;
    debug_assert!((VAR_WIRE_MIN..=VAR_WIRE_MAX).contains(&wire_id));
    let type_byte = *bytes
        .get(2)
        .ok_or(WireError::InsufficientData {
            needed: 3,
            available: bytes.len(),
        })?;
    let ty = VarType::from_wire(type_byte).ok_or(WireError::UnknownTypeTag(type_byte))?;

    let (payload_len, payload_start) = match ty.length_prefix() {
        Some(LenPrefix::One) => {
            let len = *bytes.get(3).ok_or(WireError::InsufficientData {
                needed: 4,
                available: bytes.len(),
            })?;
            (len as usize, 4)
        }
        Some(LenPrefix::Two) => (read_u16(bytes, 3)? as usize, 5),
        // Fixed-width and short-string types carry their size in the type
        // tag itself; length_prefix() is None exactly for those.
        None => (ty.fixed_len().unwrap_or(0), 3),
    };

    let end = payload_start + payload_len;
    if bytes.len() < end {
        return Err(WireError::TruncatedPayload {
            declared: payload_len,
            available: bytes.len().saturating_sub(payload_start),
        });
    }
    let var = Variable::from_wire(
        wire_id - VAR_WIRE_BIAS,
        ty,
        &bytes[payload_start..end],
        alloc,
    );
    Ok((var, end))
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, WireError> {
    match bytes.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
        _ => Err(WireError::InsufficientData {
            needed: offset + 2,
            available: bytes.len(),
        }),
    }
}
