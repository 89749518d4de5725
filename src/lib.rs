//! # tagwire
//!
//! A compact, self-describing binary messaging protocol for exchanging
//! structured device state between two endpoints over an unreliable byte
//! transport.  State is a tree of named **tags** containing nested tags
//! and typed **variables**; a message frames one or more tag trees with a
//! signature, a length, and a checksum.
//!
//! This crate is the protocol core only.  It has no I/O: sockets, serial
//! links, and retry scheduling live with the caller, which hands byte
//! buffers in and out.
//!
//! The crate defines:
//!
//! - **`arena`** – a bump allocator giving a whole message's node graph a
//!   single lifetime and an O(1) teardown.
//!
//! - **`tree`** – the recursive tag/variable node model: ~20 typed value
//!   encodings with a "shortest representation" policy for integers,
//!   saturating best-effort getters, deep copy by serialize-and-reparse,
//!   and the request/response merge protocol (`update_*`) that lets one
//!   endpoint ask for fields by sending them empty and the other fill
//!   them in.
//!
//! - **`protocol`** – the wire format: range-biased identifiers, the
//!   end-of-children sentinel, the CRC-16 payload checksum, and the
//!   [`Message`] envelope with its fail-closed parser.

pub mod arena;
pub mod protocol;
pub mod tree;

pub use arena::{Alloc, Arena, Span};
pub use protocol::checksum::crc16;
pub use protocol::codec::WireError;
pub use protocol::envelope::Message;
pub use tree::variable::{
    FloatPrecision, VarType, Variable, BOOL_ARRAY_MAX_LEN, BYTE_ARRAY_MAX_LEN,
    SHORT_STRING_MAX_LEN,
};
pub use tree::{Node, Tag, UpdateOutcome, TAG_ID_MAX, TAG_ID_MIN, VAR_ID_MAX};
