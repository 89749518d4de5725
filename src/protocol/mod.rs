//! Wire format: framing codec, checksum, and the message envelope.

pub mod checksum;
pub mod codec;
pub mod envelope;

pub use checksum::crc16;
pub use codec::{WireError, END_OF_CHILDREN, TAG_WIRE_BIAS, VAR_WIRE_BIAS};
pub use envelope::{Message, HEADER_LEN, TRAILER_LEN};
