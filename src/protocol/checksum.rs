//! Payload integrity checksum.
//!
//! A bit-serial CRC-16 with polynomial 0x8005, zero initial value, no bit
//! reflection and no final XOR (the parameter set known as CRC-16/UMTS).
//! The envelope computes it over the payload bytes only — never over the
//! signature or length fields.

/// CRC polynomial: x^16 + x^15 + x^2 + 1.
const POLY: u16 = 0x8005;

/// Computes the checksum of `data`.
///
/// Bits are fed most-significant first.  For every bit the register is
/// shifted left; when the incoming bit differs from the bit shifted out,
/// the register is XORed with the polynomial.  Any single-bit corruption
/// of the input changes the result, which the envelope relies on.
///
/// # Examples
///
/// ```rust
/// use tagwire::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0xFEE8);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        for shift in (0..8).rev() {
            let incoming = u16::from((byte >> shift) & 1);
            let outgoing = crc >> 15;
            crc <<= 1;
            if incoming ^ outgoing != 0 {
                crc ^= POLY;
            }
        }
    }
    crc
}
