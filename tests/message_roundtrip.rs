//! Integration tests for the tagwire protocol core.
//!
//! These tests drive the public API end to end: building tag trees,
//! encoding complete messages, decoding them back, corrupting them on the
//! simulated wire, and running the request/response merge protocol across
//! two endpoints.

use tagwire::{crc16, FloatPrecision, Message, Tag, UpdateOutcome, VarType, WireError};

const SIG: u32 = 0x1234_5678;

/// Encodes a message and decodes it again, asserting the tag trees match
/// under structural equality.
fn roundtrip(msg: &Message) -> Message {
    let bytes = msg.encode(SIG);
    let decoded = Message::decode(SIG, &bytes).expect("decode must succeed");
    assert_eq!(decoded.tags(), msg.tags());
    decoded
}

/// A representative device-state snapshot exercising every value family.
fn device_snapshot() -> Message {
    let mut msg = Message::new();
    let device = msg.add_tag(100);
    device.add_u8(1, 200);
    device.add_u16(2, 40_000);
    device.add_u32(3, 3_000_000_000);
    device.add_i8(4, -5);
    device.add_i16(5, -30_000);
    device.add_i32(6, -2_000_000_000);
    device.add_char(7, b'A');
    device.add_bool(8, true);
    device.add_julian(9, 2_460_000);
    device.add_float(10, -12.34, FloatPrecision::Two);
    device.add_str(11, "boiler room 3");
    device.add_str(12, &"long ".repeat(40));
    device.add_data(13, &[0xDE, 0xAD, 0xBE, 0xEF]);
    device.add_byte_array(14, &[0x55; 32]);
    device.add_bool_array(15, &[true, false, true, true, false, false, true, false, true]);
    device.add_var(16); // empty request marker travels as the None type

    let channel = device.add_tag(200);
    channel.add_unsigned(1, 65_000);
    channel.add_signed(2, 200);
    let nested = channel.add_tag(201);
    nested.add_float(1, 0.0001, FloatPrecision::Four);
    msg
}

#[test]
fn test_roundtrip_full_device_snapshot() {
    roundtrip(&device_snapshot());
}

#[test]
fn test_roundtrip_preserves_types_ids_and_payloads_in_order() {
    let decoded = roundtrip(&device_snapshot());
    let device = decoded.tag(100).expect("top-level tag must survive");

    assert_eq!(device.var(1).map(|v| v.var_type()), Some(VarType::U8));
    assert_eq!(device.var(1).map(|v| v.get_u8()), Some(200));
    assert_eq!(device.var(10).map(|v| v.get_string()), Some("-12.34".into()));
    assert!(device.var(16).map(|v| v.is_none()).unwrap_or(false));

    let channel = device.tag(200).expect("nested tag must survive");
    // Shortest-representation choices survive the wire unchanged.
    assert_eq!(channel.var(1).map(|v| v.var_type()), Some(VarType::U16));
    assert_eq!(channel.var(2).map(|v| v.var_type()), Some(VarType::U8));
    assert_eq!(
        channel.tag(201).and_then(|t| t.var(1)).map(|v| v.get_scaled(FloatPrecision::Four)),
        Some(1)
    );
}

#[test]
fn test_roundtrip_under_arena_ownership() {
    let src = device_snapshot();
    let bytes = src.encode(SIG);

    let decoded = Message::decode_with_arena(SIG, &bytes, 4096).expect("decode must succeed");

    assert_eq!(decoded.tags(), src.tags());
    let arena = decoded.arena().expect("arena mode must keep its arena");
    assert!(arena.used() > 0, "payloads must be carved from the arena");
}

#[test]
fn test_golden_vector_from_framing_rules() {
    // Signature 0x12345678, one tag id 5 holding one U8 variable id 3
    // with value 200.  Every byte below is derived from the framing
    // rules; the CRC of the 8-byte payload is 0x48A8.
    let mut msg = Message::new();
    msg.add_tag(5).add_u8(3, 200);

    let bytes = msg.encode(SIG);

    #[rustfmt::skip]
    let expected = [
        0x78, 0x56, 0x34, 0x12,             // signature, little-endian
        0x08, 0x00,                         // payload length
        0x06, 0x00,                         // tag id 5 + 1
        0x34, 0x75,                         // variable id 3 + 30001
        0x84, 0xC8,                         // U8 type byte, value 200
        0xFF, 0xFF,                         // end of children
        0xA8, 0x48,                         // CRC-16/0x8005 of the payload
    ];
    assert_eq!(bytes, expected);
    assert_eq!(crc16(&bytes[6..14]), 0x48A8);
}

#[test]
fn test_every_single_bit_flip_in_the_payload_is_detected() {
    let bytes = device_snapshot().encode(SIG);
    let payload_start = 6;
    let payload_end = bytes.len() - 2;

    for byte in payload_start..payload_end {
        for bit in 0..8 {
            let mut corrupted = bytes.clone();
            corrupted[byte] ^= 1 << bit;
            let err = Message::decode(SIG, &corrupted)
                .expect_err("corrupted payload must not decode");
            assert!(
                matches!(err, WireError::ChecksumMismatch { .. }),
                "byte {byte} bit {bit}: expected checksum mismatch, got {err:?}"
            );
        }
    }
}

#[test]
fn test_deep_copy_equals_wire_reproduction() {
    let msg = device_snapshot();
    let original = msg.tag(100).unwrap();

    let copy = original.deep_copy().expect("copy must succeed");

    // The copy contract: identical to what encode-then-decode yields.
    let rebuilt = roundtrip(&msg);
    assert_eq!(&copy, rebuilt.tag(100).unwrap());
}

#[test]
fn test_request_response_exchange_over_the_wire() {
    // Requester: a tag with two empty variables means "tell me fields 1
    // and 2".
    let mut request = Message::new();
    let req_tag = request.add_tag(100);
    req_tag.add_var(1);
    req_tag.add_var(2);
    let request_bytes = request.encode(SIG);

    // Responder: decodes the request and fills a reply from its state.
    let incoming = Message::decode(SIG, &request_bytes).unwrap();
    let mut reply = Message::new();
    let reply_tag = reply.add_tag(100);
    let mut temperature = 2150u16; // responder state, hundredths of a degree
    let mut running = true;
    let source = incoming.tag(100).unwrap();
    assert_eq!(
        source.update_u16(reply_tag, 1, &mut temperature),
        UpdateOutcome::Requested
    );
    assert_eq!(
        source.update_bool(reply_tag, 2, &mut running),
        UpdateOutcome::Requested
    );
    let reply_bytes = reply.encode(SIG);

    // Requester: decodes the reply and reads the supplied values out.
    let incoming_reply = Message::decode(SIG, &reply_bytes).unwrap();
    let mut got_temperature = 0u16;
    let mut got_running = false;
    let mut scratch = Tag::new(100);
    let filled = incoming_reply.tag(100).unwrap();
    assert_eq!(
        filled.update_u16(&mut scratch, 1, &mut got_temperature),
        UpdateOutcome::Supplied
    );
    assert_eq!(
        filled.update_bool(&mut scratch, 2, &mut got_running),
        UpdateOutcome::Supplied
    );

    assert_eq!(got_temperature, 2150);
    assert!(got_running);
    assert!(scratch.is_empty(), "reading back must not emit new requests");
}

#[test]
fn test_decode_never_exposes_a_partial_tree() {
    // Two valid tags, then re-frame the second one with a bad child
    // identifier while keeping the checksum consistent, so the failure
    // happens mid-parse rather than at the integrity check.
    let mut msg = Message::new();
    msg.add_tag(1).add_u8(0, 1);
    msg.add_tag(2).add_u8(0, 2);
    let mut bytes = msg.encode(SIG);

    // The second tag's variable id field starts 8 bytes into its frame;
    // overwrite it with 20000 (no man's land) and fix up the checksum.
    let payload_start = 6;
    let second_var_id = payload_start + 8 + 2;
    bytes[second_var_id] = 0x20;
    bytes[second_var_id + 1] = 0x4E;
    let payload_end = bytes.len() - 2;
    let crc = crc16(&bytes[payload_start..payload_end]);
    bytes[payload_end..].copy_from_slice(&crc.to_le_bytes());

    let err = Message::decode(SIG, &bytes).expect_err("malformed child must abort");
    assert_eq!(err, WireError::IdOutOfRange(20_000));
}

#[test]
fn test_signature_is_checked_before_anything_else() {
    let bytes = device_snapshot().encode(SIG);
    assert!(matches!(
        Message::decode(0x0BAD_CAFE, &bytes),
        Err(WireError::SignatureMismatch { .. })
    ));
}

#[test]
fn test_encoded_size_query_allows_exact_preallocation() {
    let msg = device_snapshot();
    let mut buf = Vec::new();
    let written = msg.encode_into(SIG, &mut buf);
    assert_eq!(written, msg.encoded_size());
    assert_eq!(buf.len(), msg.encoded_size());
}
