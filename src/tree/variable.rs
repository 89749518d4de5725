//! Typed leaf values and their encoding rules.
//!
//! A [`Variable`] carries one value in wire-ready form: the payload bytes
//! held by the node are exactly the bytes that travel after the type tag.
//! Setters pick the representation (including the "shortest representation"
//! policy for integers), getters convert best-effort from whatever is
//! stored to whatever the caller asks for, saturating instead of wrapping.

use crate::arena::{Alloc, Payload, PayloadBytes};

/// Longest string the type byte itself can describe (see [`VarType::ShortString`]).
pub const SHORT_STRING_MAX_LEN: usize = 127;
/// Largest accepted logical element count for a bit-packed boolean array.
pub const BOOL_ARRAY_MAX_LEN: usize = 2039;
/// Largest accepted byte array payload.
pub const BYTE_ARRAY_MAX_LEN: usize = 255;

// ── Type tags ─────────────────────────────────────────────────────────────────

/// Wire type tag of a [`Variable`].
///
/// Short strings are special: for a string of 0–127 bytes the type byte
/// itself carries the length (wire values 0x00–0x7F) and no separate length
/// field is emitted.  All other tags occupy 0x80–0x93.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// No value; the empty/request marker of the merge protocol.
    None,
    S8,
    S16,
    S32,
    U8,
    U16,
    U32,
    /// Single-byte character.
    Char,
    /// 32-bit signed integer scaled by 10 (one implied decimal digit).
    Float1,
    /// Scaled by 100.
    Float2,
    /// Scaled by 1 000.
    Float3,
    /// Scaled by 10 000.
    Float4,
    /// Opaque 32-bit Julian date value; no arithmetic semantics here.
    Julian,
    Bool,
    /// Bit-packed boolean array, 8 logical elements per byte.
    BoolArray,
    /// Raw byte array, at most [`BYTE_ARRAY_MAX_LEN`] bytes.
    ByteArray,
    /// Length-prefixed binary, 1-byte length.
    Data8,
    /// Length-prefixed binary, 2-byte length.
    Data16,
    /// Length-prefixed string with trailing NUL, 1-byte length.
    String8,
    /// Length-prefixed string with trailing NUL, 2-byte length.
    String16,
    /// String of 0–127 bytes whose length is the type byte itself.
    ShortString(u8),
}

/// Width of the explicit length field a type carries on the wire, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LenPrefix {
    One,
    Two,
}

impl VarType {
    /// The byte this type occupies on the wire.
    pub fn wire_byte(self) -> u8 {
        match self {
            VarType::ShortString(len) => {
                debug_assert!(len as usize <= SHORT_STRING_MAX_LEN);
                len
            }
            VarType::None => 0x80,
            VarType::S8 => 0x81,
            VarType::S16 => 0x82,
            VarType::S32 => 0x83,
            VarType::U8 => 0x84,
            VarType::U16 => 0x85,
            VarType::U32 => 0x86,
            VarType::Char => 0x87,
            VarType::Float1 => 0x88,
            VarType::Float2 => 0x89,
            VarType::Float3 => 0x8A,
            VarType::Float4 => 0x8B,
            VarType::Julian => 0x8C,
            VarType::Bool => 0x8D,
            VarType::BoolArray => 0x8E,
            VarType::ByteArray => 0x8F,
            VarType::Data8 => 0x90,
            VarType::Data16 => 0x91,
            VarType::String8 => 0x92,
            VarType::String16 => 0x93,
        }
    }

    /// Inverse of [`wire_byte`](Self::wire_byte); `None` for 0x94–0xFF.
    pub fn from_wire(byte: u8) -> Option<VarType> {
        match byte {
            0x00..=0x7F => Some(VarType::ShortString(byte)),
            0x80 => Some(VarType::None),
            0x81 => Some(VarType::S8),
            0x82 => Some(VarType::S16),
            0x83 => Some(VarType::S32),
            0x84 => Some(VarType::U8),
            0x85 => Some(VarType::U16),
            0x86 => Some(VarType::U32),
            0x87 => Some(VarType::Char),
            0x88 => Some(VarType::Float1),
            0x89 => Some(VarType::Float2),
            0x8A => Some(VarType::Float3),
            0x8B => Some(VarType::Float4),
            0x8C => Some(VarType::Julian),
            0x8D => Some(VarType::Bool),
            0x8E => Some(VarType::BoolArray),
            0x8F => Some(VarType::ByteArray),
            0x90 => Some(VarType::Data8),
            0x91 => Some(VarType::Data16),
            0x92 => Some(VarType::String8),
            0x93 => Some(VarType::String16),
            _ => None,
        }
    }

    /// Payload size in bytes when the type is fixed-width.
    pub(crate) fn fixed_len(self) -> Option<usize> {
        match self {
            VarType::None => Some(0),
            VarType::S8 | VarType::U8 | VarType::Char | VarType::Bool => Some(1),
            VarType::S16 | VarType::U16 => Some(2),
            VarType::S32
            | VarType::U32
            | VarType::Float1
            | VarType::Float2
            | VarType::Float3
            | VarType::Float4
            | VarType::Julian => Some(4),
            VarType::ShortString(len) => Some(len as usize),
            _ => None,
        }
    }

    /// The explicit length field this type carries on the wire, if any.
    pub(crate) fn length_prefix(self) -> Option<LenPrefix> {
        match self {
            VarType::BoolArray | VarType::ByteArray | VarType::Data8 | VarType::String8 => {
                Some(LenPrefix::One)
            }
            VarType::Data16 | VarType::String16 => Some(LenPrefix::Two),
            _ => None,
        }
    }

    /// Returns `true` for the three string representations.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            VarType::String8 | VarType::String16 | VarType::ShortString(_)
        )
    }
}

// ── Fixed-point precision ─────────────────────────────────────────────────────

/// Implied decimal scaling of the four fixed-point "float" types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPrecision {
    /// One decimal digit (raw value scaled by 10).
    One,
    /// Two decimal digits (scaled by 100).
    Two,
    /// Three decimal digits (scaled by 1 000).
    Three,
    /// Four decimal digits (scaled by 10 000).
    Four,
}

impl FloatPrecision {
    /// Number of implied decimal digits.
    pub fn decimals(self) -> u32 {
        match self {
            FloatPrecision::One => 1,
            FloatPrecision::Two => 2,
            FloatPrecision::Three => 3,
            FloatPrecision::Four => 4,
        }
    }

    /// Scale factor (10^decimals).
    pub fn scale(self) -> i64 {
        10i64.pow(self.decimals())
    }

    /// The corresponding wire type.
    pub fn var_type(self) -> VarType {
        match self {
            FloatPrecision::One => VarType::Float1,
            FloatPrecision::Two => VarType::Float2,
            FloatPrecision::Three => VarType::Float3,
            FloatPrecision::Four => VarType::Float4,
        }
    }

    /// Precision of a float type, `None` for everything else.
    pub fn from_var_type(ty: VarType) -> Option<FloatPrecision> {
        match ty {
            VarType::Float1 => Some(FloatPrecision::One),
            VarType::Float2 => Some(FloatPrecision::Two),
            VarType::Float3 => Some(FloatPrecision::Three),
            VarType::Float4 => Some(FloatPrecision::Four),
            _ => None,
        }
    }
}

// ── Variable ──────────────────────────────────────────────────────────────────

/// A typed leaf node: identifier, type tag, and wire-ready payload bytes.
///
/// Every setter releases the previous payload, records the new type, and
/// routes storage through the owning allocator (arena when the enclosing
/// message has one, heap otherwise).  The formatted string form of the
/// value is cached until the next mutation.
#[derive(Debug)]
pub struct Variable {
    id: u16,
    ty: VarType,
    payload: Payload,
    alloc: Alloc,
    text_cache: Option<String>,
}

/// Structural equality: identifier, type, and payload bytes.  The
/// ownership mode and the string cache are not part of a variable's value.
impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.ty == other.ty && *self.payload.bytes() == *other.payload.bytes()
    }
}

impl Variable {
    /// Creates an empty (`None`-typed) heap-owned variable.
    pub fn new(id: u16) -> Self {
        Self::with_alloc(id, Alloc::Heap)
    }

    pub(crate) fn with_alloc(id: u16, alloc: Alloc) -> Self {
        debug_assert!(id <= crate::tree::VAR_ID_MAX);
        Self {
            id,
            ty: VarType::None,
            payload: Payload::Empty,
            alloc,
            text_cache: None,
        }
    }

    /// Rebuilds a variable from decoded wire fields.
    pub(crate) fn from_wire(id: u16, ty: VarType, bytes: &[u8], alloc: &Alloc) -> Self {
        Self {
            id,
            ty,
            payload: alloc.store(bytes),
            alloc: alloc.clone(),
            text_cache: None,
        }
    }

    /// Identifier within the variable range `[0, 9999]`.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Current type tag.
    pub fn var_type(&self) -> VarType {
        self.ty
    }

    /// Payload length in bytes (0 for the `None` type).
    pub fn size(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Returns `true` when the variable carries no value — the "empty
    /// variable" request marker of the merge protocol.
    pub fn is_none(&self) -> bool {
        self.ty == VarType::None
    }

    pub(crate) fn payload_bytes(&self) -> PayloadBytes<'_> {
        self.payload.bytes()
    }

    /// Releases the previous payload and stores a new one.
    fn store(&mut self, ty: VarType, bytes: &[u8]) {
        self.ty = ty;
        self.payload = self.alloc.store(bytes);
        self.text_cache = None;
    }

    // ── Exact-width setters ──────────────────────────────────────────────────

    /// Clears the value back to the `None` type.
    pub fn set_none(&mut self) {
        self.store(VarType::None, &[]);
    }

    pub fn set_u8(&mut self, value: u8) {
        self.store(VarType::U8, &[value]);
    }

    pub fn set_u16(&mut self, value: u16) {
        self.store(VarType::U16, &value.to_le_bytes());
    }

    pub fn set_u32(&mut self, value: u32) {
        self.store(VarType::U32, &value.to_le_bytes());
    }

    pub fn set_i8(&mut self, value: i8) {
        self.store(VarType::S8, &value.to_le_bytes());
    }

    pub fn set_i16(&mut self, value: i16) {
        self.store(VarType::S16, &value.to_le_bytes());
    }

    pub fn set_i32(&mut self, value: i32) {
        self.store(VarType::S32, &value.to_le_bytes());
    }

    /// Stores a single-byte character.
    pub fn set_char(&mut self, value: u8) {
        self.store(VarType::Char, &[value]);
    }

    pub fn set_bool(&mut self, value: bool) {
        self.store(VarType::Bool, &[u8::from(value)]);
    }

    /// Stores an opaque 32-bit Julian date value.
    pub fn set_julian(&mut self, value: u32) {
        self.store(VarType::Julian, &value.to_le_bytes());
    }

    // ── Shortest-representation setters ──────────────────────────────────────

    /// Stores `value` in the smallest unsigned type that holds it (8 or 16 bit).
    pub fn set_unsigned_short(&mut self, value: u16) {
        if value <= u8::MAX as u16 {
            self.set_u8(value as u8);
        } else {
            self.set_u16(value);
        }
    }

    /// Stores `value` in the smallest unsigned type that holds it.
    pub fn set_unsigned_long(&mut self, value: u32) {
        if value <= u8::MAX as u32 {
            self.set_u8(value as u8);
        } else if value <= u16::MAX as u32 {
            self.set_u16(value as u16);
        } else {
            self.set_u32(value);
        }
    }

    /// Stores `value` in the smallest type that holds it without loss.
    ///
    /// Positive values just past a signed range take the unsigned type of
    /// the same width instead of the next wider signed type: 200 is stored
    /// as U8, not S16.  Receivers depend on this exact promotion order.
    pub fn set_signed_short(&mut self, value: i16) {
        if (i8::MIN as i16..=i8::MAX as i16).contains(&value) {
            self.set_i8(value as i8);
        } else if (0..=u8::MAX as i16).contains(&value) {
            self.set_u8(value as u8);
        } else {
            self.set_i16(value);
        }
    }

    /// 32-bit variant of [`set_signed_short`](Self::set_signed_short) with
    /// the same unsigned-preference promotion order.
    pub fn set_signed_long(&mut self, value: i32) {
        if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
            self.set_i8(value as i8);
        } else if (0..=u8::MAX as i32).contains(&value) {
            self.set_u8(value as u8);
        } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
            self.set_i16(value as i16);
        } else if (0..=u16::MAX as i32).contains(&value) {
            self.set_u16(value as u16);
        } else {
            self.set_i32(value);
        }
    }

    // ── Fixed-point setters ──────────────────────────────────────────────────

    /// Stores a decimal value at the given precision, saturating at the
    /// 32-bit signed range of the scaled representation.
    pub fn set_float(&mut self, value: f64, precision: FloatPrecision) {
        // `as` saturates on overflow and maps NaN to 0.
        let raw = (value * precision.scale() as f64).round() as i32;
        self.set_scaled(raw, precision);
    }

    /// Stores an already-scaled raw value at the given precision.
    pub fn set_scaled(&mut self, raw: i32, precision: FloatPrecision) {
        self.store(precision.var_type(), &raw.to_le_bytes());
    }

    // ── String / binary setters ──────────────────────────────────────────────

    /// Stores a string in its shortest representation.
    ///
    /// Up to 127 bytes the length lives in the type byte itself and no
    /// terminator is stored; longer strings become `String8`/`String16`
    /// with an explicit length that counts the trailing NUL.  Text past
    /// the `String16` limit is truncated.
    pub fn set_str(&mut self, value: &str) {
        let bytes = value.as_bytes();
        if bytes.len() <= SHORT_STRING_MAX_LEN {
            self.store(VarType::ShortString(bytes.len() as u8), bytes);
            return;
        }
        let text = &bytes[..bytes.len().min(u16::MAX as usize - 1)];
        let mut framed = Vec::with_capacity(text.len() + 1);
        framed.extend_from_slice(text);
        framed.push(0);
        if framed.len() <= u8::MAX as usize {
            self.store(VarType::String8, &framed);
        } else {
            self.store(VarType::String16, &framed);
        }
    }

    /// Stores length-prefixed binary data in its shortest representation.
    /// Data past the `Data16` limit is ignored (no state change).
    pub fn set_data(&mut self, value: &[u8]) {
        if value.len() <= u8::MAX as usize {
            self.store(VarType::Data8, value);
        } else if value.len() <= u16::MAX as usize {
            self.store(VarType::Data16, value);
        }
    }

    /// Stores a raw byte array of at most [`BYTE_ARRAY_MAX_LEN`] bytes.
    /// An oversized array is ignored: no state change, no error.
    pub fn set_byte_array(&mut self, value: &[u8]) {
        if value.len() > BYTE_ARRAY_MAX_LEN {
            return;
        }
        self.store(VarType::ByteArray, value);
    }

    /// Stores a bit-packed boolean array of at most [`BOOL_ARRAY_MAX_LEN`]
    /// logical elements.  Within a byte the first element occupies the
    /// most significant bit.  An oversized array is ignored.
    pub fn set_bool_array(&mut self, value: &[bool]) {
        if value.len() > BOOL_ARRAY_MAX_LEN {
            return;
        }
        let mut packed = vec![0u8; value.len().div_ceil(8)];
        for (i, &bit) in value.iter().enumerate() {
            if bit {
                packed[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        self.store(VarType::BoolArray, &packed);
    }

    // ── Getters ──────────────────────────────────────────────────────────────

    pub fn get_u8(&self) -> u8 {
        self.integral_value().clamp(0, u8::MAX as i64) as u8
    }

    pub fn get_u16(&self) -> u16 {
        self.integral_value().clamp(0, u16::MAX as i64) as u16
    }

    pub fn get_u32(&self) -> u32 {
        self.integral_value().clamp(0, u32::MAX as i64) as u32
    }

    pub fn get_i8(&self) -> i8 {
        self.integral_value().clamp(i8::MIN as i64, i8::MAX as i64) as i8
    }

    pub fn get_i16(&self) -> i16 {
        self.integral_value().clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }

    pub fn get_i32(&self) -> i32 {
        self.integral_value().clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// The value as a single-byte character.
    pub fn get_char(&self) -> u8 {
        self.get_u8()
    }

    /// The opaque Julian date value.
    pub fn get_julian(&self) -> u32 {
        self.get_u32()
    }

    /// Boolean coercion: stored strings are truthy when their first
    /// character is one of `t`, `T`, `y`, `Y`, `1`; everything else is
    /// truthy when it converts to a nonzero integer.
    pub fn get_bool(&self) -> bool {
        if self.ty.is_text() {
            matches!(self.text().chars().next(), Some('t' | 'T' | 'y' | 'Y' | '1'))
        } else {
            self.integral_value() != 0
        }
    }

    /// The value as a decimal number, unscaling float types and parsing
    /// stored strings.
    pub fn get_f64(&self) -> f64 {
        if let Some(precision) = FloatPrecision::from_var_type(self.ty) {
            return self.raw_scaled() as f64 / precision.scale() as f64;
        }
        if self.ty.is_text() {
            return self.text().trim().parse().unwrap_or(0.0);
        }
        self.integral_value() as f64
    }

    /// The value as a scaled fixed-point integer at the requested
    /// precision, rescaling by powers of ten and saturating at the 32-bit
    /// signed range.
    pub fn get_scaled(&self, precision: FloatPrecision) -> i32 {
        let raw = if let Some(stored) = FloatPrecision::from_var_type(self.ty) {
            rescale(self.raw_scaled(), stored.decimals(), precision.decimals())
        } else if self.ty.is_text() {
            (self.get_f64() * precision.scale() as f64).round() as i64
        } else {
            self.integral_value().saturating_mul(precision.scale())
        };
        raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// The formatted string form of the value, without caching.
    ///
    /// Float types are formatted with their implied number of decimal
    /// places; binary array types have no text form and yield `""`.
    pub fn get_string(&self) -> String {
        if self.ty.is_text() {
            return self.text();
        }
        match self.ty {
            VarType::None => String::new(),
            VarType::Bool => if self.get_bool() { "1" } else { "0" }.to_string(),
            VarType::Char => (self.get_char() as char).to_string(),
            VarType::Float1 | VarType::Float2 | VarType::Float3 | VarType::Float4 => {
                // from_var_type is total over the four float tags
                let precision = FloatPrecision::from_var_type(self.ty)
                    .map_or(0, |p| p.decimals()) as usize;
                format!("{:.precision$}", self.get_f64())
            }
            VarType::BoolArray | VarType::ByteArray | VarType::Data8 | VarType::Data16 => {
                String::new()
            }
            _ => self.integral_value().to_string(),
        }
    }

    /// Cached form of [`get_string`](Self::get_string).  The cache lives
    /// until the next mutation.
    pub fn as_str(&mut self) -> &str {
        if self.text_cache.is_none() {
            self.text_cache = Some(self.get_string());
        }
        self.text_cache.as_deref().unwrap_or("")
    }

    /// A copy of the raw payload bytes as stored.
    pub fn get_bytes(&self) -> Vec<u8> {
        self.payload.bytes().to_vec()
    }

    /// One logical element of a bit-packed boolean array; `false` out of
    /// range or for non-array types.
    pub fn bool_at(&self, index: usize) -> bool {
        if self.ty != VarType::BoolArray {
            return false;
        }
        let bytes = self.payload.bytes();
        match bytes.get(index / 8) {
            Some(byte) => (byte >> (7 - (index % 8))) & 1 == 1,
            None => false,
        }
    }

    // ── Conversion internals ─────────────────────────────────────────────────

    /// The stored value as an integer: float types are unscaled
    /// (truncating), text is parsed, arrays count as 0.
    fn integral_value(&self) -> i64 {
        if let Some(precision) = FloatPrecision::from_var_type(self.ty) {
            return self.raw_scaled() / precision.scale();
        }
        if self.ty.is_text() {
            let text = self.text();
            let trimmed = text.trim();
            return trimmed
                .parse::<i64>()
                .unwrap_or_else(|_| trimmed.parse::<f64>().unwrap_or(0.0) as i64);
        }
        let bytes = self.payload.bytes();
        match (self.ty, &*bytes) {
            (VarType::U8, &[b]) => b as i64,
            (VarType::S8, &[b]) => b as i8 as i64,
            (VarType::Char, &[b]) => b as i64,
            (VarType::Bool, &[b]) => i64::from(b != 0),
            (VarType::U16, &[a, b]) => u16::from_le_bytes([a, b]) as i64,
            (VarType::S16, &[a, b]) => i16::from_le_bytes([a, b]) as i64,
            (VarType::U32, &[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]) as i64,
            (VarType::S32, &[a, b, c, d]) => i32::from_le_bytes([a, b, c, d]) as i64,
            (VarType::Julian, &[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]) as i64,
            _ => 0,
        }
    }

    /// Raw scaled integer of a float payload.
    fn raw_scaled(&self) -> i64 {
        let bytes = self.payload.bytes();
        match &*bytes {
            &[a, b, c, d] => i32::from_le_bytes([a, b, c, d]) as i64,
            _ => 0,
        }
    }

    /// Text content of a string payload, trailing NUL stripped.
    fn text(&self) -> String {
        let guard = self.payload.bytes();
        let bytes: &[u8] = &guard;
        let content = match self.ty {
            VarType::String8 | VarType::String16 => bytes.strip_suffix(&[0]).unwrap_or(bytes),
            _ => bytes,
        };
        String::from_utf8_lossy(content).into_owned()
    }
}

/// Moves a scaled value between decimal precisions, saturating upward.
fn rescale(raw: i64, from: u32, to: u32) -> i64 {
    if to >= from {
        raw.saturating_mul(10i64.pow(to - from))
    } else {
        raw / 10i64.pow(from - to)
    }
}
