//! Bump arena for message-scoped node payloads.
//!
//! A message that is built, sent, and discarded as a unit does not need
//! per-node heap bookkeeping: every payload it owns has exactly the same
//! lifetime.  The [`Arena`] carves payload storage out of one fixed buffer
//! with a moving cursor, and reclaims everything in O(1) when the last
//! owner drops it.  There is deliberately no `free` — released payloads
//! are simply abandoned until the buffer itself goes away.
//!
//! Whether a message routes payloads through an arena or through the
//! general heap is decided once, at message construction, and recorded as
//! an [`Alloc`] that every node under the message inherits.  Mixing the
//! two modes inside one tree is therefore impossible by construction.

use std::cell::{Cell, Ref, RefCell};
use std::ops::Deref;
use std::rc::Rc;

use tracing::warn;

/// A region of an [`Arena`] handed out by [`Arena::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    offset: usize,
    len: usize,
}

impl Span {
    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length region.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A bump allocator over a fixed-size buffer.
///
/// Allocation only ever moves the cursor forward; the entire buffer is
/// released at once when the arena is dropped.  The arena is not
/// synchronized — a message and everything reachable from it belong to
/// one logical owner at a time.
///
/// # Examples
///
/// ```rust
/// use tagwire::Arena;
///
/// let arena = Arena::with_capacity(16);
/// assert!(arena.allocate(10).is_some());
/// assert!(arena.allocate(6).is_some());
/// assert!(arena.allocate(1).is_none(), "capacity exhausted");
/// ```
#[derive(Debug)]
pub struct Arena {
    /// Backing storage, allocated once at construction.
    buf: RefCell<Box<[u8]>>,
    /// Next free offset into `buf`.
    cursor: Cell<usize>,
}

impl Arena {
    /// Creates an arena backed by `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: RefCell::new(vec![0u8; capacity].into_boxed_slice()),
            cursor: Cell::new(0),
        }
    }

    /// Carves `len` bytes out of the remaining capacity.
    ///
    /// Returns `None` when the request would exceed capacity.  The cursor
    /// never moves backwards; there is no way to return a span.
    pub fn allocate(&self, len: usize) -> Option<Span> {
        let offset = self.cursor.get();
        let end = offset.checked_add(len)?;
        if end > self.capacity() {
            return None;
        }
        self.cursor.set(end);
        Some(Span { offset, len })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.borrow().len()
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Copies `bytes` into a previously allocated span.
    pub(crate) fn write(&self, span: Span, bytes: &[u8]) {
        debug_assert_eq!(span.len, bytes.len());
        self.buf.borrow_mut()[span.offset..span.offset + span.len].copy_from_slice(bytes);
    }

    /// Read access to a previously allocated span.
    pub(crate) fn slice(&self, span: Span) -> Ref<'_, [u8]> {
        Ref::map(self.buf.borrow(), |b| &b[span.offset..span.offset + span.len])
    }
}

/// Ownership mode of a message and every node reachable from it.
///
/// Chosen once at [`Message`](crate::Message) construction.  `Heap` nodes
/// each own their payload as a `Vec<u8>`; `Arena` nodes share one
/// reference-counted arena whose backing buffer is freed in a single step
/// when the message (and any copies of the handle) are gone.
#[derive(Debug, Clone, Default)]
pub enum Alloc {
    /// Each payload is an individually owned heap buffer.
    #[default]
    Heap,
    /// All payloads are carved from the shared arena.
    Arena(Rc<Arena>),
}

impl Alloc {
    /// Stores `bytes` according to the ownership mode.
    ///
    /// When the arena cannot satisfy the request the payload falls back to
    /// the heap: the message stays correct, only the single-lifetime
    /// optimization degrades for that one value.
    pub(crate) fn store(&self, bytes: &[u8]) -> Payload {
        if bytes.is_empty() {
            return Payload::Empty;
        }
        match self {
            Alloc::Heap => Payload::Heap(bytes.to_vec()),
            Alloc::Arena(arena) => match arena.allocate(bytes.len()) {
                Some(span) => {
                    arena.write(span, bytes);
                    Payload::Arena {
                        arena: Rc::clone(arena),
                        span,
                    }
                }
                None => {
                    warn!(
                        requested = bytes.len(),
                        remaining = arena.remaining(),
                        "arena exhausted, storing payload on the heap"
                    );
                    Payload::Heap(bytes.to_vec())
                }
            },
        }
    }
}

/// Storage for one variable payload.
///
/// Reads are uniform across modes via [`Payload::bytes`], which yields a
/// `Deref<Target = [u8]>` guard regardless of where the bytes live.
#[derive(Debug, Default)]
pub(crate) enum Payload {
    /// No payload (the `None` variable type).
    #[default]
    Empty,
    /// Individually owned heap buffer.
    Heap(Vec<u8>),
    /// Region of a shared arena.
    Arena { arena: Rc<Arena>, span: Span },
}

impl Payload {
    /// Payload length in bytes.
    pub(crate) fn len(&self) -> usize {
        match self {
            Payload::Empty => 0,
            Payload::Heap(v) => v.len(),
            Payload::Arena { span, .. } => span.len(),
        }
    }

    /// Read guard over the payload bytes.
    pub(crate) fn bytes(&self) -> PayloadBytes<'_> {
        match self {
            Payload::Empty => PayloadBytes::Slice(&[]),
            Payload::Heap(v) => PayloadBytes::Slice(v),
            Payload::Arena { arena, span } => PayloadBytes::Guard(arena.slice(*span)),
        }
    }
}

/// Read guard returned by [`Payload::bytes`].
pub(crate) enum PayloadBytes<'a> {
    Slice(&'a [u8]),
    Guard(Ref<'a, [u8]>),
}

impl Deref for PayloadBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            PayloadBytes::Slice(s) => s,
            PayloadBytes::Guard(g) => g,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_advances_cursor() {
        // Arrange
        let arena = Arena::with_capacity(32);

        // Act
        let a = arena.allocate(10).expect("first allocation must fit");
        let b = arena.allocate(10).expect("second allocation must fit");

        // Assert – spans are disjoint and the cursor reflects both
        assert_ne!(a, b);
        assert_eq!(arena.used(), 20);
        assert_eq!(arena.remaining(), 12);
    }

    #[test]
    fn test_allocate_fails_beyond_capacity() {
        // Arrange
        let arena = Arena::with_capacity(8);
        arena.allocate(6).expect("must fit");

        // Act / Assert – a request past the end returns None and the
        // cursor does not move
        assert!(arena.allocate(3).is_none());
        assert_eq!(arena.used(), 6);
        // A smaller request still succeeds afterwards
        assert!(arena.allocate(2).is_some());
        assert!(arena.allocate(1).is_none());
    }

    #[test]
    fn test_allocate_zero_bytes_succeeds() {
        let arena = Arena::with_capacity(0);
        let span = arena.allocate(0).expect("empty allocation always fits");
        assert!(span.is_empty());
    }

    #[test]
    fn test_write_then_read_round_trips() {
        // Arrange
        let arena = Arena::with_capacity(16);
        let span = arena.allocate(4).unwrap();

        // Act
        arena.write(span, &[1, 2, 3, 4]);

        // Assert
        assert_eq!(&*arena.slice(span), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_alloc_store_falls_back_to_heap_when_exhausted() {
        // Arrange – arena with room for only 2 bytes
        let alloc = Alloc::Arena(Rc::new(Arena::with_capacity(2)));

        // Act
        let fits = alloc.store(&[0xAA, 0xBB]);
        let overflow = alloc.store(&[0xCC, 0xDD, 0xEE]);

        // Assert – both payloads keep their bytes
        assert!(matches!(fits, Payload::Arena { .. }));
        assert!(matches!(overflow, Payload::Heap(_)));
        assert_eq!(&*fits.bytes(), &[0xAA, 0xBB]);
        assert_eq!(&*overflow.bytes(), &[0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn test_heap_and_arena_payloads_read_identically() {
        let heap = Alloc::Heap.store(b"abc");
        let arena = Alloc::Arena(Rc::new(Arena::with_capacity(8))).store(b"abc");
        assert_eq!(&*heap.bytes(), &*arena.bytes());
    }
}
