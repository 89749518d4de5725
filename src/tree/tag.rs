//! The recursive tag container and the request/response merge protocol.

use crate::arena::Alloc;
use crate::protocol::codec::{self, WireError};
use crate::tree::variable::{FloatPrecision, Variable};
use crate::tree::Node;

/// Outcome of one `update_*` merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The source asked for the field (empty tag or empty variable); the
    /// caller's value was written into the destination as the answer.
    Requested,
    /// The source supplied a real value; it was copied into the caller's
    /// value and the destination was left untouched.
    Supplied,
    /// The source carries other fields but not this one; nothing happened.
    Unchanged,
}

/// Classification of a field on the source side of a merge.
enum UpdateState<'a> {
    Supplied(&'a Variable),
    Requested,
    Unchanged,
}

/// A named container of nested tags and typed variables.
///
/// Children are heterogeneous and keep insertion order.  Traversal uses
/// plain iterators ([`tags`](Self::tags), [`vars`](Self::vars),
/// [`children`](Self::children)), so any number of traversals can run
/// concurrently over the same tag.
///
/// # Examples
///
/// ```rust
/// use tagwire::Tag;
///
/// let mut device = Tag::new(5);
/// device.add_u8(3, 200);
/// device.add_tag(7).add_str(1, "pump");
/// assert_eq!(device.var(3).unwrap().get_u8(), 200);
/// assert_eq!(device.tag(7).unwrap().var(1).unwrap().get_string(), "pump");
/// ```
#[derive(Debug)]
pub struct Tag {
    id: u16,
    children: Vec<Node>,
    alloc: Alloc,
}

/// Structural equality: identifier plus children in order.  The ownership
/// mode is not part of a tag's value.
impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.children == other.children
    }
}

impl Tag {
    /// Creates an empty heap-owned tag.
    pub fn new(id: u16) -> Self {
        Self::with_alloc(id, Alloc::Heap)
    }

    pub(crate) fn with_alloc(id: u16, alloc: Alloc) -> Self {
        debug_assert!((crate::tree::TAG_ID_MIN..=crate::tree::TAG_ID_MAX).contains(&id));
        Self {
            id,
            children: Vec::new(),
            alloc,
        }
    }

    /// Identifier within the tag range `[1, 10000]`.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// All children in insertion order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Returns `true` for a childless tag — the "empty tag" request marker
    /// of the merge protocol.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Serialized size of this subtree in bytes.
    pub fn encoded_len(&self) -> usize {
        codec::encoded_tag_len(self)
    }

    /// Appends an already-built child tag (used by the wire decoder).
    pub(crate) fn push_tag(&mut self, tag: Tag) {
        self.children.push(Node::Tag(tag));
    }

    /// Appends an already-built child variable (used by the wire decoder).
    pub(crate) fn push_var(&mut self, var: Variable) {
        self.children.push(Node::Variable(var));
    }

    // ── Add family: append unconditionally ───────────────────────────────────

    /// Appends a nested empty tag and returns it for population.
    pub fn add_tag(&mut self, id: u16) -> &mut Tag {
        self.children
            .push(Node::Tag(Tag::with_alloc(id, self.alloc.clone())));
        match self.children.last_mut() {
            Some(Node::Tag(t)) => t,
            _ => unreachable!("just pushed a tag"),
        }
    }

    /// Appends an empty (`None`-typed) variable and returns it.
    pub fn add_var(&mut self, id: u16) -> &mut Variable {
        self.children
            .push(Node::Variable(Variable::with_alloc(id, self.alloc.clone())));
        match self.children.last_mut() {
            Some(Node::Variable(v)) => v,
            _ => unreachable!("just pushed a variable"),
        }
    }

    pub fn add_u8(&mut self, id: u16, value: u8) {
        self.add_var(id).set_u8(value);
    }

    pub fn add_u16(&mut self, id: u16, value: u16) {
        self.add_var(id).set_u16(value);
    }

    pub fn add_u32(&mut self, id: u16, value: u32) {
        self.add_var(id).set_u32(value);
    }

    pub fn add_i8(&mut self, id: u16, value: i8) {
        self.add_var(id).set_i8(value);
    }

    pub fn add_i16(&mut self, id: u16, value: i16) {
        self.add_var(id).set_i16(value);
    }

    pub fn add_i32(&mut self, id: u16, value: i32) {
        self.add_var(id).set_i32(value);
    }

    pub fn add_char(&mut self, id: u16, value: u8) {
        self.add_var(id).set_char(value);
    }

    pub fn add_bool(&mut self, id: u16, value: bool) {
        self.add_var(id).set_bool(value);
    }

    pub fn add_julian(&mut self, id: u16, value: u32) {
        self.add_var(id).set_julian(value);
    }

    pub fn add_float(&mut self, id: u16, value: f64, precision: FloatPrecision) {
        self.add_var(id).set_float(value, precision);
    }

    pub fn add_str(&mut self, id: u16, value: &str) {
        self.add_var(id).set_str(value);
    }

    pub fn add_data(&mut self, id: u16, value: &[u8]) {
        self.add_var(id).set_data(value);
    }

    pub fn add_byte_array(&mut self, id: u16, value: &[u8]) {
        self.add_var(id).set_byte_array(value);
    }

    pub fn add_bool_array(&mut self, id: u16, value: &[bool]) {
        self.add_var(id).set_bool_array(value);
    }

    /// Appends an integer in its shortest unsigned representation.
    pub fn add_unsigned(&mut self, id: u16, value: u32) {
        self.add_var(id).set_unsigned_long(value);
    }

    /// Appends an integer in its shortest representation, preferring
    /// unsigned encodings for small positive values.
    pub fn add_signed(&mut self, id: u16, value: i32) {
        self.add_var(id).set_signed_long(value);
    }

    // ── Modify family: update in place, create when absent ───────────────────

    /// The variable with `id`, created empty when missing.
    pub fn var_or_insert(&mut self, id: u16) -> &mut Variable {
        let index = match self
            .children
            .iter()
            .position(|n| matches!(n, Node::Variable(v) if v.id() == id))
        {
            Some(i) => i,
            None => {
                self.children
                    .push(Node::Variable(Variable::with_alloc(id, self.alloc.clone())));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Node::Variable(v) => v,
            _ => unreachable!("index points at a variable"),
        }
    }

    /// The nested tag with `id`, created empty when missing.
    pub fn tag_or_insert(&mut self, id: u16) -> &mut Tag {
        let index = match self
            .children
            .iter()
            .position(|n| matches!(n, Node::Tag(t) if t.id() == id))
        {
            Some(i) => i,
            None => {
                self.children
                    .push(Node::Tag(Tag::with_alloc(id, self.alloc.clone())));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Node::Tag(t) => t,
            _ => unreachable!("index points at a tag"),
        }
    }

    pub fn set_u8(&mut self, id: u16, value: u8) {
        self.var_or_insert(id).set_u8(value);
    }

    pub fn set_u16(&mut self, id: u16, value: u16) {
        self.var_or_insert(id).set_u16(value);
    }

    pub fn set_u32(&mut self, id: u16, value: u32) {
        self.var_or_insert(id).set_u32(value);
    }

    pub fn set_i8(&mut self, id: u16, value: i8) {
        self.var_or_insert(id).set_i8(value);
    }

    pub fn set_i16(&mut self, id: u16, value: i16) {
        self.var_or_insert(id).set_i16(value);
    }

    pub fn set_i32(&mut self, id: u16, value: i32) {
        self.var_or_insert(id).set_i32(value);
    }

    pub fn set_char(&mut self, id: u16, value: u8) {
        self.var_or_insert(id).set_char(value);
    }

    pub fn set_bool(&mut self, id: u16, value: bool) {
        self.var_or_insert(id).set_bool(value);
    }

    pub fn set_julian(&mut self, id: u16, value: u32) {
        self.var_or_insert(id).set_julian(value);
    }

    pub fn set_float(&mut self, id: u16, value: f64, precision: FloatPrecision) {
        self.var_or_insert(id).set_float(value, precision);
    }

    pub fn set_str(&mut self, id: u16, value: &str) {
        self.var_or_insert(id).set_str(value);
    }

    pub fn set_data(&mut self, id: u16, value: &[u8]) {
        self.var_or_insert(id).set_data(value);
    }

    pub fn set_byte_array(&mut self, id: u16, value: &[u8]) {
        self.var_or_insert(id).set_byte_array(value);
    }

    pub fn set_bool_array(&mut self, id: u16, value: &[bool]) {
        self.var_or_insert(id).set_bool_array(value);
    }

    pub fn set_unsigned(&mut self, id: u16, value: u32) {
        self.var_or_insert(id).set_unsigned_long(value);
    }

    pub fn set_signed(&mut self, id: u16, value: i32) {
        self.var_or_insert(id).set_signed_long(value);
    }

    // ── Traversal and lookup ─────────────────────────────────────────────────

    /// Direct child tags in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.children.iter().filter_map(Node::as_tag)
    }

    /// Direct child variables in insertion order.
    pub fn vars(&self) -> impl Iterator<Item = &Variable> {
        self.children.iter().filter_map(Node::as_var)
    }

    pub fn tags_mut(&mut self) -> impl Iterator<Item = &mut Tag> {
        self.children.iter_mut().filter_map(Node::as_tag_mut)
    }

    pub fn vars_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.children.iter_mut().filter_map(Node::as_var_mut)
    }

    /// First direct child tag with the given identifier.
    pub fn tag(&self, id: u16) -> Option<&Tag> {
        self.tags().find(|t| t.id() == id)
    }

    pub fn tag_mut(&mut self, id: u16) -> Option<&mut Tag> {
        self.tags_mut().find(|t| t.id() == id)
    }

    /// First direct child variable with the given identifier.
    pub fn var(&self, id: u16) -> Option<&Variable> {
        self.vars().find(|v| v.id() == id)
    }

    pub fn var_mut(&mut self, id: u16) -> Option<&mut Variable> {
        self.vars_mut().find(|v| v.id() == id)
    }

    // ── Deep copy ────────────────────────────────────────────────────────────

    /// Copies the subtree by serializing it and re-parsing the bytes.
    ///
    /// The round trip is intentional: a copy is guaranteed to be exactly
    /// what the wire format would reproduce, which a structural clone
    /// would not prove.  The copy is heap-owned; use
    /// [`deep_copy_with`](Self::deep_copy_with) to target an arena.
    pub fn deep_copy(&self) -> Result<Tag, WireError> {
        self.deep_copy_with(&Alloc::Heap)
    }

    /// [`deep_copy`](Self::deep_copy) under an explicit ownership mode.
    pub fn deep_copy_with(&self, alloc: &Alloc) -> Result<Tag, WireError> {
        let mut scratch = Vec::with_capacity(self.encoded_len());
        codec::encode_tag(&mut scratch, self);
        let (copy, _) = codec::decode_tag(&scratch, alloc)?;
        Ok(copy)
    }

    // ── Merge protocol ───────────────────────────────────────────────────────

    /// Classifies field `id` on this (source) tag.
    fn update_state(&self, id: u16) -> UpdateState<'_> {
        match self.var(id) {
            Some(v) if !v.is_none() => UpdateState::Supplied(v),
            Some(_) => UpdateState::Requested,
            None if self.children.is_empty() => UpdateState::Requested,
            None => UpdateState::Unchanged,
        }
    }

    /// One step of the request/response handshake for a `u8` field.
    ///
    /// `self` is the incoming (source) tag, `dest` the reply under
    /// construction, and `value` the caller's in-memory copy of the field.
    /// An empty source tag or a `None`-typed source variable means "tell
    /// me this": the caller's value is written into `dest`.  A populated
    /// source variable means "here it is": the value is copied into
    /// `value` and `dest` stays untouched.
    pub fn update_u8(&self, dest: &mut Tag, id: u16, value: &mut u8) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_u8();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_u8(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_u16(&self, dest: &mut Tag, id: u16, value: &mut u16) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_u16();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_u16(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_u32(&self, dest: &mut Tag, id: u16, value: &mut u32) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_u32();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_u32(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_i16(&self, dest: &mut Tag, id: u16, value: &mut i16) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_i16();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_i16(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_i32(&self, dest: &mut Tag, id: u16, value: &mut i32) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_i32();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_i32(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_bool(&self, dest: &mut Tag, id: u16, value: &mut bool) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_bool();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_bool(id, *value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_str(&self, dest: &mut Tag, id: u16, value: &mut String) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_string();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_str(id, value);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }

    pub fn update_float(
        &self,
        dest: &mut Tag,
        id: u16,
        value: &mut f64,
        precision: FloatPrecision,
    ) -> UpdateOutcome {
        match self.update_state(id) {
            UpdateState::Supplied(v) => {
                *value = v.get_f64();
                UpdateOutcome::Supplied
            }
            UpdateState::Requested => {
                dest.set_float(id, *value, precision);
                UpdateOutcome::Requested
            }
            UpdateState::Unchanged => UpdateOutcome::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::VarType;

    #[test]
    fn test_children_keep_insertion_order_across_kinds() {
        // Arrange
        let mut tag = Tag::new(1);

        // Act – interleave variables and nested tags
        tag.add_u8(10, 1);
        tag.add_tag(20);
        tag.add_str(11, "x");
        tag.add_tag(21);

        // Assert
        let ids: Vec<u16> = tag.children().iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![10, 20, 11, 21]);
        assert_eq!(tag.tags().count(), 2);
        assert_eq!(tag.vars().count(), 2);
    }

    #[test]
    fn test_lookup_finds_first_match_by_id() {
        let mut tag = Tag::new(1);
        tag.add_u8(5, 1);
        tag.add_u8(5, 2); // duplicate id, appended by design

        assert_eq!(tag.var(5).map(|v| v.get_u8()), Some(1));
        assert!(tag.var(6).is_none());
        assert!(tag.tag(5).is_none(), "variable ids do not match tags");
    }

    #[test]
    fn test_add_appends_but_set_modifies_in_place() {
        let mut tag = Tag::new(1);
        tag.add_u8(5, 1);
        tag.add_u8(5, 1);
        assert_eq!(tag.len(), 2);

        tag.set_u8(5, 9);
        assert_eq!(tag.len(), 2, "set must not create another duplicate");
        assert_eq!(tag.var(5).map(|v| v.get_u8()), Some(9));

        tag.set_u16(6, 700);
        assert_eq!(tag.len(), 3, "set creates the variable when absent");
        assert_eq!(tag.var(6).map(|v| v.get_u16()), Some(700));
    }

    #[test]
    fn test_set_can_change_a_variables_type() {
        let mut tag = Tag::new(1);
        tag.set_u8(5, 1);
        tag.set_str(5, "now text");
        assert_eq!(tag.var(5).map(|v| v.get_string()), Some("now text".into()));
        assert_eq!(tag.len(), 1);
    }

    #[test]
    fn test_deep_copy_equals_source_and_is_independent() {
        // Arrange – a nested tree with several value kinds
        let mut src = Tag::new(2);
        src.add_u16(1, 4321);
        src.add_str(2, "sensor");
        let nested = src.add_tag(9);
        nested.add_bool(3, true);
        nested.add_float(4, -2.5, FloatPrecision::One);

        // Act
        let mut copy = src.deep_copy().expect("copy must succeed");

        // Assert – structurally equal, then diverges after mutation
        assert_eq!(copy, src);
        copy.set_u16(1, 1);
        assert_ne!(copy, src);
        assert_eq!(src.var(1).map(|v| v.get_u16()), Some(4321));
    }

    #[test]
    fn test_deep_copy_preserves_child_order_and_types() {
        let mut src = Tag::new(3);
        src.add_tag(8);
        src.add_unsigned(1, 200);
        src.add_tag(9);

        let copy = src.deep_copy().unwrap();
        let ids: Vec<u16> = copy.children().iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![8, 1, 9]);
        assert_eq!(copy.var(1).map(|v| v.var_type()), Some(VarType::U8));
    }

    // ── Merge protocol ───────────────────────────────────────────────────────

    #[test]
    fn test_update_against_empty_tag_writes_request() {
        // An entirely empty source tag means "tell me everything asked".
        let source = Tag::new(4);
        let mut reply = Tag::new(4);
        let mut level = 42u8;

        let outcome = source.update_u8(&mut reply, 7, &mut level);

        assert_eq!(outcome, UpdateOutcome::Requested);
        assert_eq!(level, 42, "caller's value is not overwritten");
        assert_eq!(reply.var(7).map(|v| v.get_u8()), Some(42));
    }

    #[test]
    fn test_update_against_empty_variable_writes_request() {
        let mut source = Tag::new(4);
        source.add_u8(1, 0); // some unrelated populated field
        source.add_var(7); // the empty "tell me this" marker
        let mut reply = Tag::new(4);
        let mut level = 13u8;

        let outcome = source.update_u8(&mut reply, 7, &mut level);

        assert_eq!(outcome, UpdateOutcome::Requested);
        assert_eq!(reply.var(7).map(|v| v.get_u8()), Some(13));
    }

    #[test]
    fn test_update_against_populated_variable_reads_value_out() {
        let mut source = Tag::new(4);
        source.add_u8(7, 99);
        let mut reply = Tag::new(4);
        let mut level = 0u8;

        let outcome = source.update_u8(&mut reply, 7, &mut level);

        assert_eq!(outcome, UpdateOutcome::Supplied);
        assert_eq!(level, 99);
        assert!(reply.is_empty(), "destination must stay untouched");
    }

    #[test]
    fn test_update_missing_field_on_nonempty_tag_does_nothing() {
        let mut source = Tag::new(4);
        source.add_u8(1, 5); // tag is not empty, field 7 simply absent
        let mut reply = Tag::new(4);
        let mut level = 8u8;

        let outcome = source.update_u8(&mut reply, 7, &mut level);

        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(level, 8);
        assert!(reply.is_empty());
    }

    #[test]
    fn test_update_is_idempotent_against_populated_source() {
        let mut source = Tag::new(4);
        source.add_u16(7, 1000);
        let mut dest = Tag::new(4);
        let mut value = 0u16;

        assert_eq!(source.update_u16(&mut dest, 7, &mut value), UpdateOutcome::Supplied);
        let after_first = dest.deep_copy().unwrap();
        assert_eq!(source.update_u16(&mut dest, 7, &mut value), UpdateOutcome::Supplied);

        assert_eq!(dest, after_first, "second merge must be a no-op on dest");
        assert_eq!(value, 1000);
    }

    #[test]
    fn test_update_str_and_float_variants() {
        let mut source = Tag::new(4);
        source.add_str(1, "running");
        source.add_float(2, 3.25, FloatPrecision::Two);
        let mut reply = Tag::new(4);

        let mut state = String::new();
        let mut temp = 0.0f64;
        assert_eq!(source.update_str(&mut reply, 1, &mut state), UpdateOutcome::Supplied);
        assert_eq!(
            source.update_float(&mut reply, 2, &mut temp, FloatPrecision::Two),
            UpdateOutcome::Supplied
        );

        assert_eq!(state, "running");
        assert!((temp - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_request_then_fill_then_read_back_handshake() {
        // Requester side: emit an empty variable meaning "tell me field 7".
        let mut request = Tag::new(4);
        request.add_var(7);

        // Responder side: its current value fills the reply.
        let mut reply = Tag::new(4);
        let mut responder_value = 55u8;
        assert_eq!(
            request.update_u8(&mut reply, 7, &mut responder_value),
            UpdateOutcome::Requested
        );

        // Requester side again: the reply supplies the value.
        let mut requester_value = 0u8;
        let mut scratch = Tag::new(4);
        assert_eq!(
            reply.update_u8(&mut scratch, 7, &mut requester_value),
            UpdateOutcome::Supplied
        );
        assert_eq!(requester_value, 55);
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_tag_or_insert_reuses_existing_subtree() {
        let mut tag = Tag::new(1);
        tag.add_tag(9).add_u8(1, 1);
        tag.tag_or_insert(9).add_u8(2, 2);

        assert_eq!(tag.tags().count(), 1);
        assert_eq!(tag.tag(9).map(Tag::len), Some(2));
    }
}
