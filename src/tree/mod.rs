//! The recursive tag/variable tree.
//!
//! A device state snapshot is a tree of [`Tag`] containers whose leaves are
//! typed [`Variable`] values.  Tags and variables draw their identifiers
//! from disjoint numeric ranges so that a wire-level scanner can classify
//! a 2-byte identifier field by range alone.

pub mod tag;
pub mod variable;

pub use tag::{Tag, UpdateOutcome};
pub use variable::{FloatPrecision, VarType, Variable};

/// Smallest valid tag identifier.
pub const TAG_ID_MIN: u16 = 1;
/// Largest valid tag identifier.
pub const TAG_ID_MAX: u16 = 10_000;
/// Largest valid variable identifier (the range starts at 0).
pub const VAR_ID_MAX: u16 = 9_999;

/// One child of a [`Tag`]: either a nested tag or a leaf variable.
///
/// Children of a tag are heterogeneous and keep their insertion order, so
/// a tag's child list interleaves both kinds freely.
#[derive(Debug, PartialEq)]
pub enum Node {
    Tag(Tag),
    Variable(Variable),
}

impl Node {
    /// Identifier of the node, whichever kind it is.
    pub fn id(&self) -> u16 {
        match self {
            Node::Tag(t) => t.id(),
            Node::Variable(v) => v.id(),
        }
    }

    /// Returns `true` when the node is a nested tag.
    pub fn is_tag(&self) -> bool {
        matches!(self, Node::Tag(_))
    }

    /// Returns `true` when the node is a leaf variable.
    pub fn is_var(&self) -> bool {
        matches!(self, Node::Variable(_))
    }

    /// The node as a tag, if it is one.
    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Node::Tag(t) => Some(t),
            Node::Variable(_) => None,
        }
    }

    /// The node as a variable, if it is one.
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Node::Tag(_) => None,
            Node::Variable(v) => Some(v),
        }
    }

    pub(crate) fn as_tag_mut(&mut self) -> Option<&mut Tag> {
        match self {
            Node::Tag(t) => Some(t),
            Node::Variable(_) => None,
        }
    }

    pub(crate) fn as_var_mut(&mut self) -> Option<&mut Variable> {
        match self {
            Node::Tag(_) => None,
            Node::Variable(v) => Some(v),
        }
    }
}
