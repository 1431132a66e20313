//! Value nodes: one value occupying one slot of the simulated operand stack.

use std::fmt;

use crate::{
    analysis::context::ContextId,
    program::{Constant, ValueType},
};

/// Identity of a [`ValueNode`] inside its [`crate::analysis::ProvenanceGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueId(u32);

impl ValueId {
    /// Creates an id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        ValueId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What the analysis knows about the runtime value of a node.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum AbstractValue {
    /// Not statically known
    #[default]
    Unknown,
    /// The `null` reference
    Null,
    /// Known `int`
    Int(i32),
    /// Known `long`
    Long(i64),
    /// Known `float`
    Float(f32),
    /// Known `double`
    Double(f64),
    /// Known string literal
    String(String),
    /// Known class literal
    Class(String),
}

impl AbstractValue {
    /// Returns `true` if the value is statically known.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, AbstractValue::Unknown)
    }

    /// The known `int`, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            AbstractValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The known `long`, if any.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            AbstractValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&Constant> for AbstractValue {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => AbstractValue::Int(*v),
            Constant::Long(v) => AbstractValue::Long(*v),
            Constant::Float(v) => AbstractValue::Float(*v),
            Constant::Double(v) => AbstractValue::Double(*v),
            Constant::String(s) => AbstractValue::String(s.clone()),
            Constant::Class(c) => AbstractValue::Class(c.clone()),
        }
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Unknown => write!(f, "?"),
            AbstractValue::Null => write!(f, "null"),
            AbstractValue::Int(v) => write!(f, "{v}"),
            AbstractValue::Long(v) => write!(f, "{v}L"),
            AbstractValue::Float(v) => write!(f, "{v}f"),
            AbstractValue::Double(v) => write!(f, "{v}d"),
            AbstractValue::String(s) => write!(f, "{s:?}"),
            AbstractValue::Class(c) => write!(f, "{c}.class"),
        }
    }
}

/// One value in one stack slot.
///
/// Each node has exactly one producing context and at most one consuming context per
/// linear path; the consumer list only grows beyond one if a removal rewires a
/// duplicate's consumer onto the original. Nodes are never removed from the graph;
/// detaching the producer marks them dead instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueNode {
    pub(crate) ty: ValueType,
    pub(crate) value: AbstractValue,
    pub(crate) pushed_by: ContextId,
    pub(crate) popped_by: Vec<ContextId>,
    pub(crate) live: bool,
}

impl ValueNode {
    pub(crate) fn new(ty: ValueType, value: AbstractValue, pushed_by: ContextId) -> Self {
        ValueNode {
            ty,
            value,
            pushed_by,
            popped_by: Vec::new(),
            live: true,
        }
    }

    /// Semantic type of the value.
    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    /// Abstract value, possibly [`AbstractValue::Unknown`].
    #[must_use]
    pub fn value(&self) -> &AbstractValue {
        &self.value
    }

    /// The context that pushed this node.
    #[must_use]
    pub fn pushed_by(&self) -> ContextId {
        self.pushed_by
    }

    /// Every context that popped this node, live or not.
    #[must_use]
    pub fn popped_by(&self) -> &[ContextId] {
        &self.popped_by
    }

    /// Returns `false` once the producing context has been detached.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }
}
