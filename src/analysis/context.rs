//! Execution contexts: the record of one instruction's single execution.

use std::fmt;

use crate::{
    analysis::{frame::FrameId, value::ValueId},
    program::{InstructionId, StackEffect},
};

/// Identity of an [`ExecutionContext`] inside its [`crate::analysis::ProvenanceGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ContextId(u32);

impl ContextId {
    /// Creates an id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        ContextId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// The pops and pushes of one execution of one instruction.
///
/// `pops` is in pop order: the first entry was the top of the stack. `pushes` is in
/// push order: the last entry ends up on top. For duplication-family instructions the
/// push index is the branch number (0 is the deeper alias, 1 the top one).
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionContext {
    pub(crate) instruction: InstructionId,
    pub(crate) pc: u32,
    pub(crate) mnemonic: &'static str,
    pub(crate) frame: FrameId,
    pub(crate) pops: Vec<ValueId>,
    pub(crate) pushes: Vec<ValueId>,
    pub(crate) duplication: bool,
    pub(crate) live: bool,
}

impl ExecutionContext {
    /// The executed instruction.
    #[must_use]
    pub fn instruction(&self) -> InstructionId {
        self.instruction
    }

    /// Program counter of the executed instruction.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Mnemonic of the executed instruction.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// The frame the instruction executed in.
    #[must_use]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Popped values, top of stack first.
    #[must_use]
    pub fn pops(&self) -> &[ValueId] {
        &self.pops
    }

    /// Pushed values, in push order.
    #[must_use]
    pub fn pushes(&self) -> &[ValueId] {
        &self.pushes
    }

    /// Returns `true` if the instruction belongs to the duplication family.
    #[must_use]
    pub fn is_duplication(&self) -> bool {
        self.duplication
    }

    /// Returns `false` once the context has been detached by a removal.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Returns `true` if the recorded pops and pushes match `effect`.
    #[must_use]
    pub fn matches(&self, effect: StackEffect) -> bool {
        self.pops.len() == usize::from(effect.pops) && self.pushes.len() == usize::from(effect.pushes)
    }
}
