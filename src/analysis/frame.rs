//! The simulated frame: operand stack and local-variable slots of one method analysis.
//!
//! The operand stack can only be mutated through an [`InstructionStep`], which is opened
//! by [`Frame::begin`] for one instruction and records every pop and push into that
//! instruction's [`crate::analysis::ExecutionContext`] as it happens. Because the raw
//! `push`/`pop` of [`Stack`] are private to this module, a stack mutation that is not
//! mirrored in the provenance graph cannot be written.

use std::fmt;

use crate::{
    analysis::{
        context::ContextId,
        graph::ProvenanceGraph,
        value::{AbstractValue, ValueId, ValueNode},
    },
    program::{Instruction, Method, ValueType},
    Error, Result,
};

/// Identity of a [`Frame`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FrameId(u32);

impl FrameId {
    /// Creates an id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        FrameId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame{}", self.0)
    }
}

/// The simulated operand stack. Holds value ids; the nodes live in the graph.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    values: Vec<ValueId>,
}

impl Stack {
    fn push(&mut self, value: ValueId) {
        self.values.push(value);
    }

    fn pop(&mut self) -> Option<ValueId> {
        self.values.pop()
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value `depth` entries below the top (0 is the top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<ValueId> {
        self.values
            .len()
            .checked_sub(depth + 1)
            .map(|pos| self.values[pos])
    }

    /// Stack contents, bottom first.
    #[must_use]
    pub fn snapshot(&self) -> &[ValueId] {
        &self.values
    }
}

/// Content of one local-variable slot.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalSlot {
    /// Type of the stored value
    pub ty: ValueType,
    /// Abstract value of the stored value
    pub value: AbstractValue,
    /// The node that was stored, `None` for parameters
    pub stored_from: Option<ValueId>,
}

impl LocalSlot {
    /// A slot holding an unknown value of type `ty`, as seeded for parameters.
    #[must_use]
    pub fn unknown(ty: ValueType) -> Self {
        LocalSlot {
            ty,
            value: AbstractValue::Unknown,
            stored_from: None,
        }
    }
}

/// Operand stack and locals for one linear pass through a method.
///
/// Created once per method analysis and discarded afterwards.
#[derive(Clone, Debug)]
pub struct Frame {
    id: FrameId,
    stack: Stack,
    locals: Vec<Option<LocalSlot>>,
}

impl Frame {
    /// Creates a frame with `max_locals` empty slots.
    #[must_use]
    pub fn new(id: FrameId, max_locals: u16) -> Self {
        Frame {
            id,
            stack: Stack::default(),
            locals: vec![None; usize::from(max_locals)],
        }
    }

    /// Creates a frame for `method`, seeding `this` (for instance methods, typed as
    /// `owner`) and the parameters from the descriptor.
    ///
    /// Category-2 parameters take two slots; the second one stays empty.
    #[must_use]
    pub fn for_method(id: FrameId, owner: Option<&str>, method: &Method) -> Self {
        let receiver = u16::from(!method.is_static());
        let needed = method.signature().param_slots() + receiver;
        let max_locals = method
            .code
            .as_ref()
            .map_or(needed, |code| code.max_locals().max(needed));

        let mut frame = Frame::new(id, max_locals);
        let mut slot = 0usize;
        if !method.is_static() {
            let this = ValueType::reference(owner.unwrap_or("java/lang/Object"));
            frame.locals[slot] = Some(LocalSlot::unknown(this));
            slot += 1;
        }
        for param in &method.signature().params {
            frame.locals[slot] = Some(LocalSlot::unknown(param.clone()));
            slot += usize::from(param.slots());
        }
        frame
    }

    /// Frame identity.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The operand stack.
    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// The content of local slot `index`, if it holds a value.
    #[must_use]
    pub fn local(&self, index: u16) -> Option<&LocalSlot> {
        self.locals.get(usize::from(index)).and_then(Option::as_ref)
    }

    /// Opens the execution of `instruction`, recording a new context for it.
    pub fn begin<'a>(
        &'a mut self,
        graph: &'a mut ProvenanceGraph,
        instruction: &Instruction,
    ) -> InstructionStep<'a> {
        let context = graph.begin_context(instruction, self.id);
        InstructionStep {
            frame: self,
            graph,
            context,
            pc: instruction.pc(),
            mnemonic: instruction.mnemonic(),
        }
    }
}

/// The execution of one instruction in progress.
///
/// Every pop and push goes to the stack and to the instruction's context at the same
/// time.
pub struct InstructionStep<'a> {
    frame: &'a mut Frame,
    graph: &'a mut ProvenanceGraph,
    context: ContextId,
    pc: u32,
    mnemonic: &'static str,
}

impl InstructionStep<'_> {
    /// The context being recorded.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Pops the top of the stack into the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<ValueId> {
        let value = self.frame.stack.pop().ok_or(Error::StackUnderflow {
            pc: self.pc,
            mnemonic: self.mnemonic,
        })?;
        self.graph.record_pop(self.context, value);
        Ok(value)
    }

    /// Allocates a node produced by the context and pushes it.
    pub fn push(&mut self, ty: ValueType, value: AbstractValue) -> ValueId {
        let id = self.graph.record_push(self.context, ty, value);
        self.frame.stack.push(id);
        id
    }

    /// Reads a node, typically one that was just popped.
    #[must_use]
    pub fn value(&self, id: ValueId) -> Option<&ValueNode> {
        self.graph.value(id)
    }

    /// The value `depth` entries below the top, without popping it.
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&ValueNode> {
        self.frame
            .stack
            .peek(depth)
            .and_then(|id| self.graph.value(id))
    }

    /// The content of local slot `index`.
    #[must_use]
    pub fn local(&self, index: u16) -> Option<&LocalSlot> {
        self.frame.local(index)
    }

    /// Writes local slot `index`.
    ///
    /// A category-2 value also clears the following slot, and overwriting the second
    /// half of a category-2 value clears the first half.
    pub fn store_local(&mut self, index: u16, slot: LocalSlot) {
        let pos = usize::from(index);
        let needed = pos + usize::from(slot.ty.slots());
        if self.frame.locals.len() < needed {
            self.frame.locals.resize(needed, None);
        }

        if pos > 0 {
            let previous = &mut self.frame.locals[pos - 1];
            if previous.as_ref().is_some_and(|p| p.ty.is_wide()) {
                *previous = None;
            }
        }
        if slot.ty.is_wide() {
            self.frame.locals[pos + 1] = None;
        }
        self.frame.locals[pos] = Some(slot);
    }

    /// Closes the step, returning the recorded context.
    #[must_use]
    pub fn finish(self) -> ContextId {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{InstructionId, InstructionKind, MethodAccessFlags};

    #[test]
    fn test_for_method_seeds_parameters() {
        let method = Method::new("m", "(JI)V", MethodAccessFlags::PUBLIC).unwrap();
        let frame = Frame::for_method(FrameId::new(0), Some("a/B"), &method);

        assert_eq!(frame.local(0).unwrap().ty, ValueType::reference("a/B"));
        assert_eq!(frame.local(1).unwrap().ty, ValueType::Long);
        assert!(frame.local(2).is_none());
        assert_eq!(frame.local(3).unwrap().ty, ValueType::Int);
        assert!(frame.stack().is_empty());
    }

    #[test]
    fn test_step_mirrors_stack() {
        let mut graph = ProvenanceGraph::new();
        let mut frame = Frame::new(FrameId::new(0), 0);
        let insn = Instruction::new(InstructionId::new(0), 0, InstructionKind::Dup);

        let mut step = frame.begin(&mut graph, &insn);
        let a = step.push(ValueType::Int, AbstractValue::Int(1));
        let b = step.push(ValueType::Int, AbstractValue::Int(2));
        assert_eq!(step.pop().unwrap(), b);
        let ctx = step.finish();

        assert_eq!(frame.stack().snapshot(), &[a]);
        let context = graph.context(ctx).unwrap();
        assert_eq!(context.pushes(), &[a, b]);
        assert_eq!(context.pops(), &[b]);
        assert!(context.is_duplication());
    }

    #[test]
    fn test_underflow() {
        let mut graph = ProvenanceGraph::new();
        let mut frame = Frame::new(FrameId::new(0), 0);
        let insn = Instruction::new(InstructionId::new(0), 7, InstructionKind::Pop);

        let mut step = frame.begin(&mut graph, &insn);
        assert!(matches!(
            step.pop(),
            Err(Error::StackUnderflow { pc: 7, mnemonic: "pop" })
        ));
    }

    #[test]
    fn test_wide_store_invalidates_neighbours() {
        let mut graph = ProvenanceGraph::new();
        let mut frame = Frame::new(FrameId::new(0), 4);
        let insn = Instruction::new(InstructionId::new(0), 0, InstructionKind::Nop);

        let mut step = frame.begin(&mut graph, &insn);
        step.store_local(2, LocalSlot::unknown(ValueType::Int));
        step.store_local(1, LocalSlot::unknown(ValueType::Long));
        assert!(step.local(2).is_none());
        step.store_local(2, LocalSlot::unknown(ValueType::Float));
        assert!(step.local(1).is_none());
        assert_eq!(step.local(2).unwrap().ty, ValueType::Float);
    }
}
