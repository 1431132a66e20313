//! Method bodies: an ordered, mutable instruction sequence.

use std::collections::HashSet;

use crate::{
    program::instruction::{Instruction, InstructionId, InstructionKind},
    Error, Result,
};

/// The `Code` attribute of a method, reduced to what the analysis needs.
///
/// Instructions keep their position order in a `Vec`; identity is the
/// [`InstructionId`], which is allocated from a monotonically increasing counter so
/// that ids stay valid across [`Code::insert_after`] and [`Code::remove`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Code {
    max_locals: u16,
    instructions: Vec<Instruction>,
    next_id: u32,
}

impl Code {
    /// Creates an empty body with the given number of local slots.
    #[must_use]
    pub fn new(max_locals: u16) -> Self {
        Code {
            max_locals,
            instructions: Vec::new(),
            next_id: 0,
        }
    }

    /// Number of local-variable slots.
    #[must_use]
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    /// Instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterates the instructions in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Looks up an instruction by id.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.position(id).map(|pos| &self.instructions[pos])
    }

    /// Current position of an instruction in the sequence.
    #[must_use]
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        // Ids are not ordered by position once instructions have been inserted
        self.instructions.iter().position(|insn| insn.id() == id)
    }

    /// Returns `true` if the body contains a `goto` or a conditional branch.
    #[must_use]
    pub fn has_branches(&self) -> bool {
        self.instructions
            .iter()
            .any(|insn| matches!(insn.kind(), InstructionKind::Goto(_) | InstructionKind::If(..)))
    }

    /// The pcs that some `goto` or conditional branch of this body jumps to.
    #[must_use]
    pub fn branch_targets(&self) -> HashSet<u32> {
        self.instructions
            .iter()
            .filter_map(|insn| match insn.kind() {
                InstructionKind::Goto(target) | InstructionKind::If(_, target) => Some(*target),
                _ => None,
            })
            .collect()
    }

    /// Appends an instruction, returning its id.
    pub fn push(&mut self, pc: u32, kind: InstructionKind) -> InstructionId {
        let id = self.allocate_id();
        self.instructions.push(Instruction::new(id, pc, kind));
        id
    }

    /// Inserts an instruction directly after `anchor`.
    ///
    /// The new instruction shares the anchor's pc: program counters are reassigned by the
    /// class-file writer, and until then the pc only serves diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstructionNotFound`] if `anchor` is not part of this body.
    pub fn insert_after(
        &mut self,
        anchor: InstructionId,
        kind: InstructionKind,
    ) -> Result<InstructionId> {
        let pos = self
            .position(anchor)
            .ok_or(Error::InstructionNotFound(anchor))?;
        let pc = self.instructions[pos].pc();
        let id = self.allocate_id();
        self.instructions
            .insert(pos + 1, Instruction::new(id, pc, kind));
        Ok(id)
    }

    /// Removes an instruction from the sequence and returns it.
    ///
    /// This is the raw sequence edit. Passes must go through
    /// [`crate::deobfuscation::RemovalProtocol`], which keeps the provenance graph and
    /// the stack discipline intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstructionNotFound`] if `id` is not part of this body.
    pub fn remove(&mut self, id: InstructionId) -> Result<Instruction> {
        let pos = self.position(id).ok_or(Error::InstructionNotFound(id))?;
        Ok(self.instructions.remove(pos))
    }

    fn allocate_id(&mut self) -> InstructionId {
        let id = InstructionId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<'a> IntoIterator for &'a Code {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::instruction::Condition;

    #[test]
    fn test_ids_survive_edits() {
        let mut code = Code::new(0);
        let a = code.push(0, InstructionKind::Nop);
        let b = code.push(1, InstructionKind::AConstNull);
        let c = code.push(2, InstructionKind::Pop);

        let inserted = code.insert_after(a, InstructionKind::Nop).unwrap();
        assert_eq!(code.position(inserted), Some(1));
        assert_eq!(code.get(inserted).unwrap().pc(), 0);
        assert_eq!(code.position(c), Some(3));

        let removed = code.remove(b).unwrap();
        assert_eq!(removed.id(), b);
        assert_eq!(code.len(), 3);
        assert_eq!(code.position(c), Some(2));
        assert!(code.get(b).is_none());

        // Removed ids are never handed out again
        let d = code.push(3, InstructionKind::Nop);
        assert!(d > inserted);
    }

    #[test]
    fn test_branch_targets() {
        let mut code = Code::new(1);
        code.push(0, InstructionKind::Nop);
        assert!(!code.has_branches());
        assert!(code.branch_targets().is_empty());

        code.push(1, InstructionKind::If(Condition::Eq, 7));
        code.push(4, InstructionKind::Goto(8));
        assert!(code.has_branches());
        assert_eq!(code.branch_targets(), HashSet::from([7, 8]));
    }

    #[test]
    fn test_unknown_instruction() {
        let mut code = Code::new(0);
        let missing = InstructionId::new(7);
        assert!(matches!(
            code.remove(missing),
            Err(Error::InstructionNotFound(id)) if id == missing
        ));
        assert!(matches!(
            code.insert_after(missing, InstructionKind::Nop),
            Err(Error::InstructionNotFound(_))
        ));
    }
}
