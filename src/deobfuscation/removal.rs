//! Cooperative instruction removal.
//!
//! Deleting one instruction from a stack-machine body can strand the values it consumed:
//! their producers now push something nobody pops. [`RemovalProtocol`] deletes the
//! requested instruction and then asks each stranded producer, through
//! [`RemovalProtocol::prepare_removal`], how it wants to be retired:
//!
//! - pure producers are removed as well, and the cascade continues into their operands;
//! - a `dup` whose other alias is still consumed collapses into nothing, its survivor's
//!   consumers taking the original value directly;
//! - producers with side effects stay and get a `pop` (or `pop2`) right after them.
//!
//! Instructions that a branch jumps to are never deleted: the protocol reports
//! [`Error::BranchTarget`] instead.
//!
//! The provenance graph of the [`MethodExecution`] is updated in step with the code, so a
//! body can go through several removals without being re-executed, although the
//! passes in this crate re-execute between removals anyway.

use std::collections::HashSet;

use crate::{
    analysis::{MethodExecution, ValueId},
    program::{Code, Instruction, InstructionId, InstructionKind},
    Error, Result,
};

/// Outcome of the variant-specific pre-removal hook.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RemovalDecision {
    /// The instruction has no special needs; the generic removal logic applies.
    ContinueDefaultRemoval,
    /// The hook already rewrote the code and graph; the cascade stops here.
    AlreadyHandled,
}

/// What one call to [`RemovalProtocol::remove`] changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemovalReport {
    /// Instructions deleted from the body, in deletion order.
    pub removed: Vec<Instruction>,
    /// Ids of the `pop`/`pop2` instructions inserted behind side-effecting producers.
    pub inserted: Vec<InstructionId>,
}

impl RemovalReport {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }

    /// Ids of the removed instructions.
    pub fn removed_ids(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.removed.iter().map(Instruction::id)
    }
}

/// Removes instructions from one method body while keeping its provenance graph
/// consistent.
///
/// # Examples
///
/// ```rust
/// use classdeob::{
///     analysis::MethodExecution,
///     deobfuscation::RemovalProtocol,
///     program::{CodeAssembler, Method, MethodAccessFlags},
/// };
///
/// let mut asm = CodeAssembler::new();
/// asm.iconst(1).iconst(2).iadd().istore(1).return_();
/// let method = Method::new("f", "()V", MethodAccessFlags::STATIC)?.with_code(asm.finish()?);
///
/// let mut code = method.code.clone().unwrap_or_default();
/// let mut execution = MethodExecution::run(&method)?;
/// let store = code.instructions()[3].id();
///
/// let report = RemovalProtocol::new(&mut code, &mut execution).remove(store)?;
/// assert_eq!(report.removed.len(), 4);
/// assert_eq!(code.len(), 1);
/// # Ok::<(), classdeob::Error>(())
/// ```
pub struct RemovalProtocol<'a> {
    code: &'a mut Code,
    execution: &'a mut MethodExecution,
    branch_targets: HashSet<u32>,
    report: RemovalReport,
}

impl<'a> RemovalProtocol<'a> {
    /// Creates a protocol over `code` and the execution that was computed for it.
    pub fn new(code: &'a mut Code, execution: &'a mut MethodExecution) -> Self {
        let branch_targets = code.branch_targets();
        Self {
            code,
            execution,
            branch_targets,
            report: RemovalReport::default(),
        }
    }

    /// Removes `instruction` and retires every producer that loses its last consumer
    /// as a consequence.
    ///
    /// The instruction itself always takes the default path: none of its pushed values
    /// may still be consumed.
    ///
    /// # Arguments
    ///
    /// * `instruction` - Id of the instruction to delete
    ///
    /// # Returns
    ///
    /// A [`RemovalReport`] covering this call only.
    ///
    /// # Errors
    ///
    /// - [`Error::InstructionNotFound`] if `instruction` is not in the body
    /// - [`Error::IllegalRemoval`] if a value it pushed still has a live consumer
    /// - [`Error::BranchTarget`] if it, or a producer the cascade reaches, is the
    ///   destination of a branch
    /// - [`Error::ContractViolation`] if the graph and the code disagree
    ///
    /// On error the code and graph may be partially rewritten; callers work on a
    /// staged copy.
    pub fn remove(&mut self, instruction: InstructionId) -> Result<RemovalReport> {
        self.remove_default(instruction)?;
        Ok(std::mem::take(&mut self.report))
    }

    /// The variant-specific hook, called for a producer whose pushed value `released`
    /// just lost its last live consumer.
    ///
    /// # Returns
    ///
    /// [`RemovalDecision::AlreadyHandled`] if the hook rewrote the body itself (dup
    /// collapse, inserted `pop`), otherwise
    /// [`RemovalDecision::ContinueDefaultRemoval`].
    ///
    /// # Errors
    ///
    /// - [`Error::InstructionNotFound`] if `instruction` is not in the body
    /// - [`Error::ContractViolation`] if `released` was not pushed by `instruction`
    /// - [`Error::BranchTarget`] if a `dup` to collapse is the destination of a branch
    pub fn prepare_removal(
        &mut self,
        instruction: InstructionId,
        released: ValueId,
    ) -> Result<RemovalDecision> {
        let instruction = self
            .code
            .get(instruction)
            .cloned()
            .ok_or(Error::InstructionNotFound(instruction))?;

        if let Some(duplication) = instruction.as_duplication() {
            let graph = self.execution.graph();
            let original = duplication.original(graph, released)?;
            let survivor = duplication.other_branch(graph, released)?;
            if !graph.has_live_consumers(survivor) {
                return Ok(RemovalDecision::ContinueDefaultRemoval);
            }
            self.check_not_branch_target(&instruction)?;

            let dup_ctx = graph
                .value(released)
                .map(|node| node.pushed_by())
                .ok_or_else(|| contract_violation!("{} is not in the graph", released))?;
            let consumers = graph.live_consumers(survivor);

            let graph = self.execution.graph_mut();
            for consumer in consumers {
                graph.substitute_pop(consumer, survivor, original)?;
            }
            graph.detach(dup_ctx);

            let removed = self.code.remove(instruction.id())?;
            self.report.removed.push(removed);
            return Ok(RemovalDecision::AlreadyHandled);
        }

        if instruction.kind().has_side_effects() {
            let wide = self
                .execution
                .graph()
                .value(released)
                .is_some_and(|node| node.value_type().is_wide());
            let discard = if wide {
                InstructionKind::Pop2
            } else {
                InstructionKind::Pop
            };

            let id = self.code.insert_after(instruction.id(), discard)?;
            let inserted = self
                .code
                .get(id)
                .cloned()
                .ok_or(Error::InstructionNotFound(id))?;
            self.execution.record_inserted(&inserted, &[released]);
            self.report.inserted.push(id);
            return Ok(RemovalDecision::AlreadyHandled);
        }

        Ok(RemovalDecision::ContinueDefaultRemoval)
    }

    fn check_not_branch_target(&self, instruction: &Instruction) -> Result<()> {
        if self.branch_targets.contains(&instruction.pc()) {
            return Err(Error::BranchTarget {
                pc: instruction.pc(),
                mnemonic: instruction.mnemonic(),
            });
        }
        Ok(())
    }

    fn remove_default(&mut self, id: InstructionId) -> Result<()> {
        let instruction = self.code.get(id).ok_or(Error::InstructionNotFound(id))?;
        self.check_not_branch_target(instruction)?;
        let (pc, mnemonic) = (instruction.pc(), instruction.mnemonic());

        let contexts: Vec<_> = self.execution.contexts_of(id).to_vec();
        let graph = self.execution.graph();
        let live_consumers: usize = contexts
            .iter()
            .filter_map(|&ctx| graph.context(ctx))
            .filter(|ctx| ctx.is_live())
            .flat_map(|ctx| ctx.pushes())
            .map(|&value| graph.live_consumers(value).len())
            .sum();
        if live_consumers > 0 {
            return Err(Error::IllegalRemoval {
                pc,
                mnemonic,
                live_consumers,
            });
        }

        let mut released = Vec::new();
        for ctx in contexts {
            if self.execution.graph().context(ctx).is_some_and(|c| c.is_live()) {
                released.extend(self.execution.graph_mut().detach(ctx));
            }
        }

        let removed = self.code.remove(id)?;
        self.report.removed.push(removed);

        for value in released {
            self.release(value)?;
        }
        Ok(())
    }

    /// Retires the producer of `value` if nothing consumes it any more.
    fn release(&mut self, value: ValueId) -> Result<()> {
        let graph = self.execution.graph();
        if graph.has_live_consumers(value) {
            return Ok(());
        }
        let Some(producer) = graph.producer(value).filter(|ctx| ctx.is_live()) else {
            return Ok(());
        };
        let producer = producer.instruction();

        match self.prepare_removal(producer, value)? {
            RemovalDecision::ContinueDefaultRemoval => self.remove_default(producer),
            RemovalDecision::AlreadyHandled => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::MethodExecution,
        program::{CodeAssembler, Method, MethodAccessFlags},
    };

    fn build(f: impl FnOnce(&mut CodeAssembler)) -> (Code, MethodExecution) {
        let mut asm = CodeAssembler::new();
        f(&mut asm);
        let method = Method::new("m", "()V", MethodAccessFlags::STATIC)
            .unwrap()
            .with_code(asm.finish().unwrap());
        let execution = MethodExecution::run(&method).unwrap();
        (method.code.unwrap(), execution)
    }

    fn mnemonics(code: &Code) -> Vec<&'static str> {
        code.iter().map(Instruction::mnemonic).collect()
    }

    fn id_at(code: &Code, index: usize) -> InstructionId {
        code.instructions()[index].id()
    }

    #[test]
    fn test_remove_cascades_into_pure_producers() {
        let (mut code, mut execution) = build(|asm| {
            asm.iconst(1).iconst(2).iadd().istore(0).return_();
        });
        let store = id_at(&code, 3);

        let report = RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap();

        assert_eq!(mnemonics(&code), vec!["return"]);
        assert_eq!(report.removed.len(), 4);
        assert!(report.inserted.is_empty());
        assert!(execution.graph().check_consistency().is_ok());
    }

    #[test]
    fn test_remove_rejects_consumed_values() {
        let (mut code, mut execution) = build(|asm| {
            asm.iconst(1).istore(0).return_();
        });
        let constant = id_at(&code, 0);

        let err = RemovalProtocol::new(&mut code, &mut execution)
            .remove(constant)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::IllegalRemoval {
                live_consumers: 1,
                ..
            }
        ));
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_remove_keeps_branch_targets() {
        let (mut code, mut execution) = build(|asm| {
            asm.iconst(1).goto("store");
            asm.label("store").unwrap().istore(0).return_();
        });
        let before = code.clone();
        let store = id_at(&code, 2);

        let err = RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::BranchTarget {
                pc: 4,
                mnemonic: "istore"
            }
        ));
        assert_eq!(code, before);
    }

    #[test]
    fn test_cascade_stops_at_branch_target() {
        let (mut code, mut execution) = build(|asm| {
            asm.goto("value");
            asm.label("value").unwrap().iconst(1).istore(0).return_();
        });
        let store = id_at(&code, 2);

        let err = RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap_err();

        assert!(matches!(err, Error::BranchTarget { pc: 3, .. }));
    }

    #[test]
    fn test_side_effecting_producer_gets_pop() {
        let (mut code, mut execution) = build(|asm| {
            asm.invokestatic("a/Util", "next", "()I")
                .unwrap()
                .istore(0)
                .return_();
        });
        let store = id_at(&code, 1);

        let report = RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap();

        assert_eq!(mnemonics(&code), vec!["invokestatic", "pop", "return"]);
        assert_eq!(report.inserted, vec![id_at(&code, 1)]);

        let call_value = execution.pushes_of(id_at(&code, 0))[0];
        let consumers = execution.graph().live_consumers(call_value);
        assert_eq!(consumers.len(), 1);
        let consumer = execution.graph().context(consumers[0]).unwrap();
        assert_eq!(consumer.mnemonic(), "pop");
        assert!(execution.graph().check_consistency().is_ok());
    }

    #[test]
    fn test_wide_side_effecting_producer_gets_pop2() {
        let (mut code, mut execution) = build(|asm| {
            asm.invokestatic("a/Util", "time", "()J")
                .unwrap()
                .lstore(0)
                .return_();
        });
        let store = id_at(&code, 1);

        RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap();

        assert_eq!(mnemonics(&code), vec!["invokestatic", "pop2", "return"]);
    }

    #[test]
    fn test_dup_collapses_when_other_alias_is_consumed() {
        let (mut code, mut execution) = build(|asm| {
            asm.new_object("a/Thing")
                .dup()
                .invokespecial("a/Thing", "<init>", "()V")
                .unwrap()
                .astore(0)
                .return_();
        });
        let new = id_at(&code, 0);
        let init = id_at(&code, 2);
        let store = id_at(&code, 3);

        let report = RemovalProtocol::new(&mut code, &mut execution)
            .remove(store)
            .unwrap();

        assert_eq!(mnemonics(&code), vec!["new", "invokespecial", "return"]);
        assert_eq!(report.removed.len(), 2);

        let created = execution.pushes_of(new)[0];
        assert_eq!(execution.pops_of(init), &[created]);
        assert_eq!(execution.graph().resolve_origin(created), created);
        assert!(execution.graph().check_consistency().is_ok());
    }

    #[test]
    fn test_dup_with_both_aliases_dead_cascades() {
        let (mut code, mut execution) = build(|asm| {
            asm.iconst(7).dup().pop().istore(0).return_();
        });
        let pop = id_at(&code, 2);
        let store = id_at(&code, 3);

        let mut protocol = RemovalProtocol::new(&mut code, &mut execution);
        let first = protocol.remove(pop).unwrap();
        assert_eq!(first.removed.len(), 2);
        let second = protocol.remove(store).unwrap();
        assert_eq!(second.removed.len(), 2);

        assert_eq!(mnemonics(&code), vec!["return"]);
    }

    #[test]
    fn test_unknown_instruction() {
        let (mut code, mut execution) = build(|asm| {
            asm.return_();
        });

        let err = RemovalProtocol::new(&mut code, &mut execution)
            .remove(InstructionId::new(99))
            .unwrap_err();
        assert!(matches!(err, Error::InstructionNotFound(_)));
    }

    #[test]
    fn test_prepare_removal_rejects_foreign_value_for_dup() {
        let (mut code, mut execution) = build(|asm| {
            asm.iconst(1).dup().iadd().istore(0).return_();
        });
        let dup = id_at(&code, 1);
        let foreign = execution.pushes_of(id_at(&code, 2))[0];

        let err = RemovalProtocol::new(&mut code, &mut execution)
            .prepare_removal(dup, foreign)
            .unwrap_err();
        assert!(matches!(err, Error::ContractViolation { .. }));
    }
}
