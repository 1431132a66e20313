//! Dead store elimination on the operand stack.
//!
//! Removes two kinds of instructions whose effect nothing observes:
//!
//! - stores to a local slot that no load in the method ever reads
//! - `pop`/`pop2` of a value that came from a pure producer or a `dup`
//!
//! Each removal goes through the [`RemovalProtocol`], which retires the producers that
//! lose their last consumer: `iconst 1; iconst 2; iadd; istore 3` disappears entirely,
//! `new; dup; invokespecial <init>; astore 1` shrinks to `new; invokespecial <init>`,
//! and a call whose result was stored gets a `pop` instead.
//!
//! # Atomicity
//!
//! The pass edits a staged copy of the method body and re-executes it after every
//! removal, so each removal sees a fresh provenance graph. The staged body replaces
//! the method's code only if every removal succeeded.
//!
//! # Control flow
//!
//! Execution walks a body in sequence order, so values merging from two branches are
//! not modelled. Bodies containing a `goto` or a conditional branch are skipped.

use std::collections::HashSet;

use crate::{
    analysis::{Frame, FrameId, MethodExecution},
    deobfuscation::{
        changes::{EventKind, EventLog},
        context::AnalysisContext,
        pass::DeobfuscationPass,
        removal::{RemovalProtocol, RemovalReport},
    },
    program::{ClassFile, Code, InstructionId, InstructionKind, Method, MethodRef},
    Error, Result,
};

/// Removes unobserved stores and pops.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeadStoreEliminationPass;

impl DeadStoreEliminationPass {
    /// Creates a new dead store elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Finds the first removable instruction of `code`.
    ///
    /// # Arguments
    ///
    /// * `code` - The method body
    /// * `execution` - A fresh execution of exactly this body
    ///
    /// # Returns
    ///
    /// The id of the first dead store or redundant pop, if any.
    #[must_use]
    pub fn find_candidate(code: &Code, execution: &MethodExecution) -> Option<InstructionId> {
        let read: HashSet<u16> = code
            .iter()
            .filter_map(|instruction| match instruction.kind() {
                InstructionKind::Load(local) => Some(local.index),
                _ => None,
            })
            .collect();

        code.iter()
            .find(|instruction| match instruction.kind() {
                InstructionKind::Store(local) => !read.contains(&local.index),
                InstructionKind::Pop | InstructionKind::Pop2 => execution
                    .pops_of(instruction.id())
                    .first()
                    .and_then(|&value| execution.graph().producer(value))
                    .is_some_and(|producer| {
                        producer.is_duplication()
                            || code
                                .get(producer.instruction())
                                .is_some_and(|p| !p.kind().has_side_effects())
                    }),
                _ => false,
            })
            .map(|instruction| instruction.id())
    }

    /// Removes dead stores from a copy of `method`'s body until none is left or
    /// `limit` removals were made.
    ///
    /// # Arguments
    ///
    /// * `owner` - Internal name of the declaring class
    /// * `method` - The method; its code is not modified
    /// * `limit` - Upper bound on protocol invocations
    ///
    /// # Returns
    ///
    /// The rewritten body and one report per removal, or `None` if nothing was
    /// removable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for bodies with branches, otherwise the first
    /// analysis or removal error.
    pub fn eliminate(
        owner: &str,
        method: &Method,
        limit: usize,
    ) -> Result<Option<(Code, Vec<RemovalReport>)>> {
        let Some(code) = method.code.as_ref() else {
            return Ok(None);
        };
        if code.has_branches() {
            return Err(Error::Unsupported(format!(
                "dead store elimination of {} needs straight-line code",
                method.reference(owner)
            )));
        }

        let mut staged = code.clone();
        let mut reports = Vec::new();
        while reports.len() < limit {
            let frame = Frame::for_method(FrameId::new(0), Some(owner), method);
            let mut execution = MethodExecution::run_body(frame, &staged)?;
            let Some(target) = Self::find_candidate(&staged, &execution) else {
                break;
            };
            reports.push(RemovalProtocol::new(&mut staged, &mut execution).remove(target)?);
        }

        if reports.is_empty() {
            Ok(None)
        } else {
            Ok(Some((staged, reports)))
        }
    }

    fn record(
        events: &EventLog,
        method: &MethodRef,
        staged: &Code,
        report: &RemovalReport,
    ) {
        for removed in &report.removed {
            events
                .record(EventKind::InstructionRemoved)
                .at(method, removed.pc())
                .message(removed.kind().to_string());
        }
        for inserted in report.inserted.iter().filter_map(|&id| staged.get(id)) {
            events
                .record(EventKind::InstructionInserted)
                .at(method, inserted.pc())
                .message(inserted.kind().to_string());
        }
    }
}

impl DeobfuscationPass for DeadStoreEliminationPass {
    fn name(&self) -> &'static str {
        "dead-stores"
    }

    fn description(&self) -> &'static str {
        "Removes stores and pops whose values are never observed"
    }

    fn should_run(&self, _class: &ClassFile, method: &Method, _ctx: &AnalysisContext) -> bool {
        method.code.as_ref().is_some_and(|code| !code.has_branches())
    }

    fn run_on_method(
        &self,
        class: &str,
        method: &mut Method,
        ctx: &AnalysisContext,
    ) -> Result<bool> {
        let limit = ctx.config.max_removals_per_method;
        let Some((staged, reports)) = Self::eliminate(class, method, limit)? else {
            return Ok(false);
        };

        let reference = method.reference(class);
        let changes = EventLog::new();
        for report in &reports {
            Self::record(&changes, &reference, &staged, report);
        }
        if reports.len() >= limit {
            changes
                .record(EventKind::Warning)
                .method(&reference)
                .message(format!("stopped after {limit} removals"));
        }

        method.code = Some(staged);
        ctx.mark_modified(&reference);
        ctx.events.merge(changes);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deobfuscation::EngineConfig,
        program::{ClassAccessFlags, CodeAssembler, Condition, Instruction, MethodAccessFlags},
    };

    fn method(descriptor: &str, f: impl FnOnce(&mut CodeAssembler)) -> Method {
        let mut asm = CodeAssembler::new();
        f(&mut asm);
        Method::new("m", descriptor, MethodAccessFlags::STATIC)
            .unwrap()
            .with_code(asm.finish().unwrap())
    }

    fn mnemonics(method: &Method) -> Vec<&'static str> {
        method
            .code
            .as_ref()
            .unwrap()
            .iter()
            .map(Instruction::mnemonic)
            .collect()
    }

    fn run(method: &mut Method) -> (bool, AnalysisContext) {
        let ctx = AnalysisContext::new(EngineConfig::default());
        let changed = DeadStoreEliminationPass::new()
            .run_on_method("test/Dead", method, &ctx)
            .unwrap();
        (changed, ctx)
    }

    #[test]
    fn test_constructor_store_keeps_initialisation() {
        let mut m = method("()V", |asm| {
            asm.new_object("test/Thing")
                .dup()
                .invokespecial("test/Thing", "<init>", "()V")
                .unwrap()
                .astore(0)
                .return_();
        });

        let (changed, ctx) = run(&mut m);

        assert!(changed);
        assert_eq!(mnemonics(&m), vec!["new", "invokespecial", "return"]);
        assert_eq!(ctx.events.count_kind(EventKind::InstructionRemoved), 2);

        let execution = MethodExecution::run(&m).unwrap();
        let code = m.code.as_ref().unwrap();
        let created = execution.pushes_of(code.instructions()[0].id())[0];
        assert_eq!(execution.pops_of(code.instructions()[1].id()), &[created]);
    }

    #[test]
    fn test_pure_expression_disappears() {
        let mut m = method("()V", |asm| {
            asm.iconst(1).iconst(2).iadd().istore(3).return_();
        });

        let (changed, ctx) = run(&mut m);

        assert!(changed);
        assert_eq!(mnemonics(&m), vec!["return"]);
        assert_eq!(ctx.events.stats().instructions_removed, 4);
    }

    #[test]
    fn test_read_locals_are_kept() {
        let mut m = method("()I", |asm| {
            asm.iconst(5).istore(0).iload(0).ireturn();
        });
        let before = m.clone();

        let (changed, ctx) = run(&mut m);

        assert!(!changed);
        assert_eq!(m, before);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_call_result_is_popped() {
        let mut m = method("()V", |asm| {
            asm.invokestatic("test/Util", "next", "()I")
                .unwrap()
                .istore(0)
                .return_();
        });

        let (changed, ctx) = run(&mut m);

        assert!(changed);
        assert_eq!(mnemonics(&m), vec!["invokestatic", "pop", "return"]);
        assert_eq!(ctx.events.count_kind(EventKind::InstructionInserted), 1);

        // Fixpoint: the inserted pop follows a call and stays
        let (changed, _) = run(&mut m);
        assert!(!changed);
    }

    #[test]
    fn test_redundant_dup_pop_pair() {
        let mut m = method("(I)I", |asm| {
            asm.iload(0).dup().pop().ireturn();
        });

        let (changed, _) = run(&mut m);

        assert!(changed);
        assert_eq!(mnemonics(&m), vec!["iload", "ireturn"]);
    }

    #[test]
    fn test_failure_leaves_method_untouched() {
        let mut m = method("()V", |asm| {
            asm.istore(0).return_();
        });
        let before = m.clone();
        let ctx = AnalysisContext::new(EngineConfig::default());

        let err = DeadStoreEliminationPass::new()
            .run_on_method("test/Dead", &mut m, &ctx)
            .unwrap_err();

        assert!(matches!(err, Error::StackUnderflow { .. }));
        assert_eq!(m, before);
    }

    fn conditional_store() -> Method {
        let mut asm = CodeAssembler::new();
        asm.iload(0).if_(Condition::Eq, "else").iconst(1).goto("join");
        asm.label("else").unwrap().iconst(2);
        asm.label("join").unwrap().istore(1).return_();
        Method::new("pick", "(I)V", MethodAccessFlags::STATIC)
            .unwrap()
            .with_code(asm.finish().unwrap())
    }

    #[test]
    fn test_branchy_bodies_are_skipped() {
        let class = ClassFile::new("test/Dead", None, ClassAccessFlags::PUBLIC);
        let ctx = AnalysisContext::new(EngineConfig::default());
        let pass = DeadStoreEliminationPass::new();

        assert!(!pass.should_run(&class, &conditional_store(), &ctx));
        assert!(pass.should_run(
            &class,
            &method("()V", |asm| {
                asm.iconst(1).istore(0).return_();
            }),
            &ctx
        ));
    }

    #[test]
    fn test_branchy_body_is_left_untouched() {
        let mut m = conditional_store();
        let before = m.clone();
        let ctx = AnalysisContext::new(EngineConfig::default());

        let err = DeadStoreEliminationPass::new()
            .run_on_method("test/Dead", &mut m, &ctx)
            .unwrap_err();

        assert!(matches!(err, Error::Unsupported(_)));
        assert_eq!(m, before);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_removal_limit() {
        let mut m = method("()V", |asm| {
            asm.iconst(1).istore(0).iconst(2).istore(1).return_();
        });
        let ctx = AnalysisContext::new(EngineConfig {
            max_removals_per_method: 1,
            ..EngineConfig::default()
        });

        assert!(DeadStoreEliminationPass::new()
            .run_on_method("test/Dead", &mut m, &ctx)
            .unwrap());
        assert_eq!(mnemonics(&m), vec!["ldc", "istore", "return"]);
        assert_eq!(ctx.events.count_kind(EventKind::Warning), 1);
    }
}
