//! Driving instructions through a frame: per method and per program.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    analysis::{
        context::ContextId,
        frame::{Frame, FrameId},
        graph::ProvenanceGraph,
        value::ValueId,
    },
    deobfuscation::{EngineConfig, EventKind, EventLog},
    program::{Code, Instruction, InstructionId, Method, MethodRef, Program},
    Result,
};

/// The result of abstractly executing one method body.
///
/// Owns the provenance graph and the frame of the analysis, and remembers which
/// contexts each instruction produced. The linear walk executes every instruction once;
/// contexts recorded later by the removal protocol are appended to the same index.
#[derive(Clone, Debug)]
pub struct MethodExecution {
    graph: ProvenanceGraph,
    frame: Frame,
    contexts: HashMap<InstructionId, Vec<ContextId>>,
}

impl MethodExecution {
    /// Executes a method whose owner is not known; `this` is typed as
    /// `java/lang/Object`.
    ///
    /// # Errors
    ///
    /// Propagates the first error of [`Instruction::execute`].
    pub fn run(method: &Method) -> Result<Self> {
        Self::run_for(None, method)
    }

    /// Executes a method declared by `owner`.
    ///
    /// Methods without code produce an empty execution.
    ///
    /// # Errors
    ///
    /// Propagates the first error of [`Instruction::execute`].
    pub fn run_for(owner: Option<&str>, method: &Method) -> Result<Self> {
        let frame = Frame::for_method(FrameId::new(0), owner, method);
        match &method.code {
            Some(code) => Self::run_body(frame, code),
            None => Ok(MethodExecution {
                graph: ProvenanceGraph::new(),
                frame,
                contexts: HashMap::new(),
            }),
        }
    }

    /// Executes `code` in a prepared frame.
    ///
    /// # Errors
    ///
    /// Propagates the first error of [`Instruction::execute`].
    pub fn run_body(mut frame: Frame, code: &Code) -> Result<Self> {
        let mut graph = ProvenanceGraph::new();
        let mut contexts: HashMap<InstructionId, Vec<ContextId>> =
            HashMap::with_capacity(code.len());

        for instruction in code {
            let ctx = instruction.execute(&mut frame, &mut graph)?;
            contexts.entry(instruction.id()).or_default().push(ctx);
        }

        Ok(MethodExecution {
            graph,
            frame,
            contexts,
        })
    }

    /// The provenance graph.
    #[must_use]
    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut ProvenanceGraph {
        &mut self.graph
    }

    /// The frame after the last instruction.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Every context recorded for `instruction`.
    #[must_use]
    pub fn contexts_of(&self, instruction: InstructionId) -> &[ContextId] {
        self.contexts
            .get(&instruction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first context recorded for `instruction`.
    #[must_use]
    pub fn context_of(&self, instruction: InstructionId) -> Option<ContextId> {
        self.contexts_of(instruction).first().copied()
    }

    /// The values pushed by the first context of `instruction`.
    #[must_use]
    pub fn pushes_of(&self, instruction: InstructionId) -> &[ValueId] {
        self.context_of(instruction)
            .and_then(|ctx| self.graph.context(ctx))
            .map(|ctx| ctx.pushes())
            .unwrap_or(&[])
    }

    /// The values popped by the first context of `instruction`.
    #[must_use]
    pub fn pops_of(&self, instruction: InstructionId) -> &[ValueId] {
        self.context_of(instruction)
            .and_then(|ctx| self.graph.context(ctx))
            .map(|ctx| ctx.pops())
            .unwrap_or(&[])
    }

    /// Records a context for an instruction inserted after the walk, popping `consumed`
    /// (top first) and pushing nothing.
    pub(crate) fn record_inserted(
        &mut self,
        instruction: &Instruction,
        consumed: &[ValueId],
    ) -> ContextId {
        let ctx = self.graph.begin_context(instruction, self.frame.id());
        for &value in consumed {
            self.graph.record_pop(ctx, value);
        }
        self.contexts.entry(instruction.id()).or_default().push(ctx);
        ctx
    }
}

/// The executions of every method with code in a program.
#[derive(Debug, Default)]
pub struct ProgramExecution {
    methods: HashMap<MethodRef, MethodExecution>,
    skipped: Vec<MethodRef>,
}

impl ProgramExecution {
    /// Executes every method body of `program`, in parallel when `config.parallel` is
    /// set.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to analyse
    /// * `config` - Controls parallelism and error tolerance
    /// * `events` - Receives a `Warning` for every method that could not be analysed
    ///
    /// # Errors
    ///
    /// Returns the first per-method error unless `config.continue_on_error` is set, in
    /// which case failing methods are skipped.
    pub fn run(program: &Program, config: &EngineConfig, events: &EventLog) -> Result<Self> {
        let targets: Vec<_> = program
            .classes()
            .iter()
            .flat_map(|class| {
                class
                    .methods
                    .iter()
                    .filter(|method| method.code.is_some())
                    .map(move |method| (class.name(), method))
            })
            .collect();

        let analyse = |&(owner, method): &(&str, &Method)| {
            (
                method.reference(owner),
                MethodExecution::run_for(Some(owner), method),
            )
        };
        let results: Vec<_> = if config.parallel {
            targets.par_iter().map(analyse).collect()
        } else {
            targets.iter().map(analyse).collect()
        };

        let mut execution = ProgramExecution::default();
        for (method, result) in results {
            match result {
                Ok(method_execution) => {
                    execution.methods.insert(method, method_execution);
                }
                Err(e) if config.continue_on_error => {
                    events
                        .record(EventKind::Warning)
                        .method(&method)
                        .message(format!("analysis skipped: {e}"));
                    execution.skipped.push(method);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(execution)
    }

    /// The execution of `method`, if it was analysed.
    #[must_use]
    pub fn method(&self, method: &MethodRef) -> Option<&MethodExecution> {
        self.methods.get(method)
    }

    /// Iterates the analysed methods.
    pub fn iter(&self) -> impl Iterator<Item = (&MethodRef, &MethodExecution)> {
        self.methods.iter()
    }

    /// Number of analysed methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if no method was analysed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Methods whose analysis failed and was skipped.
    #[must_use]
    pub fn skipped(&self) -> &[MethodRef] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        program::{CodeAssembler, MethodAccessFlags},
        test::factories::{broken_program, fields_program},
        Error,
    };

    #[test]
    fn test_run_seeds_receiver() {
        let mut asm = CodeAssembler::new();
        asm.aload(0).areturn();
        let method = Method::new("self", "()Ljava/lang/Object;", MethodAccessFlags::PUBLIC)
            .unwrap()
            .with_code(asm.finish().unwrap());

        let execution = MethodExecution::run_for(Some("a/B"), &method).unwrap();
        let loaded = execution.pushes_of(InstructionId::new(0))[0];
        assert_eq!(
            execution.graph().value(loaded).unwrap().value_type(),
            &crate::program::ValueType::reference("a/B")
        );
        assert_eq!(execution.pops_of(InstructionId::new(1)), &[loaded]);
        assert!(execution.frame().stack().is_empty());
    }

    #[test]
    fn test_program_execution() {
        let program = fields_program();
        let events = EventLog::new();
        let execution = ProgramExecution::run(&program, &EngineConfig::default(), &events).unwrap();

        assert_eq!(execution.len(), 2);
        assert!(execution.skipped().is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_program_execution_errors() {
        let program = broken_program();

        let events = EventLog::new();
        let execution = ProgramExecution::run(&program, &EngineConfig::default(), &events).unwrap();
        assert_eq!(execution.skipped().len(), 1);
        assert_eq!(events.count_kind(EventKind::Warning), 1);

        let strict = EngineConfig {
            continue_on_error: false,
            ..EngineConfig::sequential()
        };
        assert!(matches!(
            ProgramExecution::run(&program, &strict, &EventLog::new()),
            Err(Error::StackUnderflow { .. })
        ));
    }
}
