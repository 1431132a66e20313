//! The provenance graph of one method analysis.
//!
//! Value nodes and execution contexts reference each other in both directions: a node
//! knows the context that pushed it and the contexts that popped it, a context knows the
//! nodes it popped and pushed. Both live in one arena owned by [`ProvenanceGraph`] and
//! refer to each other through [`ValueId`] / [`ContextId`], which keeps the cyclic
//! structure free of shared ownership.
//!
//! Edges are created only while executing instructions (through
//! [`crate::analysis::InstructionStep`]). Afterwards the removal protocol is the only
//! writer, and it either substitutes one popped node for another or detaches a context
//! entirely. Nothing is ever physically deleted: detached contexts and the nodes they
//! pushed are flagged dead, so ids stay valid for the lifetime of the graph.

use crate::{
    analysis::{
        context::{ContextId, ExecutionContext},
        frame::FrameId,
        value::{AbstractValue, ValueId, ValueNode},
    },
    program::{Instruction, ValueType},
    Result,
};

/// Arena of all [`ValueNode`]s and [`ExecutionContext`]s of one method analysis.
#[derive(Clone, Debug, Default)]
pub struct ProvenanceGraph {
    values: Vec<ValueNode>,
    contexts: Vec<ExecutionContext>,
}

impl ProvenanceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_context(&mut self, instruction: &Instruction, frame: FrameId) -> ContextId {
        let id = ContextId::new(self.contexts.len() as u32);
        self.contexts.push(ExecutionContext {
            instruction: instruction.id(),
            pc: instruction.pc(),
            mnemonic: instruction.mnemonic(),
            frame,
            pops: Vec::new(),
            pushes: Vec::new(),
            duplication: instruction.kind().is_duplication(),
            live: true,
        });
        id
    }

    /// Allocates a node pushed by `ctx` and appends it to the context's pushes.
    pub(crate) fn record_push(
        &mut self,
        ctx: ContextId,
        ty: ValueType,
        value: AbstractValue,
    ) -> ValueId {
        let id = ValueId::new(self.values.len() as u32);
        self.values.push(ValueNode::new(ty, value, ctx));
        self.contexts[ctx.index()].pushes.push(id);
        id
    }

    /// Records that `ctx` popped `value`, on both sides of the edge.
    pub(crate) fn record_pop(&mut self, ctx: ContextId, value: ValueId) {
        self.contexts[ctx.index()].pops.push(value);
        self.values[value.index()].popped_by.push(ctx);
    }

    /// Looks up a value node.
    #[must_use]
    pub fn value(&self, id: ValueId) -> Option<&ValueNode> {
        self.values.get(id.index())
    }

    /// Looks up an execution context.
    #[must_use]
    pub fn context(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.contexts.get(id.index())
    }

    /// Iterates all value nodes, live or not.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueNode)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, node)| (ValueId::new(i as u32), node))
    }

    /// Iterates all execution contexts, live or not.
    pub fn contexts(&self) -> impl Iterator<Item = (ContextId, &ExecutionContext)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| (ContextId::new(i as u32), ctx))
    }

    /// Number of value nodes ever allocated.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Number of contexts ever recorded.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of contexts that have not been detached.
    #[must_use]
    pub fn live_context_count(&self) -> usize {
        self.contexts.iter().filter(|ctx| ctx.live).count()
    }

    /// The context that pushed `value`.
    #[must_use]
    pub fn producer(&self, value: ValueId) -> Option<&ExecutionContext> {
        self.value(value)
            .and_then(|node| self.context(node.pushed_by))
    }

    /// The live contexts that popped `value`.
    #[must_use]
    pub fn live_consumers(&self, value: ValueId) -> Vec<ContextId> {
        self.value(value)
            .map(|node| {
                node.popped_by
                    .iter()
                    .copied()
                    .filter(|ctx| self.contexts[ctx.index()].live)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns `true` if some live context still pops `value`.
    #[must_use]
    pub fn has_live_consumers(&self, value: ValueId) -> bool {
        self.value(value).is_some_and(|node| {
            node.popped_by
                .iter()
                .any(|ctx| self.contexts[ctx.index()].live)
        })
    }

    /// Follows duplication producers back to the first value that was not created by a
    /// duplication.
    ///
    /// For `a = new; b, c = dup a`, both `b` and `c` resolve to `a`.
    #[must_use]
    pub fn resolve_origin(&self, value: ValueId) -> ValueId {
        let mut current = value;
        // Each step moves to a strictly older node, so this terminates
        for _ in 0..self.values.len() {
            match self.producer(current) {
                Some(ctx) if ctx.duplication => match ctx.pops.first() {
                    Some(&source) => current = source,
                    None => break,
                },
                _ => break,
            }
        }
        current
    }

    /// Verifies that every live edge is recorded on both of its ends.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] describing the first inconsistent edge.
    pub fn check_consistency(&self) -> Result<()> {
        for (id, ctx) in self.contexts() {
            if !ctx.live {
                continue;
            }
            for &pop in &ctx.pops {
                let node = self
                    .value(pop)
                    .ok_or_else(|| malformed_error!("{} pops unknown value {}", id, pop))?;
                if !node.popped_by.contains(&id) {
                    return Err(malformed_error!(
                        "{} pops {} but is missing from its consumers",
                        id,
                        pop
                    ));
                }
            }
            for &push in &ctx.pushes {
                let node = self
                    .value(push)
                    .ok_or_else(|| malformed_error!("{} pushes unknown value {}", id, push))?;
                if node.pushed_by != id {
                    return Err(malformed_error!(
                        "{} pushes {} which names {} as producer",
                        id,
                        push,
                        node.pushed_by
                    ));
                }
            }
        }

        for (id, node) in self.values() {
            if !node.live {
                continue;
            }
            let producer = self
                .context(node.pushed_by)
                .ok_or_else(|| malformed_error!("{} has unknown producer", id))?;
            if !producer.pushes.contains(&id) {
                return Err(malformed_error!(
                    "{} is missing from the pushes of {}",
                    id,
                    node.pushed_by
                ));
            }
            for consumer in self.live_consumers(id) {
                if !self.contexts[consumer.index()].pops.contains(&id) {
                    return Err(malformed_error!(
                        "{} lists {} as consumer but it does not pop it",
                        id,
                        consumer
                    ));
                }
            }
        }

        Ok(())
    }

    /// Marks `ctx` and everything it pushed as dead and unlinks it from the nodes it
    /// popped. Returns the popped nodes, which may now be without a live consumer.
    ///
    /// The context keeps its recorded pops and pushes.
    pub(crate) fn detach(&mut self, ctx: ContextId) -> Vec<ValueId> {
        let context = &mut self.contexts[ctx.index()];
        context.live = false;
        let pops = context.pops.clone();
        let pushes = context.pushes.clone();

        for push in pushes {
            self.values[push.index()].live = false;
        }
        for &pop in &pops {
            self.values[pop.index()].popped_by.retain(|&c| c != ctx);
        }
        pops
    }

    /// Makes `ctx` pop `new` where it used to pop `old`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ContractViolation`] if `ctx` does not pop `old`.
    pub(crate) fn substitute_pop(&mut self, ctx: ContextId, old: ValueId, new: ValueId) -> Result<()> {
        let context = &mut self.contexts[ctx.index()];
        let slot = context
            .pops
            .iter_mut()
            .find(|v| **v == old)
            .ok_or_else(|| contract_violation!("{} does not pop {}", ctx, old))?;
        *slot = new;

        self.values[old.index()].popped_by.retain(|&c| c != ctx);
        self.values[new.index()].popped_by.push(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{InstructionId, InstructionKind};

    fn insn(id: u32, kind: InstructionKind) -> Instruction {
        Instruction::new(InstructionId::new(id), id, kind)
    }

    #[test]
    fn test_edges_are_bidirectional() {
        let mut graph = ProvenanceGraph::new();
        let frame = FrameId::new(0);

        let push_ctx = graph.begin_context(&insn(0, InstructionKind::AConstNull), frame);
        let value = graph.record_push(push_ctx, ValueType::Null, AbstractValue::Null);

        let pop_ctx = graph.begin_context(&insn(1, InstructionKind::Pop), frame);
        graph.record_pop(pop_ctx, value);

        assert_eq!(graph.producer(value).unwrap().instruction(), InstructionId::new(0));
        assert_eq!(graph.live_consumers(value), vec![pop_ctx]);
        assert!(graph.check_consistency().is_ok());

        let released = graph.detach(pop_ctx);
        assert_eq!(released, vec![value]);
        assert!(!graph.has_live_consumers(value));
        assert!(!graph.context(pop_ctx).unwrap().is_live());
        assert_eq!(graph.context(pop_ctx).unwrap().pops(), &[value]);
        assert_eq!(graph.live_context_count(), 1);
        assert!(graph.check_consistency().is_ok());
    }

    #[test]
    fn test_substitute_pop() {
        let mut graph = ProvenanceGraph::new();
        let frame = FrameId::new(0);

        let a_ctx = graph.begin_context(&insn(0, InstructionKind::AConstNull), frame);
        let a = graph.record_push(a_ctx, ValueType::Null, AbstractValue::Null);
        let b_ctx = graph.begin_context(&insn(1, InstructionKind::AConstNull), frame);
        let b = graph.record_push(b_ctx, ValueType::Null, AbstractValue::Null);
        let pop_ctx = graph.begin_context(&insn(2, InstructionKind::Pop), frame);
        graph.record_pop(pop_ctx, b);

        graph.substitute_pop(pop_ctx, b, a).unwrap();
        assert_eq!(graph.context(pop_ctx).unwrap().pops(), &[a]);
        assert!(graph.has_live_consumers(a));
        assert!(!graph.has_live_consumers(b));
        assert!(graph.check_consistency().is_ok());

        assert!(matches!(
            graph.substitute_pop(pop_ctx, b, a),
            Err(crate::Error::ContractViolation { .. })
        ));
    }
}
