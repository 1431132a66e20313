//! Abstract execution of single instructions.
//!
//! [`Instruction::execute`] dispatches on the closed [`InstructionKind`] set, pops and
//! pushes through an [`InstructionStep`] so that the provenance graph records every
//! stack mutation, and folds integer arithmetic when both operands are known.
//!
//! Duplication-family instructions additionally expose the [`Duplication`] capability,
//! which answers provenance questions about the two aliases a `dup` creates.

use crate::{
    analysis::{
        context::ContextId,
        frame::{Frame, InstructionStep, LocalSlot},
        graph::ProvenanceGraph,
        value::{AbstractValue, ValueId},
    },
    program::{ArithmeticOp, Instruction, InstructionKind, LocalType, NumericType, ValueType},
    Error, Result,
};

impl Instruction {
    /// Executes the instruction against `frame`, recording one execution context in
    /// `graph`.
    ///
    /// The recorded context pops and pushes exactly as many values as
    /// [`InstructionKind::stack_effect`] declares. Branch targets are not followed; the
    /// caller walks instructions linearly.
    ///
    /// # Arguments
    ///
    /// * `frame` - The simulated frame of the method being analysed
    /// * `graph` - The provenance graph of the same analysis
    ///
    /// # Returns
    ///
    /// The id of the recorded context.
    ///
    /// # Errors
    ///
    /// - [`Error::StackUnderflow`] if the instruction pops from an empty stack
    /// - [`Error::Unsupported`] for stack shapes the engine does not model (`dup2` or
    ///   `pop2` on category-1 values, bitwise operations on floating-point types)
    pub fn execute(&self, frame: &mut Frame, graph: &mut ProvenanceGraph) -> Result<ContextId> {
        if let InstructionKind::Arithmetic(op, ty @ (NumericType::Float | NumericType::Double)) =
            self.kind()
        {
            if op.is_integral_only() {
                return Err(Error::Unsupported(format!(
                    "'{}' has no {:?} form (pc {})",
                    op,
                    ty,
                    self.pc()
                )));
            }
        }

        let mut step = frame.begin(graph, self);
        match self.kind() {
            InstructionKind::Nop | InstructionKind::Goto(_) | InstructionKind::Return(None) => {}
            InstructionKind::AConstNull => {
                step.push(ValueType::Null, AbstractValue::Null);
            }
            InstructionKind::Ldc(constant) => {
                step.push(constant.value_type(), AbstractValue::from(constant));
            }
            InstructionKind::Load(local) => {
                let (ty, value) = match step.local(local.index) {
                    Some(slot) if slot_fits(local.ty, &slot.ty) => {
                        (slot.ty.clone(), slot.value.clone())
                    }
                    _ => (local.ty.default_value_type(), AbstractValue::Unknown),
                };
                step.push(ty, value);
            }
            InstructionKind::Store(local) => {
                let stored = step.pop()?;
                let (ty, value) = node_parts(&step, stored, local.ty.default_value_type());
                step.store_local(
                    local.index,
                    LocalSlot {
                        ty,
                        value,
                        stored_from: Some(stored),
                    },
                );
            }
            InstructionKind::Arithmetic(op, ty) => {
                let right = step.pop()?;
                let left = if op.operands() == 2 {
                    Some(step.pop()?)
                } else {
                    None
                };
                let right = node_value(&step, right);
                let left = left.map(|id| node_value(&step, id));
                let folded = fold(*op, *ty, left.as_ref(), &right);
                step.push(ty.value_type(), folded);
            }
            InstructionKind::Pop
            | InstructionKind::PutStatic(_)
            | InstructionKind::Return(Some(_))
            | InstructionKind::Throw => {
                step.pop()?;
            }
            InstructionKind::Dup => duplicate(&mut step)?,
            InstructionKind::Dup2 => {
                require_wide_top(&step, self)?;
                duplicate(&mut step)?;
            }
            InstructionKind::Pop2 => {
                require_wide_top(&step, self)?;
                step.pop()?;
            }
            InstructionKind::New(class) => {
                step.push(ValueType::reference(class), AbstractValue::Unknown);
            }
            InstructionKind::GetField(field) => {
                step.pop()?;
                step.push(field.field_type().clone(), AbstractValue::Unknown);
            }
            InstructionKind::PutField(_) => {
                step.pop()?;
                step.pop()?;
            }
            InstructionKind::GetStatic(field) => {
                step.push(field.field_type().clone(), AbstractValue::Unknown);
            }
            InstructionKind::Invoke(_, method) => {
                for _ in 0..self.kind().stack_effect().pops {
                    step.pop()?;
                }
                if let Some(ret) = &method.signature().ret {
                    step.push(ret.clone(), AbstractValue::Unknown);
                }
            }
            InstructionKind::If(condition, _) => {
                for _ in 0..condition.operands() {
                    step.pop()?;
                }
            }
        }

        Ok(step.finish())
    }

    /// The duplication capability, for `dup` and `dup2`.
    #[must_use]
    pub fn as_duplication(&self) -> Option<Duplication<'_>> {
        self.kind()
            .is_duplication()
            .then_some(Duplication { instruction: self })
    }
}

/// Provenance queries specific to stack-duplicating instructions.
///
/// A `dup` pops a value `v` and pushes two fresh nodes carrying `v`'s type and value;
/// the first pushed (index 0) is the deeper alias, the second (index 1) the top one.
#[derive(Clone, Copy, Debug)]
pub struct Duplication<'a> {
    instruction: &'a Instruction,
}

impl Duplication<'_> {
    /// The duplicating instruction.
    #[must_use]
    pub fn instruction(&self) -> &Instruction {
        self.instruction
    }

    /// The value that was duplicated into `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if `value` was not pushed by a context of
    /// this instruction.
    pub fn original(&self, graph: &ProvenanceGraph, value: ValueId) -> Result<ValueId> {
        let (_, ctx) = self.own_context(graph, value)?;
        graph
            .context(ctx)
            .and_then(|context| context.pops().first().copied())
            .ok_or_else(|| contract_violation!("{} at pc {} popped nothing", ctx, self.instruction.pc()))
    }

    /// The other alias created together with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if `value` was not pushed by a context of
    /// this instruction, or if that context did not push exactly two values.
    pub fn other_branch(&self, graph: &ProvenanceGraph, value: ValueId) -> Result<ValueId> {
        let (pushes, _) = self.own_context(graph, value)?;
        if pushes.len() != 2 {
            return Err(contract_violation!(
                "'{}' at pc {} pushed {} values, expected 2",
                self.instruction.mnemonic(),
                self.instruction.pc(),
                pushes.len()
            ));
        }

        let idx = pushes
            .iter()
            .position(|&v| v == value)
            .ok_or_else(|| contract_violation!("{} is not among the pushes", value))?;
        Ok(pushes[!idx & 1])
    }

    /// The pushes and id of the context of this instruction that produced `value`.
    fn own_context<'g>(
        &self,
        graph: &'g ProvenanceGraph,
        value: ValueId,
    ) -> Result<(&'g [ValueId], ContextId)> {
        let node = graph
            .value(value)
            .ok_or_else(|| contract_violation!("{} does not exist", value))?;
        let ctx = node.pushed_by();
        let context = graph
            .context(ctx)
            .ok_or_else(|| contract_violation!("{} has no producer", value))?;

        if context.instruction() != self.instruction.id() || !context.pushes().contains(&value) {
            return Err(contract_violation!(
                "{} was pushed by '{}' at pc {}, not by '{}' at pc {}",
                value,
                context.mnemonic(),
                context.pc(),
                self.instruction.mnemonic(),
                self.instruction.pc()
            ));
        }
        Ok((context.pushes(), ctx))
    }
}

/// `dup2` and `pop2` are only modelled on a single category-2 value.
fn require_wide_top(step: &InstructionStep<'_>, instruction: &Instruction) -> Result<()> {
    match step.peek(0) {
        Some(node) if !node.value_type().is_wide() => Err(Error::Unsupported(format!(
            "'{}' on category-1 values (pc {})",
            instruction.mnemonic(),
            instruction.pc()
        ))),
        _ => Ok(()),
    }
}

fn duplicate(step: &mut InstructionStep<'_>) -> Result<()> {
    let source = step.pop()?;
    let (ty, value) = node_parts(step, source, ValueType::reference("java/lang/Object"));
    step.push(ty.clone(), value.clone());
    step.push(ty, value);
    Ok(())
}

fn node_parts(
    step: &InstructionStep<'_>,
    id: ValueId,
    fallback: ValueType,
) -> (ValueType, AbstractValue) {
    step.value(id).map_or((fallback, AbstractValue::Unknown), |node| {
        (node.value_type().clone(), node.value().clone())
    })
}

fn node_value(step: &InstructionStep<'_>, id: ValueId) -> AbstractValue {
    step.value(id)
        .map(|node| node.value().clone())
        .unwrap_or_default()
}

/// Whether a slot of type `ty` may be read by a load of kind `kind`.
fn slot_fits(kind: LocalType, ty: &ValueType) -> bool {
    match kind {
        LocalType::Int => *ty == ValueType::Int,
        LocalType::Long => *ty == ValueType::Long,
        LocalType::Float => *ty == ValueType::Float,
        LocalType::Double => *ty == ValueType::Double,
        LocalType::Reference => ty.is_reference(),
    }
}

/// Folds integral arithmetic on known operands with JVM semantics.
fn fold(
    op: ArithmeticOp,
    ty: NumericType,
    left: Option<&AbstractValue>,
    right: &AbstractValue,
) -> AbstractValue {
    match ty {
        NumericType::Int => {
            let (Some(r), l) = (right.as_int(), left.and_then(AbstractValue::as_int)) else {
                return AbstractValue::Unknown;
            };
            fold_int(op, l, r).map_or(AbstractValue::Unknown, AbstractValue::Int)
        }
        NumericType::Long => {
            let l = left.and_then(AbstractValue::as_long);
            let folded = if op.is_shift() {
                right.as_int().and_then(|r| fold_long_shift(op, l?, r))
            } else {
                right.as_long().and_then(|r| fold_long(op, l, r))
            };
            folded.map_or(AbstractValue::Unknown, AbstractValue::Long)
        }
        NumericType::Float | NumericType::Double => AbstractValue::Unknown,
    }
}

/// `l` is `None` only for `Neg`, and for unknown left operands.
fn fold_int(op: ArithmeticOp, l: Option<i32>, r: i32) -> Option<i32> {
    if op == ArithmeticOp::Neg {
        return Some(r.wrapping_neg());
    }
    let l = l?;
    Some(match op {
        ArithmeticOp::Add => l.wrapping_add(r),
        ArithmeticOp::Sub => l.wrapping_sub(r),
        ArithmeticOp::Mul => l.wrapping_mul(r),
        ArithmeticOp::Div if r != 0 => l.wrapping_div(r),
        ArithmeticOp::Rem if r != 0 => l.wrapping_rem(r),
        ArithmeticOp::Div | ArithmeticOp::Rem | ArithmeticOp::Neg => return None,
        ArithmeticOp::Shl => l.wrapping_shl(r as u32),
        ArithmeticOp::Shr => l.wrapping_shr(r as u32),
        ArithmeticOp::Ushr => ((l as u32) >> (r & 0x1f)) as i32,
        ArithmeticOp::And => l & r,
        ArithmeticOp::Or => l | r,
        ArithmeticOp::Xor => l ^ r,
    })
}

fn fold_long(op: ArithmeticOp, l: Option<i64>, r: i64) -> Option<i64> {
    if op == ArithmeticOp::Neg {
        return Some(r.wrapping_neg());
    }
    let l = l?;
    match op {
        ArithmeticOp::Add => Some(l.wrapping_add(r)),
        ArithmeticOp::Sub => Some(l.wrapping_sub(r)),
        ArithmeticOp::Mul => Some(l.wrapping_mul(r)),
        ArithmeticOp::Div if r != 0 => Some(l.wrapping_div(r)),
        ArithmeticOp::Rem if r != 0 => Some(l.wrapping_rem(r)),
        ArithmeticOp::And => Some(l & r),
        ArithmeticOp::Or => Some(l | r),
        ArithmeticOp::Xor => Some(l ^ r),
        _ => None,
    }
}

fn fold_long_shift(op: ArithmeticOp, l: i64, r: i32) -> Option<i64> {
    match op {
        ArithmeticOp::Shl => Some(l.wrapping_shl(r as u32)),
        ArithmeticOp::Shr => Some(l.wrapping_shr(r as u32)),
        ArithmeticOp::Ushr => Some(((l as u64) >> (r & 0x3f)) as i64),
        _ => None,
    }
}
