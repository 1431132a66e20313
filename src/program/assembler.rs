//! Fluent construction of method bodies.
//!
//! [`CodeAssembler`] is the entry point used by class-file loaders and tests to produce a
//! decoded [`Code`] without dealing with program counters or instruction ids: pcs are laid
//! out from the encoded instruction sizes, ids are allocated in emission order, and
//! branches refer to symbolic labels that are resolved by [`CodeAssembler::finish`].
//!
//! # Examples
//!
//! ```rust
//! use classdeob::program::CodeAssembler;
//!
//! let mut asm = CodeAssembler::new();
//! asm.new_object("java/lang/Object")
//!     .dup()
//!     .invokespecial("java/lang/Object", "<init>", "()V")?
//!     .astore(1)
//!     .return_();
//!
//! let code = asm.finish()?;
//! assert_eq!(code.len(), 5);
//! assert_eq!(code.max_locals(), 2);
//! # Ok::<(), classdeob::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    program::{
        code::Code,
        instruction::{
            ArithmeticOp, Condition, Constant, InstructionId, InstructionKind, InvokeKind,
            LocalType, LocalVariable, NumericType,
        },
        members::{FieldRef, MethodRef},
    },
    Result,
};

/// A pending instruction; branches still name their target label.
struct Pending {
    kind: InstructionKind,
    target: Option<String>,
}

/// Builder for [`Code`].
#[derive(Default)]
pub struct CodeAssembler {
    pending: Vec<Pending>,
    labels: HashMap<String, usize>,
    max_locals: u16,
}

impl CodeAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves at least `count` local slots, e.g. for parameters that are never
    /// loaded or stored explicitly.
    pub fn reserve_locals(&mut self, count: u16) -> &mut Self {
        self.max_locals = self.max_locals.max(count);
        self
    }

    /// The id the next emitted instruction will receive in the finished [`Code`].
    #[must_use]
    pub fn next_id(&self) -> InstructionId {
        InstructionId::new(u32::try_from(self.pending.len()).unwrap_or(u32::MAX))
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Emits an arbitrary instruction. Branch targets given here are raw pcs.
    pub fn emit(&mut self, kind: InstructionKind) -> &mut Self {
        if let InstructionKind::Load(local) | InstructionKind::Store(local) = &kind {
            let width = if local.ty.is_wide() { 2 } else { 1 };
            self.max_locals = self.max_locals.max(local.index.saturating_add(width));
        }
        self.pending.push(Pending { kind, target: None });
        self
    }

    fn emit_branch(&mut self, kind: InstructionKind, label: &str) -> &mut Self {
        self.pending.push(Pending {
            kind,
            target: Some(label.to_string()),
        });
        self
    }

    /// Binds `name` to the position of the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the label is already bound.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(malformed_error!("Label '{}' defined twice", name));
        }
        self.labels.insert(name.to_string(), self.pending.len());
        Ok(self)
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.emit(InstructionKind::Nop)
    }

    /// `aconst_null`
    pub fn aconst_null(&mut self) -> &mut Self {
        self.emit(InstructionKind::AConstNull)
    }

    /// Pushes an `int` constant.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::Int(value)))
    }

    /// Pushes a `long` constant.
    pub fn lconst(&mut self, value: i64) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::Long(value)))
    }

    /// Pushes a `float` constant.
    pub fn fconst(&mut self, value: f32) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::Float(value)))
    }

    /// Pushes a `double` constant.
    pub fn dconst(&mut self, value: f64) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::Double(value)))
    }

    /// Pushes a string literal.
    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::String(value.to_string())))
    }

    /// Pushes a class literal.
    pub fn ldc_class(&mut self, class: &str) -> &mut Self {
        self.emit(InstructionKind::Ldc(Constant::Class(class.to_string())))
    }

    /// `iload`
    pub fn iload(&mut self, index: u16) -> &mut Self {
        self.load(LocalType::Int, index)
    }

    /// `lload`
    pub fn lload(&mut self, index: u16) -> &mut Self {
        self.load(LocalType::Long, index)
    }

    /// `fload`
    pub fn fload(&mut self, index: u16) -> &mut Self {
        self.load(LocalType::Float, index)
    }

    /// `dload`
    pub fn dload(&mut self, index: u16) -> &mut Self {
        self.load(LocalType::Double, index)
    }

    /// `aload`
    pub fn aload(&mut self, index: u16) -> &mut Self {
        self.load(LocalType::Reference, index)
    }

    /// Typed load.
    pub fn load(&mut self, ty: LocalType, index: u16) -> &mut Self {
        self.emit(InstructionKind::Load(LocalVariable::new(ty, index)))
    }

    /// `istore`
    pub fn istore(&mut self, index: u16) -> &mut Self {
        self.store(LocalType::Int, index)
    }

    /// `lstore`
    pub fn lstore(&mut self, index: u16) -> &mut Self {
        self.store(LocalType::Long, index)
    }

    /// `fstore`
    pub fn fstore(&mut self, index: u16) -> &mut Self {
        self.store(LocalType::Float, index)
    }

    /// `dstore`
    pub fn dstore(&mut self, index: u16) -> &mut Self {
        self.store(LocalType::Double, index)
    }

    /// `astore`
    pub fn astore(&mut self, index: u16) -> &mut Self {
        self.store(LocalType::Reference, index)
    }

    /// Typed store.
    pub fn store(&mut self, ty: LocalType, index: u16) -> &mut Self {
        self.emit(InstructionKind::Store(LocalVariable::new(ty, index)))
    }

    /// Any arithmetic or bitwise instruction.
    pub fn arithmetic(&mut self, op: ArithmeticOp, ty: NumericType) -> &mut Self {
        self.emit(InstructionKind::Arithmetic(op, ty))
    }

    /// `iadd`
    pub fn iadd(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Add, NumericType::Int)
    }

    /// `isub`
    pub fn isub(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Sub, NumericType::Int)
    }

    /// `imul`
    pub fn imul(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Mul, NumericType::Int)
    }

    /// `idiv`
    pub fn idiv(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Div, NumericType::Int)
    }

    /// `ixor`
    pub fn ixor(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Xor, NumericType::Int)
    }

    /// `ladd`
    pub fn ladd(&mut self) -> &mut Self {
        self.arithmetic(ArithmeticOp::Add, NumericType::Long)
    }

    /// `pop`
    pub fn pop(&mut self) -> &mut Self {
        self.emit(InstructionKind::Pop)
    }

    /// `pop2` (category-2 form)
    pub fn pop2(&mut self) -> &mut Self {
        self.emit(InstructionKind::Pop2)
    }

    /// `dup`
    pub fn dup(&mut self) -> &mut Self {
        self.emit(InstructionKind::Dup)
    }

    /// `dup2` (category-2 form)
    pub fn dup2(&mut self) -> &mut Self {
        self.emit(InstructionKind::Dup2)
    }

    /// `new`
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.emit(InstructionKind::New(class.to_string()))
    }

    /// `getfield`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn getfield(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let field = FieldRef::new(class, name, descriptor)?;
        Ok(self.emit(InstructionKind::GetField(field)))
    }

    /// `putfield`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn putfield(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let field = FieldRef::new(class, name, descriptor)?;
        Ok(self.emit(InstructionKind::PutField(field)))
    }

    /// `getstatic`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let field = FieldRef::new(class, name, descriptor)?;
        Ok(self.emit(InstructionKind::GetStatic(field)))
    }

    /// `putstatic`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn putstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let field = FieldRef::new(class, name, descriptor)?;
        Ok(self.emit(InstructionKind::PutStatic(field)))
    }

    /// Any invocation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self> {
        let method = MethodRef::new(class, name, descriptor)?;
        Ok(self.emit(InstructionKind::Invoke(kind, method)))
    }

    /// `invokevirtual`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(InvokeKind::Virtual, class, name, descriptor)
    }

    /// `invokespecial`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn invokespecial(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(InvokeKind::Special, class, name, descriptor)
    }

    /// `invokestatic`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(InvokeKind::Static, class, name, descriptor)
    }

    /// `invokeinterface`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn invokeinterface(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self> {
        self.invoke(InvokeKind::Interface, class, name, descriptor)
    }

    /// `goto label`
    pub fn goto(&mut self, label: &str) -> &mut Self {
        self.emit_branch(InstructionKind::Goto(0), label)
    }

    /// Conditional branch to `label`.
    pub fn if_(&mut self, condition: Condition, label: &str) -> &mut Self {
        self.emit_branch(InstructionKind::If(condition, 0), label)
    }

    /// `return`
    pub fn return_(&mut self) -> &mut Self {
        self.emit(InstructionKind::Return(None))
    }

    /// `ireturn`
    pub fn ireturn(&mut self) -> &mut Self {
        self.emit(InstructionKind::Return(Some(LocalType::Int)))
    }

    /// `lreturn`
    pub fn lreturn(&mut self) -> &mut Self {
        self.emit(InstructionKind::Return(Some(LocalType::Long)))
    }

    /// `areturn`
    pub fn areturn(&mut self) -> &mut Self {
        self.emit(InstructionKind::Return(Some(LocalType::Reference)))
    }

    /// `athrow`
    pub fn athrow(&mut self) -> &mut Self {
        self.emit(InstructionKind::Throw)
    }

    /// Lays out program counters, resolves labels and produces the body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a branch names an undefined label.
    pub fn finish(self) -> Result<Code> {
        let mut pcs = Vec::with_capacity(self.pending.len() + 1);
        let mut pc = 0u32;
        for item in &self.pending {
            pcs.push(pc);
            pc += item.kind.encoded_len();
        }
        // A label may be bound past the last instruction
        pcs.push(pc);

        let mut code = Code::new(self.max_locals);
        for (item, &pc) in self.pending.into_iter().zip(&pcs) {
            let kind = match item.target {
                None => item.kind,
                Some(label) => {
                    let index = *self
                        .labels
                        .get(&label)
                        .ok_or_else(|| malformed_error!("Undefined label '{}'", label))?;
                    let target = pcs[index];
                    match item.kind {
                        InstructionKind::Goto(_) => InstructionKind::Goto(target),
                        InstructionKind::If(cond, _) => InstructionKind::If(cond, target),
                        other => other,
                    }
                }
            };
            code.push(pc, kind);
        }

        Ok(code)
    }
}
