//! Decoded JVM instructions.
//!
//! The loader hands over instructions in a normalized, operand-resolved form: constant
//! pushes (`iconst_*`, `bipush`, `sipush`, `ldc`, `ldc2_w`, ...) are all [`InstructionKind::Ldc`],
//! typed loads and stores carry a [`LocalVariable`], and field and method operands are
//! already resolved from the constant pool into [`FieldRef`] / [`MethodRef`].
//!
//! Every instruction carries a stable [`InstructionId`] that survives insertions and
//! deletions in the owning [`crate::program::Code`], and the program counter it was
//! decoded at.
//!
//! # Stack effects
//!
//! Stack effects count *values*, not slots: a `long` is a single entry on the simulated
//! stack. [`InstructionKind::Dup2`] is therefore modelled only in its category-2 form,
//! where it duplicates one wide value, and [`InstructionKind::Pop2`] only in the form that
//! discards one wide value.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::program::{
    descriptor::ValueType,
    members::{FieldRef, MethodRef},
};

/// Stable identity of an instruction within one method body.
///
/// Ids are allocated in increasing order by [`crate::program::Code`] and are never
/// reused, so an id stays valid for the lifetime of the instruction regardless of other
/// instructions being inserted or removed around it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InstructionId(u32);

impl InstructionId {
    /// Creates an id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        InstructionId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A constant pushed by [`InstructionKind::Ldc`].
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    /// `int` constant (`iconst_*`, `bipush`, `sipush`, `ldc`)
    Int(i32),
    /// `long` constant (`lconst_*`, `ldc2_w`)
    Long(i64),
    /// `float` constant (`fconst_*`, `ldc`)
    Float(f32),
    /// `double` constant (`dconst_*`, `ldc2_w`)
    Double(f64),
    /// String literal
    String(String),
    /// Class literal, by internal name
    Class(String),
}

impl Constant {
    /// Stack type of the pushed constant.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Constant::Int(_) => ValueType::Int,
            Constant::Long(_) => ValueType::Long,
            Constant::Float(_) => ValueType::Float,
            Constant::Double(_) => ValueType::Double,
            Constant::String(_) => ValueType::reference("java/lang/String"),
            Constant::Class(_) => ValueType::reference("java/lang/Class"),
        }
    }

    fn encoded_len(&self) -> u32 {
        match self {
            Constant::Int(-1..=5) => 1,
            Constant::Int(v) if i8::try_from(*v).is_ok() => 2,
            Constant::Int(v) if i16::try_from(*v).is_ok() => 3,
            Constant::Long(0 | 1) => 1,
            #[allow(clippy::float_cmp)]
            Constant::Float(v) if *v == 0.0 || *v == 1.0 || *v == 2.0 => 1,
            #[allow(clippy::float_cmp)]
            Constant::Double(v) if *v == 0.0 || *v == 1.0 => 1,
            Constant::Long(_) | Constant::Double(_) => 3,
            Constant::Int(_) | Constant::Float(_) | Constant::String(_) | Constant::Class(_) => 2,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}f"),
            Constant::Double(v) => write!(f, "{v}d"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Class(c) => write!(f, "{c}.class"),
        }
    }
}

/// The type prefix of a typed local or return instruction (`i`, `l`, `f`, `d`, `a`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LocalType {
    /// `int` and sub-int types
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Any reference
    Reference,
}

impl LocalType {
    /// The stack type assumed for a slot of this kind whose content is unknown.
    #[must_use]
    pub fn default_value_type(self) -> ValueType {
        match self {
            LocalType::Int => ValueType::Int,
            LocalType::Long => ValueType::Long,
            LocalType::Float => ValueType::Float,
            LocalType::Double => ValueType::Double,
            LocalType::Reference => ValueType::reference("java/lang/Object"),
        }
    }

    /// Returns `true` for `long` and `double`, which occupy two local slots.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, LocalType::Long | LocalType::Double)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Operand of a load or store: the typed local-variable slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LocalVariable {
    /// Type prefix of the instruction
    pub ty: LocalType,
    /// Slot index
    pub index: u16,
}

impl LocalVariable {
    /// Creates a local-variable operand.
    #[must_use]
    pub const fn new(ty: LocalType, index: u16) -> Self {
        LocalVariable { ty, index }
    }
}

/// Operand type of an arithmetic instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NumericType {
    /// `i*` instructions
    Int,
    /// `l*` instructions
    Long,
    /// `f*` instructions
    Float,
    /// `d*` instructions
    Double,
}

impl NumericType {
    /// Stack type of the operands and result.
    #[must_use]
    pub fn value_type(self) -> ValueType {
        match self {
            NumericType::Int => ValueType::Int,
            NumericType::Long => ValueType::Long,
            NumericType::Float => ValueType::Float,
            NumericType::Double => ValueType::Double,
        }
    }
}

/// Arithmetic and bitwise operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Negation (unary)
    Neg,
    /// Shift left
    Shl,
    /// Arithmetic shift right
    Shr,
    /// Logical shift right
    Ushr,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
}

impl ArithmeticOp {
    /// Returns `true` for shifts and bitwise operations, which only exist for `int` and
    /// `long`.
    #[must_use]
    pub fn is_integral_only(self) -> bool {
        matches!(
            self,
            ArithmeticOp::Shl
                | ArithmeticOp::Shr
                | ArithmeticOp::Ushr
                | ArithmeticOp::And
                | ArithmeticOp::Or
                | ArithmeticOp::Xor
        )
    }

    /// Returns `true` for shifts, whose second operand is always an `int`.
    #[must_use]
    pub fn is_shift(self) -> bool {
        matches!(self, ArithmeticOp::Shl | ArithmeticOp::Shr | ArithmeticOp::Ushr)
    }

    /// Number of stack operands.
    #[must_use]
    pub fn operands(self) -> u16 {
        if self == ArithmeticOp::Neg {
            1
        } else {
            2
        }
    }
}

/// Method invocation flavours.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, IntoStaticStr)]
pub enum InvokeKind {
    /// `invokevirtual`
    #[strum(serialize = "invokevirtual")]
    Virtual,
    /// `invokespecial` (constructors, private and super calls)
    #[strum(serialize = "invokespecial")]
    Special,
    /// `invokestatic`
    #[strum(serialize = "invokestatic")]
    Static,
    /// `invokeinterface`
    #[strum(serialize = "invokeinterface")]
    Interface,
}

/// Branch conditions of `if*` instructions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, IntoStaticStr)]
pub enum Condition {
    /// `ifeq`
    #[strum(serialize = "ifeq")]
    Eq,
    /// `ifne`
    #[strum(serialize = "ifne")]
    Ne,
    /// `iflt`
    #[strum(serialize = "iflt")]
    Lt,
    /// `ifge`
    #[strum(serialize = "ifge")]
    Ge,
    /// `ifgt`
    #[strum(serialize = "ifgt")]
    Gt,
    /// `ifle`
    #[strum(serialize = "ifle")]
    Le,
    /// `if_icmpeq`
    #[strum(serialize = "if_icmpeq")]
    ICmpEq,
    /// `if_icmpne`
    #[strum(serialize = "if_icmpne")]
    ICmpNe,
    /// `if_icmplt`
    #[strum(serialize = "if_icmplt")]
    ICmpLt,
    /// `if_icmpge`
    #[strum(serialize = "if_icmpge")]
    ICmpGe,
    /// `if_icmpgt`
    #[strum(serialize = "if_icmpgt")]
    ICmpGt,
    /// `if_icmple`
    #[strum(serialize = "if_icmple")]
    ICmpLe,
    /// `if_acmpeq`
    #[strum(serialize = "if_acmpeq")]
    ACmpEq,
    /// `if_acmpne`
    #[strum(serialize = "if_acmpne")]
    ACmpNe,
    /// `ifnull`
    #[strum(serialize = "ifnull")]
    Null,
    /// `ifnonnull`
    #[strum(serialize = "ifnonnull")]
    NonNull,
}

impl Condition {
    /// Number of stack operands the branch consumes.
    #[must_use]
    pub fn operands(self) -> u16 {
        match self {
            Condition::ICmpEq
            | Condition::ICmpNe
            | Condition::ICmpLt
            | Condition::ICmpGe
            | Condition::ICmpGt
            | Condition::ICmpLe
            | Condition::ACmpEq
            | Condition::ACmpNe => 2,
            _ => 1,
        }
    }
}

/// The declared stack effect of an instruction, in values.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct StackEffect {
    /// Values consumed
    pub pops: u16,
    /// Values produced
    pub pushes: u16,
}

impl StackEffect {
    /// Creates a stack effect.
    #[must_use]
    pub const fn new(pops: u16, pushes: u16) -> Self {
        StackEffect { pops, pushes }
    }
}

/// The operation performed by an instruction, with its decoded operands.
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    /// `nop`
    Nop,
    /// `aconst_null`
    AConstNull,
    /// Any constant push
    Ldc(Constant),
    /// `iload`, `lload`, `fload`, `dload`, `aload`
    Load(LocalVariable),
    /// `istore`, `lstore`, `fstore`, `dstore`, `astore`
    Store(LocalVariable),
    /// Arithmetic and bitwise operations
    Arithmetic(ArithmeticOp, NumericType),
    /// `pop`
    Pop,
    /// `pop2`, category-2 form
    Pop2,
    /// `dup`
    Dup,
    /// `dup2`, category-2 form
    Dup2,
    /// `new`, by internal class name
    New(String),
    /// `getfield`
    GetField(FieldRef),
    /// `putfield`
    PutField(FieldRef),
    /// `getstatic`
    GetStatic(FieldRef),
    /// `putstatic`
    PutStatic(FieldRef),
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
    Invoke(InvokeKind, MethodRef),
    /// `goto`, by target pc
    Goto(u32),
    /// Conditional branch, by target pc
    If(Condition, u32),
    /// `return` (`None`) or a typed return
    Return(Option<LocalType>),
    /// `athrow`
    Throw,
}

const LOADS: [&str; 5] = ["iload", "lload", "fload", "dload", "aload"];
const STORES: [&str; 5] = ["istore", "lstore", "fstore", "dstore", "astore"];
const RETURNS: [&str; 5] = ["ireturn", "lreturn", "freturn", "dreturn", "areturn"];

const ARITHMETIC: [[&str; 4]; 12] = [
    ["iadd", "ladd", "fadd", "dadd"],
    ["isub", "lsub", "fsub", "dsub"],
    ["imul", "lmul", "fmul", "dmul"],
    ["idiv", "ldiv", "fdiv", "ddiv"],
    ["irem", "lrem", "frem", "drem"],
    ["ineg", "lneg", "fneg", "dneg"],
    ["ishl", "lshl", "<invalid>", "<invalid>"],
    ["ishr", "lshr", "<invalid>", "<invalid>"],
    ["iushr", "lushr", "<invalid>", "<invalid>"],
    ["iand", "land", "<invalid>", "<invalid>"],
    ["ior", "lor", "<invalid>", "<invalid>"],
    ["ixor", "lxor", "<invalid>", "<invalid>"],
];

impl InstructionKind {
    /// The JVM mnemonic of this instruction.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            InstructionKind::Nop => "nop",
            InstructionKind::AConstNull => "aconst_null",
            InstructionKind::Ldc(_) => "ldc",
            InstructionKind::Load(local) => LOADS[local.ty.slot()],
            InstructionKind::Store(local) => STORES[local.ty.slot()],
            InstructionKind::Arithmetic(op, ty) => ARITHMETIC[*op as usize][*ty as usize],
            InstructionKind::Pop => "pop",
            InstructionKind::Pop2 => "pop2",
            InstructionKind::Dup => "dup",
            InstructionKind::Dup2 => "dup2",
            InstructionKind::New(_) => "new",
            InstructionKind::GetField(_) => "getfield",
            InstructionKind::PutField(_) => "putfield",
            InstructionKind::GetStatic(_) => "getstatic",
            InstructionKind::PutStatic(_) => "putstatic",
            InstructionKind::Invoke(kind, _) => kind.into(),
            InstructionKind::Goto(_) => "goto",
            InstructionKind::If(cond, _) => cond.into(),
            InstructionKind::Return(None) => "return",
            InstructionKind::Return(Some(ty)) => RETURNS[ty.slot()],
            InstructionKind::Throw => "athrow",
        }
    }

    /// The number of values this instruction pops and pushes.
    #[must_use]
    pub fn stack_effect(&self) -> StackEffect {
        match self {
            InstructionKind::Nop | InstructionKind::Goto(_) | InstructionKind::Return(None) => {
                StackEffect::new(0, 0)
            }
            InstructionKind::AConstNull
            | InstructionKind::Ldc(_)
            | InstructionKind::Load(_)
            | InstructionKind::New(_)
            | InstructionKind::GetStatic(_) => StackEffect::new(0, 1),
            InstructionKind::Store(_)
            | InstructionKind::Pop
            | InstructionKind::Pop2
            | InstructionKind::PutStatic(_)
            | InstructionKind::Return(Some(_))
            | InstructionKind::Throw => StackEffect::new(1, 0),
            InstructionKind::Arithmetic(op, _) => StackEffect::new(op.operands(), 1),
            InstructionKind::Dup | InstructionKind::Dup2 => StackEffect::new(1, 2),
            InstructionKind::GetField(_) => StackEffect::new(1, 1),
            InstructionKind::PutField(_) => StackEffect::new(2, 0),
            InstructionKind::Invoke(kind, method) => {
                let signature = method.signature();
                let receiver = u16::from(*kind != InvokeKind::Static);
                let args = u16::try_from(signature.params.len()).unwrap_or(u16::MAX);
                StackEffect::new(
                    args.saturating_add(receiver),
                    u16::from(signature.ret.is_some()),
                )
            }
            InstructionKind::If(cond, _) => StackEffect::new(cond.operands(), 0),
        }
    }

    /// Returns `true` for the stack-duplicating instructions.
    #[must_use]
    pub fn is_duplication(&self) -> bool {
        matches!(self, InstructionKind::Dup | InstructionKind::Dup2)
    }

    /// Returns `true` if executing the instruction has an effect beyond its stack
    /// results: calls, field access, allocation, integer division (which may throw),
    /// local stores and control transfers.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstructionKind::Invoke(..)
            | InstructionKind::GetField(_)
            | InstructionKind::PutField(_)
            | InstructionKind::GetStatic(_)
            | InstructionKind::PutStatic(_)
            | InstructionKind::New(_)
            | InstructionKind::Store(_)
            | InstructionKind::Goto(_)
            | InstructionKind::If(..)
            | InstructionKind::Return(_)
            | InstructionKind::Throw => true,
            InstructionKind::Arithmetic(ArithmeticOp::Div | ArithmeticOp::Rem, ty) => {
                matches!(ty, NumericType::Int | NumericType::Long)
            }
            _ => false,
        }
    }

    /// The referenced field, for field-access instructions.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            InstructionKind::GetField(field)
            | InstructionKind::PutField(field)
            | InstructionKind::GetStatic(field)
            | InstructionKind::PutStatic(field) => Some(field),
            _ => None,
        }
    }

    /// The referenced method, for invocations.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match self {
            InstructionKind::Invoke(_, method) => Some(method),
            _ => None,
        }
    }

    /// Size of the encoded instruction in bytes, used to lay out program counters.
    #[must_use]
    pub fn encoded_len(&self) -> u32 {
        match self {
            InstructionKind::Ldc(constant) => constant.encoded_len(),
            InstructionKind::Load(local) | InstructionKind::Store(local) => match local.index {
                0..=3 => 1,
                4..=255 => 2,
                _ => 4,
            },
            InstructionKind::New(_)
            | InstructionKind::GetField(_)
            | InstructionKind::PutField(_)
            | InstructionKind::GetStatic(_)
            | InstructionKind::PutStatic(_)
            | InstructionKind::Goto(_)
            | InstructionKind::If(..) => 3,
            InstructionKind::Invoke(InvokeKind::Interface, _) => 5,
            InstructionKind::Invoke(..) => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            InstructionKind::Ldc(constant) => write!(f, "{mnemonic} {constant}"),
            InstructionKind::Load(local) | InstructionKind::Store(local) => {
                write!(f, "{mnemonic} {}", local.index)
            }
            InstructionKind::New(class) => write!(f, "{mnemonic} {class}"),
            InstructionKind::GetField(field)
            | InstructionKind::PutField(field)
            | InstructionKind::GetStatic(field)
            | InstructionKind::PutStatic(field) => write!(f, "{mnemonic} {field}"),
            InstructionKind::Invoke(_, method) => write!(f, "{mnemonic} {method}"),
            InstructionKind::Goto(target) | InstructionKind::If(_, target) => {
                write!(f, "{mnemonic} {target}")
            }
            _ => f.write_str(mnemonic),
        }
    }
}

/// One instruction of a method body.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    id: InstructionId,
    pc: u32,
    kind: InstructionKind,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(id: InstructionId, pc: u32, kind: InstructionKind) -> Self {
        Instruction { id, pc, kind }
    }

    /// Stable identity within the owning code.
    #[must_use]
    pub fn id(&self) -> InstructionId {
        self.id
    }

    /// Program counter the instruction was decoded at.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Operation and operands.
    #[must_use]
    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    /// Shorthand for `self.kind().mnemonic()`.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.kind.mnemonic()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.pc, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> FieldRef {
        FieldRef::new("a/B", "x", "J").unwrap()
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(InstructionKind::AConstNull.mnemonic(), "aconst_null");
        assert_eq!(
            InstructionKind::Load(LocalVariable::new(LocalType::Reference, 0)).mnemonic(),
            "aload"
        );
        assert_eq!(
            InstructionKind::Store(LocalVariable::new(LocalType::Double, 2)).mnemonic(),
            "dstore"
        );
        assert_eq!(
            InstructionKind::Arithmetic(ArithmeticOp::Ushr, NumericType::Long).mnemonic(),
            "lushr"
        );
        assert_eq!(
            InstructionKind::If(Condition::ICmpGe, 10).mnemonic(),
            "if_icmpge"
        );
        assert_eq!(
            InstructionKind::Return(Some(LocalType::Int)).mnemonic(),
            "ireturn"
        );
        assert_eq!(InstructionKind::Throw.mnemonic(), "athrow");
    }

    #[test]
    fn test_stack_effects() {
        assert_eq!(InstructionKind::Dup.stack_effect(), StackEffect::new(1, 2));
        assert_eq!(
            InstructionKind::PutField(field()).stack_effect(),
            StackEffect::new(2, 0)
        );
        assert_eq!(
            InstructionKind::Arithmetic(ArithmeticOp::Neg, NumericType::Int).stack_effect(),
            StackEffect::new(1, 1)
        );

        let ctor = MethodRef::new("a/B", "<init>", "(IJ)V").unwrap();
        assert_eq!(
            InstructionKind::Invoke(InvokeKind::Special, ctor.clone()).stack_effect(),
            StackEffect::new(3, 0)
        );
        assert_eq!(
            InstructionKind::Invoke(InvokeKind::Static, ctor).stack_effect(),
            StackEffect::new(2, 0)
        );

        let getter = MethodRef::new("a/B", "get", "()I").unwrap();
        assert_eq!(
            InstructionKind::Invoke(InvokeKind::Virtual, getter).stack_effect(),
            StackEffect::new(1, 1)
        );
    }

    #[test]
    fn test_side_effects() {
        assert!(InstructionKind::New("a/B".into()).has_side_effects());
        assert!(InstructionKind::GetStatic(field()).has_side_effects());
        assert!(
            InstructionKind::Arithmetic(ArithmeticOp::Div, NumericType::Int).has_side_effects()
        );
        assert!(
            !InstructionKind::Arithmetic(ArithmeticOp::Div, NumericType::Double).has_side_effects()
        );
        assert!(!InstructionKind::Ldc(Constant::Int(3)).has_side_effects());
        assert!(!InstructionKind::Dup.has_side_effects());
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(InstructionKind::Ldc(Constant::Int(5)).encoded_len(), 1);
        assert_eq!(InstructionKind::Ldc(Constant::Int(100)).encoded_len(), 2);
        assert_eq!(InstructionKind::Ldc(Constant::Int(1000)).encoded_len(), 3);
        assert_eq!(InstructionKind::Ldc(Constant::Int(100_000)).encoded_len(), 2);
        assert_eq!(InstructionKind::Ldc(Constant::Long(7)).encoded_len(), 3);
        assert_eq!(
            InstructionKind::Load(LocalVariable::new(LocalType::Int, 300)).encoded_len(),
            4
        );
    }

    #[test]
    fn test_display() {
        let insn = Instruction::new(
            InstructionId::new(3),
            12,
            InstructionKind::GetField(field()),
        );
        assert_eq!(insn.to_string(), "  12: getfield a/B.x:J");
        assert_eq!(insn.id().to_string(), "#3");
    }
}
