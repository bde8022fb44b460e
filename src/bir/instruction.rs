//! Stack-machine instructions of the block IR.
//!
//! The opcode vocabulary is deliberately small: the decoding collaborator maps the raw
//! bytecode of the VM onto these shapes, widening sub-word kinds and folding the many
//! short-form encodings (`iload_0`, `iconst_m1`, ...) into their general form.
//!
//! Branch opcodes name their targets as indices into [`crate::bir::BirMethod::blocks`],
//! so a block's successor list can be derived from its terminator.

use std::fmt;

use crate::bir::{Constant, FieldRef, Kind, MethodRef, TypeRef};

/// Binary arithmetic, logic and shift operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division, throws on integral division by zero.
    Div,
    /// Remainder, throws on integral division by zero.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    UShr,
}

impl ArithmeticOp {
    /// Returns `true` if the operation can raise an exception for the given operand kind.
    #[must_use]
    pub const fn can_throw(self, kind: Kind) -> bool {
        matches!(self, Self::Div | Self::Rem) && matches!(kind, Kind::Int | Kind::Long)
    }

    /// Returns `true` for shifts, whose right operand is always an `Int`.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr | Self::UShr)
    }

    /// Lower-case mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::UShr => "ushr",
        }
    }
}

/// Relational operator of a conditional branch or switch case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,
    /// `<=`
    LessEqual,
}

impl Comparator {
    /// Evaluates the comparator on two integral operands.
    #[must_use]
    pub const fn evaluate(self, left: i64, right: i64) -> bool {
        match self {
            Self::Equal => left == right,
            Self::NotEqual => left != right,
            Self::Less => left < right,
            Self::GreaterEqual => left >= right,
            Self::Greater => left > right,
            Self::LessEqual => left <= right,
        }
    }

    /// Returns `true` if the comparator is only an identity test, which is all that is
    /// defined on references.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    /// Source-level symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::LessEqual => "<=",
        }
    }
}

/// Result of a floating-point comparison when either operand is `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareBias {
    /// Unordered compares as less (`-1`).
    Less,
    /// Unordered compares as greater (`1`).
    Greater,
}

/// Dispatch flavour of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Virtual dispatch on the receiver's class.
    Virtual,
    /// Direct call of an instance method (constructors, private and super calls).
    Special,
    /// Call of a static method.
    Static,
    /// Interface dispatch on the receiver.
    Interface,
}

impl InvokeKind {
    /// Returns `true` if the invocation passes a receiver.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !matches!(self, Self::Static)
    }

    /// Lower-case mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Virtual => "virtual",
            Self::Special => "special",
            Self::Static => "static",
            Self::Interface => "interface",
        }
    }
}

/// A stack-machine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Push a constant.
    Const(Constant),
    /// Push a local of the given kind.
    Load(Kind, u16),
    /// Pop into a local of the given kind.
    Store(Kind, u16),
    /// Add a constant to an `Int` local in place.
    Increment {
        /// The local slot.
        slot: u16,
        /// The amount to add.
        delta: i32,
    },
    /// Discard the top of the stack.
    Pop,
    /// Duplicate the top of the stack.
    Dup,
    /// Exchange the two topmost values.
    Swap,
    /// Binary operation on two operands of the given kind.
    Arithmetic(ArithmeticOp, Kind),
    /// Arithmetic negation.
    Negate(Kind),
    /// Three-way comparison pushing `-1`, `0` or `1` as an `Int`.
    Compare(Kind, CompareBias),
    /// Primitive conversion.
    Convert {
        /// Kind of the popped operand.
        from: Kind,
        /// Kind of the pushed result.
        to: Kind,
    },
    /// Compare the top of the stack against zero (or null) and branch.
    IfZero {
        /// Relation tested.
        comparator: Comparator,
        /// `Int` or `Reference`.
        kind: Kind,
        /// Block taken when the relation holds.
        target: usize,
        /// Block taken otherwise.
        next: usize,
    },
    /// Compare the two topmost values and branch.
    If {
        /// Relation tested.
        comparator: Comparator,
        /// `Int` or `Reference`.
        kind: Kind,
        /// Block taken when the relation holds.
        target: usize,
        /// Block taken otherwise.
        next: usize,
    },
    /// Unconditional jump.
    Goto(usize),
    /// Dense multi-way branch on an `Int`.
    TableSwitch {
        /// Match value of the first target.
        low: i32,
        /// One target per consecutive match value.
        targets: Vec<usize>,
        /// Block taken when no case matches.
        default: usize,
    },
    /// Sparse multi-way branch on an `Int`.
    LookupSwitch {
        /// Match values.
        matches: Vec<i32>,
        /// Target per match value.
        targets: Vec<usize>,
        /// Block taken when no case matches.
        default: usize,
    },
    /// Return a value of the given kind, or nothing for [`Kind::Void`].
    Return(Kind),
    /// Throw the reference on top of the stack.
    Throw,
    /// Read an instance field.
    GetField(FieldRef),
    /// Write an instance field.
    PutField(FieldRef),
    /// Read a static field.
    GetStatic(FieldRef),
    /// Write a static field.
    PutStatic(FieldRef),
    /// Invoke a method.
    Invoke(InvokeKind, MethodRef),
    /// Allocate an uninitialized instance.
    New(TypeRef),
    /// Allocate an array of the given array type, popping its length.
    NewArray(TypeRef),
    /// Load an array element.
    ArrayLoad(Kind),
    /// Store an array element.
    ArrayStore(Kind),
    /// Push the length of an array.
    ArrayLength,
    /// Checked cast.
    CheckCast(TypeRef),
    /// Type test pushing an `Int` boolean.
    InstanceOf(TypeRef),
    /// Acquire the monitor of an object.
    MonitorEnter,
    /// Release the monitor of an object.
    MonitorExit,
}

impl Opcode {
    /// Returns `true` if the opcode ends a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::IfZero { .. }
                | Self::If { .. }
                | Self::Goto(_)
                | Self::TableSwitch { .. }
                | Self::LookupSwitch { .. }
                | Self::Return(_)
                | Self::Throw
        )
    }

    /// Control-flow targets of a terminator, in branch order, possibly with duplicates.
    #[must_use]
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Self::IfZero { target, next, .. } | Self::If { target, next, .. } => {
                vec![*target, *next]
            }
            Self::Goto(target) => vec![*target],
            Self::TableSwitch {
                targets, default, ..
            }
            | Self::LookupSwitch {
                targets, default, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "const {c}"),
            Self::Load(kind, slot) => write!(f, "load.{kind} {slot}"),
            Self::Store(kind, slot) => write!(f, "store.{kind} {slot}"),
            Self::Increment { slot, delta } => write!(f, "inc {slot} {delta}"),
            Self::Pop => f.write_str("pop"),
            Self::Dup => f.write_str("dup"),
            Self::Swap => f.write_str("swap"),
            Self::Arithmetic(op, kind) => write!(f, "{}.{kind}", op.mnemonic()),
            Self::Negate(kind) => write!(f, "neg.{kind}"),
            Self::Compare(kind, _) => write!(f, "cmp.{kind}"),
            Self::Convert { from, to } => write!(f, "conv.{from}.{to}"),
            Self::IfZero {
                comparator,
                target,
                next,
                ..
            } => write!(f, "if {} 0 -> {target} else {next}", comparator.symbol()),
            Self::If {
                comparator,
                target,
                next,
                ..
            } => write!(f, "if {} -> {target} else {next}", comparator.symbol()),
            Self::Goto(target) => write!(f, "goto {target}"),
            Self::TableSwitch { low, .. } => write!(f, "tableswitch {low}"),
            Self::LookupSwitch { matches, .. } => write!(f, "lookupswitch {matches:?}"),
            Self::Return(kind) => write!(f, "return.{kind}"),
            Self::Throw => f.write_str("throw"),
            Self::GetField(field) => write!(f, "getfield {field}"),
            Self::PutField(field) => write!(f, "putfield {field}"),
            Self::GetStatic(field) => write!(f, "getstatic {field}"),
            Self::PutStatic(field) => write!(f, "putstatic {field}"),
            Self::Invoke(kind, method) => write!(f, "invoke{} {method}", kind.mnemonic()),
            Self::New(ty) => write!(f, "new {ty}"),
            Self::NewArray(ty) => write!(f, "newarray {ty}"),
            Self::ArrayLoad(kind) => write!(f, "aload.{kind}"),
            Self::ArrayStore(kind) => write!(f, "astore.{kind}"),
            Self::ArrayLength => f.write_str("arraylength"),
            Self::CheckCast(ty) => write!(f, "checkcast {ty}"),
            Self::InstanceOf(ty) => write!(f, "instanceof {ty}"),
            Self::MonitorEnter => f.write_str("monitorenter"),
            Self::MonitorExit => f.write_str("monitorexit"),
        }
    }
}

/// A single instruction with its bytecode offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the instruction in the original bytecode.
    pub offset: u32,
    /// The operation.
    pub opcode: Opcode,
}

impl Instruction {
    /// Creates a new instruction.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode) -> Self {
        Self { offset, opcode }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}: {}", self.offset, self.opcode)
    }
}
