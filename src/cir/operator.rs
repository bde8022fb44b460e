//! Built-in procedures of the CPS-IR.
//!
//! Three families of procedures are not closures:
//!
//! - [`JavaOperator`] - the high-level VM operations of HCIR, removed by lowering
//! - [`Builtin`] - target-neutral primitives of LCIR, plus the arithmetic family that is
//!   shared by both levels
//! - [`Switch`] - multi-way branches, the only procedures that choose between
//!   continuations
//!
//! Operator and builtin calls take their regular arguments followed by a normal and an
//! exception continuation. Switch calls take the discriminant, the match values, one
//! continuation per match value and a default continuation.

use std::fmt;

use crate::bir::{
    ArithmeticOp, Comparator, CompareBias, Constant, FieldRef, InvokeKind, Kind, MethodRef,
    TypeRef,
};

/// High-level VM operations, present only before lowering.
#[derive(Debug, Clone, PartialEq)]
pub enum JavaOperator {
    /// Read an instance field: `[object]`.
    GetField(FieldRef),
    /// Write an instance field: `[object, value]`.
    PutField(FieldRef),
    /// Read a static field: `[]`.
    GetStatic(FieldRef),
    /// Write a static field: `[value]`.
    PutStatic(FieldRef),
    /// Invoke a method: `[receiver?, arguments...]`.
    Invoke(InvokeKind, MethodRef),
    /// Allocate an uninitialized instance: `[]`.
    New(TypeRef),
    /// Allocate an array: `[length]`.
    NewArray(TypeRef),
    /// Load an element: `[array, index]`.
    ArrayLoad(Kind),
    /// Store an element: `[array, index, value]`.
    ArrayStore(Kind),
    /// Array length: `[array]`.
    ArrayLength,
    /// Checked cast passing the object on: `[object]`.
    CheckCast(TypeRef),
    /// Type test yielding an `Int` boolean: `[object]`.
    InstanceOf(TypeRef),
    /// Acquire a monitor: `[object]`.
    MonitorEnter,
    /// Release a monitor: `[object]`.
    MonitorExit,
    /// Throw: `[throwable]`.
    Throw,
}

impl JavaOperator {
    /// Number of regular arguments, excluding the two continuations.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::GetStatic(_) | Self::New(_) => 0,
            Self::GetField(_)
            | Self::PutStatic(_)
            | Self::NewArray(_)
            | Self::ArrayLength
            | Self::CheckCast(_)
            | Self::InstanceOf(_)
            | Self::MonitorEnter
            | Self::MonitorExit
            | Self::Throw => 1,
            Self::PutField(_) | Self::ArrayLoad(_) => 2,
            Self::ArrayStore(_) => 3,
            Self::Invoke(kind, method) => {
                method.parameter_kinds.len() + usize::from(kind.has_receiver())
            }
        }
    }

    /// Kind of the value passed to the normal continuation, `None` if nothing is passed.
    #[must_use]
    pub fn result_kind(&self) -> Option<Kind> {
        let kind = match self {
            Self::GetField(field) | Self::GetStatic(field) => field.kind,
            Self::Invoke(_, method) => method.return_kind,
            Self::New(_) | Self::NewArray(_) | Self::CheckCast(_) => Kind::Reference,
            Self::ArrayLoad(kind) => *kind,
            Self::ArrayLength | Self::InstanceOf(_) => Kind::Int,
            Self::PutField(_)
            | Self::PutStatic(_)
            | Self::ArrayStore(_)
            | Self::MonitorEnter
            | Self::MonitorExit
            | Self::Throw => Kind::Void,
        };
        (kind != Kind::Void).then_some(kind)
    }

    /// Returns `true` if the operation may transfer to its exception continuation.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        !matches!(self, Self::InstanceOf(_))
    }
}

impl fmt::Display for JavaOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetField(field) => write!(f, "getfield[{field}]"),
            Self::PutField(field) => write!(f, "putfield[{field}]"),
            Self::GetStatic(field) => write!(f, "getstatic[{field}]"),
            Self::PutStatic(field) => write!(f, "putstatic[{field}]"),
            Self::Invoke(kind, method) => write!(f, "invoke{}[{method}]", kind.mnemonic()),
            Self::New(ty) => write!(f, "new[{ty}]"),
            Self::NewArray(ty) => write!(f, "newarray[{ty}]"),
            Self::ArrayLoad(kind) => write!(f, "arrayload.{kind}"),
            Self::ArrayStore(kind) => write!(f, "arraystore.{kind}"),
            Self::ArrayLength => f.write_str("arraylength"),
            Self::CheckCast(ty) => write!(f, "checkcast[{ty}]"),
            Self::InstanceOf(ty) => write!(f, "instanceof[{ty}]"),
            Self::MonitorEnter => f.write_str("monitorenter"),
            Self::MonitorExit => f.write_str("monitorexit"),
            Self::Throw => f.write_str("throw"),
        }
    }
}

/// Primitive procedures.
#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    /// Binary arithmetic: `[left, right]`.
    Arithmetic(ArithmeticOp, Kind),
    /// Negation: `[operand]`.
    Negate(Kind),
    /// Three-way comparison yielding `-1`, `0` or `1`: `[left, right]`.
    Compare(Kind, CompareBias),
    /// Primitive conversion: `[operand]`.
    Convert {
        /// Operand kind.
        from: Kind,
        /// Result kind.
        to: Kind,
    },
    /// Throws if the reference is null: `[object]`.
    NullCheck,
    /// Throws if the index is outside the array: `[array, index]`.
    BoundsCheck,
    /// `[object]`
    ReadField(FieldRef),
    /// `[object, value]`
    WriteField(FieldRef),
    /// `[]`
    ReadStatic(FieldRef),
    /// `[value]`
    WriteStatic(FieldRef),
    /// `[array]`
    ReadArrayLength,
    /// `[array, index]`
    ReadArrayElement(Kind),
    /// `[array, index, value]`
    WriteArrayElement(Kind),
    /// Looks up the virtual implementation for the receiver: `[receiver]`.
    SelectVirtual(MethodRef),
    /// Looks up the interface implementation for the receiver: `[receiver]`.
    SelectInterface(MethodRef),
    /// Statically bound call: `[receiver?, arguments...]`.
    CallDirect(MethodRef),
    /// Call through a selected entry point: `[entry, receiver, arguments...]`.
    CallIndirect(MethodRef),
    /// `[]`
    Allocate(TypeRef),
    /// `[length]`
    AllocateArray(TypeRef),
    /// Throws unless the object is null or a subtype, passes the object on: `[object]`.
    TypeCheck(TypeRef),
    /// Subtype test yielding an `Int` boolean: `[object]`.
    IsSubtype(TypeRef),
    /// `[object]`
    MonitorEnter,
    /// `[object]`
    MonitorExit,
    /// `[throwable]`
    Throw,
}

impl Builtin {
    /// Number of regular arguments, `None` for calls whose arity depends on the
    /// receiver convention.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::ReadStatic(_) | Self::Allocate(_) => Some(0),
            Self::Negate(_)
            | Self::Convert { .. }
            | Self::NullCheck
            | Self::ReadField(_)
            | Self::WriteStatic(_)
            | Self::ReadArrayLength
            | Self::SelectVirtual(_)
            | Self::SelectInterface(_)
            | Self::AllocateArray(_)
            | Self::TypeCheck(_)
            | Self::IsSubtype(_)
            | Self::MonitorEnter
            | Self::MonitorExit
            | Self::Throw => Some(1),
            Self::Arithmetic(..)
            | Self::Compare(..)
            | Self::BoundsCheck
            | Self::WriteField(_)
            | Self::ReadArrayElement(_) => Some(2),
            Self::WriteArrayElement(_) => Some(3),
            Self::CallDirect(_) | Self::CallIndirect(_) => None,
        }
    }

    /// Kind of the value passed to the normal continuation, `None` if nothing is passed.
    #[must_use]
    pub fn result_kind(&self) -> Option<Kind> {
        let kind = match self {
            Self::Arithmetic(_, kind) | Self::Negate(kind) | Self::ReadArrayElement(kind) => {
                *kind
            }
            Self::Compare(..) | Self::ReadArrayLength | Self::IsSubtype(_) => Kind::Int,
            Self::Convert { to, .. } => *to,
            Self::ReadField(field) | Self::ReadStatic(field) => field.kind,
            Self::SelectVirtual(_) | Self::SelectInterface(_) => Kind::Word,
            Self::CallDirect(method) | Self::CallIndirect(method) => method.return_kind,
            Self::Allocate(_) | Self::AllocateArray(_) | Self::TypeCheck(_) => Kind::Reference,
            Self::NullCheck
            | Self::BoundsCheck
            | Self::WriteField(_)
            | Self::WriteStatic(_)
            | Self::WriteArrayElement(_)
            | Self::MonitorEnter
            | Self::MonitorExit
            | Self::Throw => Kind::Void,
        };
        (kind != Kind::Void).then_some(kind)
    }

    /// Returns `true` if the primitive may transfer to its exception continuation.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        match self {
            Self::Arithmetic(op, kind) => op.can_throw(*kind),
            Self::WriteArrayElement(kind) => *kind == Kind::Reference,
            Self::Negate(_)
            | Self::Compare(..)
            | Self::Convert { .. }
            | Self::ReadField(_)
            | Self::WriteField(_)
            | Self::ReadArrayLength
            | Self::ReadArrayElement(_)
            | Self::SelectVirtual(_)
            | Self::IsSubtype(_) => false,
            Self::NullCheck
            | Self::BoundsCheck
            | Self::ReadStatic(_)
            | Self::WriteStatic(_)
            | Self::SelectInterface(_)
            | Self::CallDirect(_)
            | Self::CallIndirect(_)
            | Self::Allocate(_)
            | Self::AllocateArray(_)
            | Self::TypeCheck(_)
            | Self::MonitorEnter
            | Self::MonitorExit
            | Self::Throw => true,
        }
    }

    /// Returns `true` if the primitive can be evaluated at compile time.
    #[must_use]
    pub fn is_foldable(&self) -> bool {
        matches!(
            self,
            Self::Arithmetic(..) | Self::Negate(_) | Self::Compare(..) | Self::Convert { .. }
        )
    }

    /// Evaluates the primitive on constant regular arguments.
    ///
    /// Returns `None` if the primitive is not foldable, the arguments do not match its
    /// signature, or evaluation would throw (integral division by zero).
    #[must_use]
    pub fn fold(&self, arguments: &[Constant]) -> Option<Constant> {
        match (self, arguments) {
            (Self::Arithmetic(op, _), [left, right]) => fold_arithmetic(*op, *left, *right),
            (Self::Negate(_), [operand]) => match *operand {
                Constant::Int(v) => Some(Constant::Int(v.wrapping_neg())),
                Constant::Long(v) => Some(Constant::Long(v.wrapping_neg())),
                Constant::Float(v) => Some(Constant::Float(-v)),
                Constant::Double(v) => Some(Constant::Double(-v)),
                _ => None,
            },
            (Self::Compare(_, bias), [left, right]) => fold_compare(*bias, *left, *right),
            (Self::Convert { to, .. }, [operand]) => fold_convert(*operand, *to),
            _ => None,
        }
    }
}

fn fold_arithmetic(op: ArithmeticOp, left: Constant, right: Constant) -> Option<Constant> {
    use ArithmeticOp::{Add, And, Div, Mul, Or, Rem, Shl, Shr, Sub, UShr, Xor};

    match (left, right) {
        (Constant::Int(a), Constant::Int(b)) => Some(Constant::Int(match op {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div if b == 0 => return None,
            Div => a.wrapping_div(b),
            Rem if b == 0 => return None,
            Rem => a.wrapping_rem(b),
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
            Shl => a.wrapping_shl(b as u32),
            Shr => a.wrapping_shr(b as u32),
            UShr => (a as u32).wrapping_shr(b as u32) as i32,
        })),
        (Constant::Long(a), Constant::Int(b)) if op.is_shift() => Some(Constant::Long(match op {
            Shl => a.wrapping_shl(b as u32),
            Shr => a.wrapping_shr(b as u32),
            _ => (a as u64).wrapping_shr(b as u32) as i64,
        })),
        (Constant::Long(a), Constant::Long(b)) => Some(Constant::Long(match op {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div if b == 0 => return None,
            Div => a.wrapping_div(b),
            Rem if b == 0 => return None,
            Rem => a.wrapping_rem(b),
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
            Shl | Shr | UShr => return None,
        })),
        (Constant::Word(a), Constant::Int(b)) if op.is_shift() => Some(Constant::Word(match op {
            Shl => a.wrapping_shl(b as u32),
            Shr => (a as i64).wrapping_shr(b as u32) as u64,
            _ => a.wrapping_shr(b as u32),
        })),
        (Constant::Word(a), Constant::Word(b)) => Some(Constant::Word(match op {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div | Rem if b == 0 => return None,
            Div => a / b,
            Rem => a % b,
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
            Shl | Shr | UShr => return None,
        })),
        (Constant::Float(a), Constant::Float(b)) => Some(Constant::Float(match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => a / b,
            Rem => a % b,
            _ => return None,
        })),
        (Constant::Double(a), Constant::Double(b)) => Some(Constant::Double(match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => a / b,
            Rem => a % b,
            _ => return None,
        })),
        _ => None,
    }
}

fn fold_compare(bias: CompareBias, left: Constant, right: Constant) -> Option<Constant> {
    let unordered = match bias {
        CompareBias::Less => -1,
        CompareBias::Greater => 1,
    };
    let ordering = match (left, right) {
        (Constant::Int(a), Constant::Int(b)) => Some(a.cmp(&b)),
        (Constant::Long(a), Constant::Long(b)) => Some(a.cmp(&b)),
        (Constant::Float(a), Constant::Float(b)) => a.partial_cmp(&b),
        (Constant::Double(a), Constant::Double(b)) => a.partial_cmp(&b),
        _ => return None,
    };
    Some(Constant::Int(ordering.map_or(unordered, |o| o as i32)))
}

fn fold_convert(operand: Constant, to: Kind) -> Option<Constant> {
    let converted = match (operand, to) {
        (c, to) if c.kind() == to => c,
        (Constant::Int(v), Kind::Long) => Constant::Long(i64::from(v)),
        (Constant::Int(v), Kind::Float) => Constant::Float(v as f32),
        (Constant::Int(v), Kind::Double) => Constant::Double(f64::from(v)),
        (Constant::Int(v), Kind::Word) => Constant::Word(i64::from(v) as u64),
        (Constant::Long(v), Kind::Int) => Constant::Int(v as i32),
        (Constant::Long(v), Kind::Float) => Constant::Float(v as f32),
        (Constant::Long(v), Kind::Double) => Constant::Double(v as f64),
        (Constant::Long(v), Kind::Word) => Constant::Word(v as u64),
        (Constant::Float(v), Kind::Int) => Constant::Int(v as i32),
        (Constant::Float(v), Kind::Long) => Constant::Long(v as i64),
        (Constant::Float(v), Kind::Double) => Constant::Double(f64::from(v)),
        (Constant::Double(v), Kind::Int) => Constant::Int(v as i32),
        (Constant::Double(v), Kind::Long) => Constant::Long(v as i64),
        (Constant::Double(v), Kind::Float) => Constant::Float(v as f32),
        (Constant::Word(v), Kind::Int) => Constant::Int(v as i32),
        (Constant::Word(v), Kind::Long) => Constant::Long(v as i64),
        _ => return None,
    };
    Some(converted)
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arithmetic(op, kind) => write!(f, "{}.{kind}", op.mnemonic()),
            Self::Negate(kind) => write!(f, "neg.{kind}"),
            Self::Compare(kind, _) => write!(f, "cmp.{kind}"),
            Self::Convert { from, to } => write!(f, "conv.{from}.{to}"),
            Self::NullCheck => f.write_str("nullcheck"),
            Self::BoundsCheck => f.write_str("boundscheck"),
            Self::ReadField(field) => write!(f, "readfield[{field}]"),
            Self::WriteField(field) => write!(f, "writefield[{field}]"),
            Self::ReadStatic(field) => write!(f, "readstatic[{field}]"),
            Self::WriteStatic(field) => write!(f, "writestatic[{field}]"),
            Self::ReadArrayLength => f.write_str("readarraylength"),
            Self::ReadArrayElement(kind) => write!(f, "readelement.{kind}"),
            Self::WriteArrayElement(kind) => write!(f, "writeelement.{kind}"),
            Self::SelectVirtual(method) => write!(f, "selectvirtual[{method}]"),
            Self::SelectInterface(method) => write!(f, "selectinterface[{method}]"),
            Self::CallDirect(method) => write!(f, "calldirect[{method}]"),
            Self::CallIndirect(method) => write!(f, "callindirect[{method}]"),
            Self::Allocate(ty) => write!(f, "allocate[{ty}]"),
            Self::AllocateArray(ty) => write!(f, "allocatearray[{ty}]"),
            Self::TypeCheck(ty) => write!(f, "typecheck[{ty}]"),
            Self::IsSubtype(ty) => write!(f, "issubtype[{ty}]"),
            Self::MonitorEnter => f.write_str("monitorenter"),
            Self::MonitorExit => f.write_str("monitorexit"),
            Self::Throw => f.write_str("throw"),
        }
    }
}

/// A multi-way branch.
///
/// Called as `[discriminant, match_1..match_n, target_1..target_n, default]`. The first
/// case whose match value relates to the discriminant by `comparator` is taken; the
/// default continuation is taken when none does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Kind of the discriminant and match values.
    pub kind: Kind,
    /// Relation between discriminant and match value.
    pub comparator: Comparator,
    /// Number of cases, excluding the default.
    pub cases: usize,
}

impl Switch {
    /// Creates a switch.
    #[must_use]
    pub fn new(kind: Kind, comparator: Comparator, cases: usize) -> Self {
        Self {
            kind,
            comparator,
            cases,
        }
    }

    /// Number of arguments a call to this switch takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        2 * self.cases + 2
    }

    /// Selects the taken continuation for constant operands.
    ///
    /// Returns the index of the taken target, with `cases` denoting the default, or
    /// `None` if a comparison cannot be decided at compile time.
    #[must_use]
    pub fn select(&self, discriminant: &Constant, matches: &[Constant]) -> Option<usize> {
        if matches.len() != self.cases {
            return None;
        }
        for (index, value) in matches.iter().enumerate() {
            if self.holds(discriminant, value)? {
                return Some(index);
            }
        }
        Some(self.cases)
    }

    fn holds(&self, left: &Constant, right: &Constant) -> Option<bool> {
        match (left, right) {
            (Constant::Null, Constant::Null) if self.comparator.is_identity() => {
                Some(self.comparator == Comparator::Equal)
            }
            (Constant::Word(a), Constant::Word(b)) if self.comparator.is_identity() => {
                Some((a == b) == (self.comparator == Comparator::Equal))
            }
            _ => Some(
                self.comparator
                    .evaluate(left.as_i64()?, right.as_i64()?),
            ),
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "switch.{}{}/{}",
            self.kind,
            self.comparator.symbol(),
            self.cases
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_int_arithmetic() {
        let add = Builtin::Arithmetic(ArithmeticOp::Add, Kind::Int);
        assert_eq!(
            add.fold(&[Constant::Int(2), Constant::Int(3)]),
            Some(Constant::Int(5))
        );
        assert_eq!(
            add.fold(&[Constant::Int(i32::MAX), Constant::Int(1)]),
            Some(Constant::Int(i32::MIN))
        );

        let div = Builtin::Arithmetic(ArithmeticOp::Div, Kind::Int);
        assert_eq!(div.fold(&[Constant::Int(7), Constant::Int(0)]), None);
        assert_eq!(
            div.fold(&[Constant::Int(i32::MIN), Constant::Int(-1)]),
            Some(Constant::Int(i32::MIN))
        );
    }

    #[test]
    fn test_fold_shifts_mask_amount() {
        let shl = Builtin::Arithmetic(ArithmeticOp::Shl, Kind::Int);
        assert_eq!(
            shl.fold(&[Constant::Int(1), Constant::Int(33)]),
            Some(Constant::Int(2))
        );
        let ushr = Builtin::Arithmetic(ArithmeticOp::UShr, Kind::Long);
        assert_eq!(
            ushr.fold(&[Constant::Long(-1), Constant::Int(60)]),
            Some(Constant::Long(15))
        );
    }

    #[test]
    fn test_fold_compare_nan_bias() {
        let less = Builtin::Compare(Kind::Double, CompareBias::Less);
        let greater = Builtin::Compare(Kind::Double, CompareBias::Greater);
        let nan = [Constant::Double(f64::NAN), Constant::Double(1.0)];
        assert_eq!(less.fold(&nan), Some(Constant::Int(-1)));
        assert_eq!(greater.fold(&nan), Some(Constant::Int(1)));
        assert_eq!(
            less.fold(&[Constant::Double(2.0), Constant::Double(1.0)]),
            Some(Constant::Int(1))
        );
    }

    #[test]
    fn test_fold_convert_saturates() {
        let conv = Builtin::Convert {
            from: Kind::Double,
            to: Kind::Int,
        };
        assert_eq!(conv.fold(&[Constant::Double(1e20)]), Some(Constant::Int(i32::MAX)));
        assert_eq!(conv.fold(&[Constant::Double(f64::NAN)]), Some(Constant::Int(0)));
    }

    #[test]
    fn test_non_foldable_builtins() {
        assert!(!Builtin::NullCheck.is_foldable());
        assert_eq!(Builtin::NullCheck.fold(&[Constant::Null]), None);
        assert!(Builtin::NullCheck.can_throw());
        assert!(!Builtin::Arithmetic(ArithmeticOp::Add, Kind::Int).can_throw());
    }

    #[test]
    fn test_switch_select() {
        let table = Switch::new(Kind::Int, Comparator::Equal, 3);
        let matches = [Constant::Int(10), Constant::Int(11), Constant::Int(12)];
        assert_eq!(table.select(&Constant::Int(11), &matches), Some(1));
        assert_eq!(table.select(&Constant::Int(99), &matches), Some(3));
        assert_eq!(table.arity(), 8);

        let null_test = Switch::new(Kind::Reference, Comparator::Equal, 1);
        assert_eq!(null_test.select(&Constant::Null, &[Constant::Null]), Some(0));

        let less = Switch::new(Kind::Int, Comparator::Less, 1);
        assert_eq!(less.select(&Constant::Int(5), &[Constant::Int(3)]), Some(1));
        assert_eq!(less.select(&Constant::Double(5.0), &[Constant::Int(3)]), None);
    }

    #[test]
    fn test_operator_arity() {
        let method = MethodRef::new("A", "f", &[Kind::Int, Kind::Int], Kind::Void);
        assert_eq!(JavaOperator::Invoke(InvokeKind::Virtual, method.clone()).arity(), 3);
        assert_eq!(JavaOperator::Invoke(InvokeKind::Static, method).arity(), 2);
        assert_eq!(JavaOperator::ArrayStore(Kind::Int).arity(), 3);
        assert_eq!(JavaOperator::PutField(FieldRef::new("A", "x", Kind::Int)).result_kind(), None);
        assert!(!JavaOperator::InstanceOf(TypeRef::new("A")).can_throw());
    }
}
