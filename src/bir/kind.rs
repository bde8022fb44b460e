//! Value kinds and compile-time constants.
//!
//! Every operand flowing through the stack machine, and every CIR variable derived
//! from it, carries a [`Kind`]. Immediate literals are represented by [`Constant`],
//! which is shared between the input block IR and the CPS-IR.

use std::fmt;

use strum::{EnumCount, EnumIter};

/// The machine-level kind of a value.
///
/// Sub-word integer kinds of the source language (byte, char, short, boolean) are
/// widened to [`Kind::Int`] by the decoding collaborator before they reach this
/// crate, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum Kind {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Managed object reference.
    Reference,
    /// Unmanaged machine word (pointers, addresses).
    Word,
    /// No value.
    Void,
}

impl Kind {
    /// Returns `true` for the integral kinds on which bitwise operations are defined.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Word)
    }

    /// Returns `true` for the floating-point kinds.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Returns `true` for managed references.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    /// Short mnemonic used by the pretty printer.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Reference => "ref",
            Self::Word => "word",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// An immediate literal value.
///
/// Floating-point constants compare by value, so two `NaN` constants are never
/// equal; folding never produces `NaN` from non-`NaN` inputs except through the
/// arithmetic itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// The null reference.
    Null,
    /// Machine word.
    Word(u64),
}

impl Constant {
    /// Returns the kind of this constant.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Int(_) => Kind::Int,
            Self::Long(_) => Kind::Long,
            Self::Float(_) => Kind::Float,
            Self::Double(_) => Kind::Double,
            Self::Null => Kind::Reference,
            Self::Word(_) => Kind::Word,
        }
    }

    /// Returns `true` if this is the null reference.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the constant as an `i32` if it is an integer constant.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the constant widened to `i64` if it is integral.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v as i64),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// The zero value of the given kind, `None` for [`Kind::Void`].
    #[must_use]
    pub const fn zero(kind: Kind) -> Option<Self> {
        match kind {
            Kind::Int => Some(Self::Int(0)),
            Kind::Long => Some(Self::Long(0)),
            Kind::Float => Some(Self::Float(0.0)),
            Kind::Double => Some(Self::Double(0.0)),
            Kind::Reference => Some(Self::Null),
            Kind::Word => Some(Self::Word(0)),
            Kind::Void => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}F"),
            Self::Double(v) => write!(f, "{v}D"),
            Self::Null => f.write_str("null"),
            Self::Word(v) => write!(f, "{v:#x}W"),
        }
    }
}
