//! Operand values of CPS-IR calls.

use std::fmt;

use crate::{
    bir::Constant,
    cir::{BlockId, Builtin, ClosureId, JavaOperator, Switch, Variable},
};

/// Anything that can appear as the procedure or an argument of a [`crate::cir::Call`].
///
/// Closures are owned by exactly one value: the tree of closures hanging off a call is
/// never shared. Blocks are the only shareable procedures and are referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Immediate literal.
    Constant(Constant),
    /// Reference to a bound variable.
    Variable(Variable),
    /// Anonymous procedure, exclusively owned by this value.
    Closure(ClosureId),
    /// Shared, named procedure.
    Block(BlockId),
    /// Primitive procedure.
    Builtin(Builtin),
    /// High-level VM operation.
    Operator(JavaOperator),
    /// Multi-way branch.
    Switch(Switch),
    /// Placeholder for "no continuation", e.g. the exception continuation of an
    /// operation that cannot throw.
    Undefined,
}

impl Value {
    /// Returns the variable if this value is one.
    #[must_use]
    pub fn as_variable(&self) -> Option<Variable> {
        match self {
            Self::Variable(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the constant if this value is one.
    #[must_use]
    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Self::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns the closure id if this value is a closure.
    #[must_use]
    pub fn as_closure(&self) -> Option<ClosureId> {
        match self {
            Self::Closure(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns the block id if this value is a block.
    #[must_use]
    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Self::Block(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for values that may be duplicated freely: variables, constants and
    /// [`Value::Undefined`].
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            Self::Variable(_) | Self::Constant(_) | Self::Undefined
        )
    }

    /// Returns `true` for [`Value::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<Variable> for Value {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<Constant> for Value {
    fn from(constant: Constant) -> Self {
        Self::Constant(constant)
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Self::Builtin(builtin)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{c}"),
            Self::Variable(v) => write!(f, "{v}"),
            Self::Closure(c) => write!(f, "{c}"),
            Self::Block(b) => write!(f, "{b}"),
            Self::Builtin(b) => write!(f, "{b}"),
            Self::Operator(op) => write!(f, "{op}"),
            Self::Switch(s) => write!(f, "{s}"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}
