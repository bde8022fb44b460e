//! CPS-IR variables.
//!
//! A variable is identified by its serial and kind. The origin only documents where the
//! variable came from (which stack slot, which local, a continuation parameter, ...)
//! and is carried along when a pass renames the variable.
//!
//! Serials minted by the block translator count up from `1`; every variable created
//! afterwards by a rewriting pass counts down from `-1`. Renamed copies of a variable
//! therefore never collide with the variables they replace.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use crate::bir::Kind;

/// Where a variable originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableOrigin {
    /// Incoming method argument. For instance methods, argument `0` is the receiver.
    MethodParameter(u16),
    /// Local variable slot.
    LocalVariable(u16),
    /// Operand stack slot, counted from the bottom of the stack.
    StackVariable(u16),
    /// Intermediate value introduced by the translator or a rewriting pass.
    Temporary,
    /// The continuation receiving a method's (or block's) normal result.
    NormalContinuationParameter,
    /// The continuation receiving a thrown exception.
    ExceptionContinuationParameter,
}

impl VariableOrigin {
    /// Returns `true` for the two continuation parameter origins.
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        matches!(
            self,
            Self::NormalContinuationParameter | Self::ExceptionContinuationParameter
        )
    }

    /// Returns `true` for local and stack slot origins.
    #[must_use]
    pub const fn is_slot(&self) -> bool {
        matches!(self, Self::LocalVariable(_) | Self::StackVariable(_))
    }
}

impl fmt::Display for VariableOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodParameter(index) => write!(f, "p{index}"),
            Self::LocalVariable(slot) => write!(f, "l{slot}"),
            Self::StackVariable(slot) => write!(f, "s{slot}"),
            Self::Temporary => f.write_str("t"),
            Self::NormalContinuationParameter => f.write_str("cc"),
            Self::ExceptionContinuationParameter => f.write_str("ce"),
        }
    }
}

/// A CPS-IR variable.
///
/// Continuation parameters carry the kind of the value they receive: the method's
/// return kind for the normal continuation and [`Kind::Reference`] for the exception
/// continuation.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    origin: VariableOrigin,
    kind: Kind,
    serial: i64,
}

impl Variable {
    pub(crate) fn new(origin: VariableOrigin, kind: Kind, serial: i64) -> Self {
        Self {
            origin,
            kind,
            serial,
        }
    }

    /// Where the variable came from.
    #[must_use]
    pub fn origin(&self) -> VariableOrigin {
        self.origin
    }

    /// Kind of the value bound to the variable.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Identifying serial.
    #[must_use]
    pub fn serial(&self) -> i64 {
        self.serial
    }

    /// Returns `true` if the variable was minted after translation.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.serial < 0
    }

    /// Returns `true` for continuation parameters.
    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.origin.is_continuation()
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial && self.kind == other.kind
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
        self.kind.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serial
            .cmp(&other.serial)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.serial)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_identity_is_serial_and_kind() {
        let a = Variable::new(VariableOrigin::StackVariable(0), Kind::Int, 4);
        let renamed_origin = Variable::new(VariableOrigin::Temporary, Kind::Int, 4);
        let other_kind = Variable::new(VariableOrigin::StackVariable(0), Kind::Long, 4);

        assert_eq!(a, renamed_origin);
        assert_ne!(a, other_kind);

        let set: HashSet<_> = [a, renamed_origin, other_kind].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_ordering_by_serial() {
        let low = Variable::new(VariableOrigin::Temporary, Kind::Int, -7);
        let high = Variable::new(VariableOrigin::LocalVariable(1), Kind::Int, 3);
        assert!(low < high);
        assert!(low.is_synthetic());
        assert!(!high.is_synthetic());
    }

    #[test]
    fn test_display() {
        let v = Variable::new(VariableOrigin::LocalVariable(1), Kind::Int, 5);
        assert_eq!(v.to_string(), "l1#5");
        let k = Variable::new(VariableOrigin::NormalContinuationParameter, Kind::Int, -2);
        assert_eq!(k.to_string(), "cc#-2");
    }
}
