//! Constant propagation over the CPS-IR.
//!
//! A second client of the framework: tracks which variables are bound to the same
//! constant on every path, folding foldable builtins whose operands are known.

use crate::{
    bir::Constant,
    cir::{CallId, CirGraph, Value},
    dataflow::{DataFlowAnalysis, Environment, MeetSemiLattice},
};

/// Abstract value of the constant propagation lattice.
#[derive(Debug, Clone, Copy)]
pub enum ConstantValue {
    /// Not reached yet (top).
    Undetermined,
    /// Bound to this constant on every path reached so far.
    Constant(Constant),
    /// Bound to different values (bottom).
    Varying,
}

impl ConstantValue {
    /// Returns the constant if the value is known.
    #[must_use]
    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Self::Constant(c) => Some(*c),
            _ => None,
        }
    }
}

fn same_constant(left: &Constant, right: &Constant) -> bool {
    match (left, right) {
        (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
        (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
        _ => left == right,
    }
}

// Bitwise equality on floats keeps `NaN` stable, which the solver needs to detect
// a fixpoint.
impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undetermined, Self::Undetermined) | (Self::Varying, Self::Varying) => true,
            (Self::Constant(a), Self::Constant(b)) => same_constant(a, b),
            _ => false,
        }
    }
}

impl MeetSemiLattice for ConstantValue {
    fn top() -> Self {
        Self::Undetermined
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Undetermined, x) | (x, Self::Undetermined) => *x,
            (Self::Constant(a), Self::Constant(b)) if same_constant(a, b) => *self,
            _ => Self::Varying,
        }
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Self::Varying)
    }
}

/// The constant propagation analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantPropagation;

impl DataFlowAnalysis for ConstantPropagation {
    type Lattice = ConstantValue;

    fn name(&self) -> &'static str {
        "constant propagation"
    }

    fn boundary(&self, graph: &CirGraph) -> Environment<ConstantValue> {
        graph
            .closure(graph.entry())
            .parameters
            .iter()
            .map(|parameter| (*parameter, ConstantValue::Varying))
            .collect()
    }

    fn evaluate(&self, value: &Value, env: &Environment<ConstantValue>) -> ConstantValue {
        match value {
            Value::Constant(c) => ConstantValue::Constant(*c),
            Value::Variable(v) => env.get(v).copied().unwrap_or(ConstantValue::Undetermined),
            _ => ConstantValue::Varying,
        }
    }

    fn result(
        &self,
        graph: &CirGraph,
        call: CallId,
        env: &Environment<ConstantValue>,
    ) -> ConstantValue {
        let call = graph.call(call);
        match &call.procedure {
            Value::Constant(c) => ConstantValue::Constant(*c),
            Value::Builtin(builtin) if builtin.is_foldable() => {
                let regular = call.arguments.len().saturating_sub(2);
                let mut operands = Vec::with_capacity(regular);
                for argument in &call.arguments[..regular] {
                    match self.evaluate(argument, env) {
                        ConstantValue::Constant(c) => operands.push(c),
                        other => return other,
                    }
                }
                builtin
                    .fold(&operands)
                    .map_or(ConstantValue::Varying, ConstantValue::Constant)
            }
            _ => ConstantValue::Varying,
        }
    }

    fn exception(&self) -> ConstantValue {
        ConstantValue::Varying
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meet() {
        let two = ConstantValue::Constant(Constant::Int(2));
        let three = ConstantValue::Constant(Constant::Int(3));
        assert_eq!(two.meet(&ConstantValue::Undetermined), two);
        assert_eq!(two.meet(&two), two);
        assert_eq!(two.meet(&three), ConstantValue::Varying);
        assert!(ConstantValue::Varying.is_bottom());
    }

    #[test]
    fn test_nan_is_stable() {
        let nan = ConstantValue::Constant(Constant::Double(f64::NAN));
        assert_eq!(nan, nan);
        assert_eq!(nan.meet(&nan), nan);
    }
}
