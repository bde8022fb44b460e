//! Compile-time evaluation of builtins and switches with constant operands.

use crate::{
    bir::Constant,
    cir::{Call, CallId, CirGraph, Value},
};

/// Rewrites `builtin(c.., k, e)` into `k(result)`.
///
/// Returns `false` unless the builtin is foldable, every regular argument is a
/// constant and evaluation succeeds.
pub(crate) fn fold_builtin(graph: &mut CirGraph, id: CallId) -> bool {
    let call = graph.call(id);
    let Value::Builtin(builtin) = &call.procedure else {
        return false;
    };
    if !builtin.is_foldable() {
        return false;
    }
    let Some(arity) = builtin.arity() else {
        return false;
    };
    if call.arguments.len() != arity + 2 {
        return false;
    }

    let Some(operands) = call.arguments[..arity]
        .iter()
        .map(Value::as_constant)
        .collect::<Option<Vec<Constant>>>()
    else {
        return false;
    };
    let Some(result) = builtin.fold(&operands) else {
        return false;
    };

    let continuation = call.arguments[arity].clone();
    let location = call.location;
    graph.replace_call(
        id,
        Call::new(continuation, vec![Value::Constant(result)]).at(location),
    );
    true
}

/// Rewrites a switch with constant discriminant and match values into a call of the
/// taken continuation.
pub(crate) fn fold_switch(graph: &mut CirGraph, id: CallId) -> bool {
    let call = graph.call(id);
    let Value::Switch(switch) = call.procedure else {
        return false;
    };
    if call.arguments.len() != switch.arity() {
        return false;
    }

    let Some(discriminant) = call.arguments[0].as_constant() else {
        return false;
    };
    let Some(matches) = call.arguments[1..=switch.cases]
        .iter()
        .map(Value::as_constant)
        .collect::<Option<Vec<Constant>>>()
    else {
        return false;
    };
    let Some(taken) = switch.select(&discriminant, &matches) else {
        return false;
    };

    let target = call.arguments[switch.cases + 1 + taken].clone();
    let location = call.location;
    graph.replace_call(id, Call::new(target, Vec::new()).at(location));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{ArithmeticOp, Comparator, Kind, MethodActor},
        cir::{Builtin, Switch, VariableOrigin},
    };

    #[test]
    fn test_fold_builtin_passes_result_on() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Int));
        let cc = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, Kind::Int);
        let id = graph.add_call(Call::new(
            Value::Builtin(Builtin::Arithmetic(ArithmeticOp::Mul, Kind::Int)),
            vec![
                Value::Constant(Constant::Int(6)),
                Value::Constant(Constant::Int(7)),
                Value::Variable(cc),
                Value::Undefined,
            ],
        ));

        assert!(fold_builtin(&mut graph, id));
        assert_eq!(graph.call(id).procedure, Value::Variable(cc));
        assert_eq!(graph.call(id).arguments, vec![Value::Constant(Constant::Int(42))]);
        assert!(!fold_builtin(&mut graph, id));
    }

    #[test]
    fn test_division_by_zero_is_kept() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Int));
        let cc = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, Kind::Int);
        let ce = graph.fresh_variable(VariableOrigin::ExceptionContinuationParameter, Kind::Reference);
        let id = graph.add_call(Call::new(
            Value::Builtin(Builtin::Arithmetic(ArithmeticOp::Div, Kind::Int)),
            vec![
                Value::Constant(Constant::Int(1)),
                Value::Constant(Constant::Int(0)),
                Value::Variable(cc),
                Value::Variable(ce),
            ],
        ));
        assert!(!fold_builtin(&mut graph, id));
    }

    #[test]
    fn test_fold_switch_takes_default() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Void));
        let taken = graph.fresh_variable(VariableOrigin::Temporary, Kind::Void);
        let default = graph.fresh_variable(VariableOrigin::Temporary, Kind::Void);
        let id = graph.add_call(Call::new(
            Value::Switch(Switch::new(Kind::Int, Comparator::Equal, 1)),
            vec![
                Value::Constant(Constant::Int(1)),
                Value::Constant(Constant::Int(0)),
                Value::Variable(taken),
                Value::Variable(default),
            ],
        ));

        assert!(fold_switch(&mut graph, id));
        assert_eq!(graph.call(id).procedure, Value::Variable(default));
        assert!(graph.call(id).arguments.is_empty());
    }
}
