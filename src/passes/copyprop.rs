//! Copy propagation.
//!
//! Two local rewrites, applied until neither fires:
//!
//! - **Beta-reduction of trivial bindings**: `((x..) -> body)(a..)` where every `a` is
//!   a variable or constant becomes `body[x := a]`. This removes the assignments the
//!   translator emits for loads, stores and stack shuffling.
//! - **Eta-reduction of continuations**: a continuation argument `(x..) -> k(x..)`,
//!   with `k` a variable other than the `x`, is replaced by `k` itself.
//!
//! Substitution respects shadowing and avoids capture: an inner binder that would
//! capture a replacement is renamed first, so the pass is also correct before alpha
//! conversion.

use crate::{
    cir::{visit, CallId, CirGraph, ClosureId, Value, Variable},
    generator::{EventKind, EventLog},
    passes::CirPass,
    Result,
};

type Substitution = imbl::HashMap<Variable, Value>;

/// Substitution of trivial bindings and eta-reduction of forwarding continuations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPropagation;

impl CopyPropagation {
    /// Applies `substitution` to the closure tree hanging off `body`.
    pub(crate) fn substitute(graph: &mut CirGraph, body: CallId, substitution: Substitution) {
        let mut pending = vec![(body, substitution)];
        while let Some((id, substitution)) = pending.pop() {
            if substitution.is_empty() {
                continue;
            }
            let call = graph.call_mut(id);
            for value in std::iter::once(&mut call.procedure).chain(call.arguments.iter_mut()) {
                if let Value::Variable(variable) = value {
                    if let Some(replacement) = substitution.get(variable) {
                        *value = replacement.clone();
                    }
                }
            }

            let nested: Vec<ClosureId> = visit::nested_closures(graph.call(id)).collect();
            for inner in nested {
                let parameters = graph.closure(inner).parameters.clone();
                let mut scoped = substitution.clone();
                for parameter in &parameters {
                    scoped.remove(parameter);
                }
                let capturing: Vec<usize> = parameters
                    .iter()
                    .enumerate()
                    .filter(|(_, parameter)| {
                        scoped
                            .values()
                            .any(|value| value.as_variable() == Some(**parameter))
                    })
                    .map(|(position, _)| position)
                    .collect();
                for position in capturing {
                    let parameter = parameters[position];
                    let fresh = graph.rename(parameter);
                    graph.closure_mut(inner).parameters[position] = fresh;
                    scoped.insert(parameter, Value::Variable(fresh));
                }
                pending.push((graph.closure(inner).body, scoped));
            }
        }
    }

    /// Reduces `((x..) -> body)(a..)` at `id` if every argument is trivial.
    ///
    /// Returns `false` if the call is not such a redex.
    pub(crate) fn beta(graph: &mut CirGraph, id: CallId) -> bool {
        let call = graph.call(id);
        let Value::Closure(closure) = call.procedure else {
            return false;
        };
        let parameters = &graph.closure(closure).parameters;
        if parameters.len() != call.arguments.len()
            || !call
                .arguments
                .iter()
                .all(|a| matches!(a, Value::Variable(_) | Value::Constant(_)))
        {
            return false;
        }

        let substitution: Substitution = parameters
            .iter()
            .copied()
            .zip(call.arguments.iter().cloned())
            .collect();
        let body = graph.closure(closure).body;
        Self::substitute(graph, body, substitution);
        let reduced = graph.take_call(body);
        graph.replace_call(id, reduced);
        true
    }

    /// Replaces forwarding continuation arguments of the call at `id`.
    fn eta(graph: &mut CirGraph, id: CallId) -> usize {
        let mut reduced = 0;
        for position in 0..graph.call(id).arguments.len() {
            let Value::Closure(closure) = graph.call(id).arguments[position] else {
                continue;
            };
            let closure = graph.closure(closure);
            let body = graph.call(closure.body);
            let Value::Variable(target) = body.procedure else {
                continue;
            };
            let forwards = body.arguments.len() == closure.parameters.len()
                && body
                    .arguments
                    .iter()
                    .zip(&closure.parameters)
                    .all(|(argument, parameter)| argument.as_variable() == Some(*parameter))
                && !closure.parameters.contains(&target);
            if forwards {
                graph.call_mut(id).arguments[position] = Value::Variable(target);
                reduced += 1;
            }
        }
        reduced
    }
}

impl CirPass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy propagation"
    }

    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool> {
        let mut substituted = 0;
        let mut reduced = 0;

        loop {
            let before = (substituted, reduced);
            for id in visit::reachable_calls(graph) {
                // Reducing at `id` pulls the next redex into the same call.
                while Self::beta(graph, id) {
                    substituted += 1;
                }
                reduced += Self::eta(graph, id);
            }
            if (substituted, reduced) == before {
                break;
            }
        }

        if substituted > 0 {
            events
                .record(EventKind::CopyPropagated)
                .method(graph.method())
                .stage(self.name())
                .message(format!("{substituted} trivial bindings substituted"));
        }
        if reduced > 0 {
            events
                .record(EventKind::ContinuationEtaReduced)
                .method(graph.method())
                .stage(self.name())
                .message(format!("{reduced} continuations eta-reduced"));
        }
        Ok(substituted + reduced > 0)
    }

    fn description(&self) -> &'static str {
        "Substitutes trivial bindings and collapses forwarding continuations"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::Constant,
        cir::Builtin,
        passes::{AlphaConversion, FreeVariableCapture},
        test::{add_method, shadowed_stack_method},
        translate::translate,
    };

    #[test]
    fn test_add_collapses_to_one_call() {
        let events = EventLog::new();
        let mut graph = translate(&add_method(), &events).expect("translated");
        FreeVariableCapture.run(&mut graph, &events).expect("captured");
        AlphaConversion.run(&mut graph, &events).expect("converted");
        assert!(CopyPropagation.run(&mut graph, &events).expect("propagated"));

        let entry = graph.closure(graph.entry());
        let body = graph.call(entry.body);
        assert!(matches!(body.procedure, Value::Builtin(Builtin::Arithmetic(..))));
        assert_eq!(
            body.arguments,
            vec![
                Value::Variable(entry.parameters[0]),
                Value::Variable(entry.parameters[1]),
                Value::Variable(entry.parameters[2]),
                Value::Undefined,
            ]
        );
        assert!(events.has(EventKind::CopyPropagated));
        assert!(events.has(EventKind::ContinuationEtaReduced));

        assert!(!CopyPropagation.run(&mut graph, &events).expect("propagated"));
    }

    #[test]
    fn test_substitution_avoids_capture_without_alpha() {
        let events = EventLog::new();
        let mut graph = translate(&shadowed_stack_method(), &events).expect("translated");
        CopyPropagation.run(&mut graph, &events).expect("propagated");

        let cc = graph.closure(graph.entry()).parameters[0];
        let returns: Vec<CallId> = visit::reachable_calls(&graph)
            .into_iter()
            .filter(|&id| graph.call(id).procedure == Value::Variable(cc))
            .collect();
        assert_eq!(returns.len(), 1);

        let arguments = &graph.call(returns[0]).arguments;
        assert_eq!(arguments.len(), 1);
        let result = arguments[0].as_variable().expect("invoke result returned");
        assert_ne!(arguments[0], Value::Constant(Constant::Int(5)));

        // The returned variable is the one bound by the invoke's continuation.
        let bound_by_invoke = visit::reachable_calls(&graph).into_iter().any(|id| {
            let call = graph.call(id);
            matches!(call.procedure, Value::Operator(_))
                && call.arguments.iter().any(|argument| match argument {
                    Value::Closure(k) => graph.closure(*k).parameters.contains(&result),
                    _ => false,
                })
        });
        assert!(bound_by_invoke);
    }
}
