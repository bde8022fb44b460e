//! Read-only verification of the CPS-IR invariants.

use std::fmt;

use crate::{
    cir::{visit, CallId, CirGraph, Level, Value, Variable},
    generator::EventLog,
    passes::CirPass,
    Error, Result,
};

/// Checks that every reachable call is complete and well-formed.
///
/// - no placeholder calls and no `Undefined` procedures
/// - closure and block calls pass one argument per parameter
/// - operator, builtin, switch and constant calls have the arity of their procedure
/// - no high-level operators remain once the graph is lowered
/// - with scoping enabled, every variable is bound by an enclosing closure, the
///   enclosing block or the method closure
#[derive(Debug, Clone)]
pub struct Verifier {
    stage: String,
    scoping: bool,
}

impl Verifier {
    /// A verifier reporting failures against `stage`.
    #[must_use]
    pub fn after(stage: impl fmt::Display) -> Self {
        Self {
            stage: stage.to_string(),
            scoping: true,
        }
    }

    /// Skips the scoping check, for graphs that are not closed yet.
    #[must_use]
    pub fn without_scoping(mut self) -> Self {
        self.scoping = false;
        self
    }

    /// Runs all checks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] describing the first violation found.
    pub fn verify(&self, graph: &CirGraph) -> Result<()> {
        let method_scope: imbl::HashSet<Variable> =
            graph.closure(graph.entry()).parameters.iter().copied().collect();

        for (block, root) in visit::reachable_roots(graph) {
            let mut scope = method_scope.clone();
            if block.is_some() {
                scope.extend(graph.closure(root).parameters.iter().copied());
            }
            let mut pending = vec![(graph.closure(root).body, scope)];

            while let Some((id, scope)) = pending.pop() {
                self.check_call(graph, id)?;
                let call = graph.call(id);
                if self.scoping {
                    if let Some(unbound) = visit::variables(call).find(|v| !scope.contains(v)) {
                        return Err(self.failure(graph, format!("{unbound} is not in scope at {id}")));
                    }
                }
                for inner in visit::nested_closures(call) {
                    let inner = graph.closure(inner);
                    let mut inner_scope = scope.clone();
                    inner_scope.extend(inner.parameters.iter().copied());
                    pending.push((inner.body, inner_scope));
                }
            }
        }
        Ok(())
    }

    fn check_call(&self, graph: &CirGraph, id: CallId) -> Result<()> {
        let call = graph.call(id);
        let passed = call.arguments.len();
        let expected = match &call.procedure {
            Value::Undefined => {
                return Err(self.failure(graph, format!("{id} has no procedure")));
            }
            Value::Closure(closure) => Some(graph.closure(*closure).parameters.len()),
            Value::Block(block) => {
                Some(graph.closure(graph.block(*block).closure()).parameters.len())
            }
            Value::Switch(switch) => Some(switch.arity()),
            Value::Operator(op) => {
                if graph.level() == Level::Low {
                    return Err(self.failure(graph, format!("operator {op} survived lowering at {id}")));
                }
                Some(op.arity() + 2)
            }
            Value::Builtin(builtin) => builtin.arity().map(|arity| arity + 2),
            Value::Constant(_) => Some(1),
            Value::Variable(_) => None,
        };

        match expected {
            Some(expected) if expected != passed => Err(self.failure(
                graph,
                format!("{id} calls {} with {passed} arguments, expected {expected}", call.procedure),
            )),
            _ => Ok(()),
        }
    }

    fn failure(&self, graph: &CirGraph, message: String) -> Error {
        Error::Verification {
            method: graph.method().to_string(),
            stage: self.stage.clone(),
            message,
        }
    }
}

impl CirPass for Verifier {
    fn name(&self) -> &'static str {
        "verifier"
    }

    fn run(&self, graph: &mut CirGraph, _events: &EventLog) -> Result<bool> {
        self.verify(graph)?;
        Ok(false)
    }

    fn description(&self) -> &'static str {
        "Checks arity and scoping invariants without modifying the graph"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{Kind, MethodActor},
        cir::{Call, VariableOrigin},
        passes::{AlphaConversion, FreeVariableCapture},
        test::branch_join_method,
        translate::translate,
    };

    #[test]
    fn test_open_graph_fails_scoping_until_captured() {
        let events = EventLog::new();
        let mut graph = translate(&branch_join_method(), &events).expect("translated");

        Verifier::after("initial build")
            .without_scoping()
            .verify(&graph)
            .expect("structurally sound");
        assert!(matches!(
            Verifier::after("initial build").verify(&graph),
            Err(Error::Verification { .. })
        ));

        FreeVariableCapture.run(&mut graph, &events).expect("captured");
        AlphaConversion.run(&mut graph, &events).expect("converted");
        Verifier::after("alpha").verify(&graph).expect("closed");
    }

    #[test]
    fn test_arity_mismatch() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Int));
        let cc = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, Kind::Int);
        let entry = graph.entry();
        graph.closure_mut(entry).parameters = vec![cc];
        let body = graph.closure(entry).body;

        // A constant yield takes exactly one continuation.
        graph.replace_call(
            body,
            Call::new(
                Value::Constant(crate::bir::Constant::Int(1)),
                vec![Value::Variable(cc), Value::Variable(cc)],
            ),
        );
        let error = Verifier::after("test").verify(&graph).expect_err("arity");
        assert!(error.to_string().contains("expected 1"), "{error}");

        graph.replace_call(
            body,
            Call::new(Value::Constant(crate::bir::Constant::Int(1)), vec![Value::Variable(cc)]),
        );
        Verifier::after("test").verify(&graph).expect("valid");
    }
}
