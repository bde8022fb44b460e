//! Alpha-conversion.
//!
//! Every binding occurrence in the reachable graph receives a fresh synthetic
//! variable and every use is renamed consistently. Afterwards no variable is bound
//! twice, which later passes rely on when they substitute without tracking scopes.

use crate::{
    cir::{visit, CallId, CirGraph, ClosureId, Value, Variable},
    generator::EventLog,
    passes::CirPass,
    Result,
};

type Renaming = imbl::HashMap<Variable, Variable>;

/// Consistent renaming of all bound variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaConversion;

impl AlphaConversion {
    /// Renames the parameters of `closure`, extending `env`.
    fn bind(graph: &mut CirGraph, closure: ClosureId, mut env: Renaming) -> Renaming {
        let parameters = graph.closure(closure).parameters.clone();
        let renamed = parameters
            .into_iter()
            .map(|parameter| {
                let fresh = graph.rename(parameter);
                env.insert(parameter, fresh);
                fresh
            })
            .collect();
        graph.closure_mut(closure).parameters = renamed;
        env
    }

    fn convert(graph: &mut CirGraph, body: CallId, env: Renaming) {
        let mut pending = vec![(body, env)];
        while let Some((id, env)) = pending.pop() {
            let call = graph.call_mut(id);
            for value in std::iter::once(&mut call.procedure).chain(call.arguments.iter_mut()) {
                if let Value::Variable(variable) = value {
                    if let Some(renamed) = env.get(variable) {
                        *variable = *renamed;
                    }
                }
            }

            let nested: Vec<ClosureId> = visit::nested_closures(graph.call(id)).collect();
            for inner in nested {
                let inner_env = Self::bind(graph, inner, env.clone());
                pending.push((graph.closure(inner).body, inner_env));
            }
        }
    }
}

impl CirPass for AlphaConversion {
    fn name(&self) -> &'static str {
        "alpha"
    }

    fn run(&self, graph: &mut CirGraph, _events: &EventLog) -> Result<bool> {
        // Blocks are collected first: renaming does not change the block structure.
        let blocks = visit::reachable_blocks(graph);

        let entry = graph.entry();
        let method_env = Self::bind(graph, entry, Renaming::new());
        let body = graph.closure(entry).body;
        Self::convert(graph, body, method_env.clone());

        for block in blocks {
            let closure = graph.block(block).closure();
            let env = Self::bind(graph, closure, method_env.clone());
            let body = graph.closure(closure).body;
            Self::convert(graph, body, env);
        }
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Gives every bound variable a fresh, unique name"
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;
    use crate::{
        passes::FreeVariableCapture,
        test::{exception_handler_method, loop_method},
        translate::translate,
    };

    fn bound_variables(graph: &CirGraph) -> Vec<Variable> {
        visit::reachable_roots(graph)
            .into_iter()
            .flat_map(|(_, root)| visit::closures_within(graph, root))
            .flat_map(|closure| graph.closure(closure).parameters.clone())
            .collect()
    }

    #[test]
    fn test_bound_variables_are_unique() {
        for method in [loop_method(), exception_handler_method()] {
            let events = EventLog::new();
            let mut graph = translate(&method, &events).expect("translated");
            FreeVariableCapture.run(&mut graph, &events).expect("captured");

            let calls_before = visit::reachable_calls(&graph).len();
            let blocks_before = visit::reachable_blocks(&graph).len();
            AlphaConversion.run(&mut graph, &events).expect("converted");

            let bound = bound_variables(&graph);
            let unique: FxHashSet<Variable> = bound.iter().copied().collect();
            assert_eq!(bound.len(), unique.len());
            assert!(bound.iter().all(Variable::is_synthetic));
            assert_eq!(visit::reachable_calls(&graph).len(), calls_before);
            assert_eq!(visit::reachable_blocks(&graph).len(), blocks_before);
        }
    }
}
