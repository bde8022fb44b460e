//! Free-variable capturing (closure conversion of blocks).
//!
//! After translation a block reads slot variables bound by whichever block reached it
//! first. Capturing makes that flow explicit: each block's parameter list is extended
//! with its free variables, in serial order, and every call to the block passes the
//! caller's binding of each. Requirements propagate backwards through chains of
//! blocks, so the free sets are computed to a fixpoint before anything is rewritten.
//!
//! The parameters of the method closure stay in scope in every block: blocks are
//! nested inside the method closure, and its continuation parameters are used by every
//! returning block. They are never captured, so a block body may mention the method's
//! arguments and its `cc`/`ce` without listing them among its own parameters. Every
//! other variable a block reads must be one of its parameters after this pass.

use rustc_hash::FxHashMap;

use crate::{
    cir::{visit, BlockId, CirGraph, Value, Variable},
    generator::{EventKind, EventLog},
    passes::CirPass,
    Result,
};

/// Closure conversion of blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeVariableCapture;

impl FreeVariableCapture {
    fn free_sets(graph: &CirGraph, blocks: &[BlockId]) -> FxHashMap<BlockId, Vec<Variable>> {
        let scope: imbl::HashSet<Variable> =
            graph.closure(graph.entry()).parameters.iter().copied().collect();
        let mut free: FxHashMap<BlockId, Vec<Variable>> =
            blocks.iter().map(|&block| (block, Vec::new())).collect();

        loop {
            let mut changed = false;
            for &block in blocks {
                let closure = graph.block(block).closure();
                let found = visit::free_variables(graph, closure, &scope, Some(&free));
                if free.get(&block) != Some(&found) {
                    free.insert(block, found);
                    changed = true;
                }
            }
            if !changed {
                return free;
            }
        }
    }
}

impl CirPass for FreeVariableCapture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool> {
        let blocks = visit::reachable_blocks(graph);
        let free = Self::free_sets(graph, &blocks);
        let sites = visit::block_call_sites(graph);

        let mut captured = 0;
        for &block in &blocks {
            let Some(variables) = free.get(&block).filter(|v| !v.is_empty()) else {
                continue;
            };
            let closure = graph.block(block).closure();
            graph
                .closure_mut(closure)
                .parameters
                .extend(variables.iter().copied());
            for &site in sites.get(&block).into_iter().flatten() {
                graph
                    .call_mut(site)
                    .arguments
                    .extend(variables.iter().copied().map(Value::Variable));
            }
            captured += variables.len();
        }

        if captured > 0 {
            log::trace!("{}: captured {captured} variables", graph.method());
            events
                .record(EventKind::VariablesCaptured)
                .method(graph.method())
                .stage(self.name())
                .message(format!("{captured} variables captured"));
        }
        Ok(captured > 0)
    }

    fn description(&self) -> &'static str {
        "Turns the free variables of every block into explicit parameters"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cir::VariableOrigin, test::branch_join_method, translate::translate};

    #[test]
    fn test_join_captures_the_local() {
        let events = EventLog::new();
        let mut graph = translate(&branch_join_method(), &events).expect("translated");
        assert!(FreeVariableCapture.run(&mut graph, &events).expect("captured"));

        let sites = visit::block_call_sites(&graph);
        let join = sites
            .iter()
            .find(|(_, calls)| calls.len() == 2)
            .map(|(block, _)| *block)
            .expect("join block");
        let parameters = &graph.closure(graph.block(join).closure()).parameters;
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].origin(), VariableOrigin::LocalVariable(1));

        // Idempotent: nothing left to capture.
        assert!(!FreeVariableCapture.run(&mut graph, &events).expect("captured"));
        assert_eq!(events.count_kind(EventKind::VariablesCaptured), 1);
    }

    #[test]
    fn test_method_parameters_stay_in_scope() {
        let events = EventLog::new();
        let mut graph = translate(&branch_join_method(), &events).expect("translated");
        FreeVariableCapture.run(&mut graph, &events).expect("captured");

        let method: imbl::HashSet<Variable> =
            graph.closure(graph.entry()).parameters.iter().copied().collect();
        let mut reads_method_parameter = false;
        for block in visit::reachable_blocks(&graph) {
            let closure = graph.block(block).closure();
            let parameters = &graph.closure(closure).parameters;
            assert!(parameters.iter().all(|parameter| !method.contains(parameter)));

            // Only the method closure's parameters may be free in a block.
            let free = visit::free_variables(&graph, closure, &imbl::HashSet::new(), None);
            assert!(free.iter().all(|variable| method.contains(variable)));
            reads_method_parameter |= !free.is_empty();
        }
        assert!(reads_method_parameter);
    }
}
