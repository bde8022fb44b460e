//! Dead-local pruning.
//!
//! Capturing is generous: a slot variable a block merely forwards to a successor that
//! never reads it still becomes a parameter. This pass removes block parameters that
//! no call in the block's closure tree mentions, together with the matching argument
//! at every call site. Removing an argument can make a parameter of the calling block
//! unused in turn, so the pass repeats until nothing changes.

use rustc_hash::FxHashSet;

use crate::{
    cir::{visit, CirGraph, ClosureId, Variable},
    generator::{EventKind, EventLog},
    passes::CirPass,
    Result,
};

/// Removal of unused block parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadLocalPruning;

impl DeadLocalPruning {
    /// Variables mentioned anywhere inside a closure tree.
    fn used(graph: &CirGraph, closure: ClosureId) -> FxHashSet<Variable> {
        visit::calls_within(graph, closure)
            .into_iter()
            .flat_map(|call| visit::variables(graph.call(call)).collect::<Vec<_>>())
            .collect()
    }

    fn round(graph: &mut CirGraph) -> Result<usize> {
        let sites = visit::block_call_sites(graph);
        let mut pruned = 0;

        for block in visit::reachable_blocks(graph) {
            let closure = graph.block(block).closure();
            let used = Self::used(graph, closure);
            let parameters = &graph.closure(closure).parameters;
            let dead: Vec<usize> = parameters
                .iter()
                .enumerate()
                .filter(|(_, parameter)| !used.contains(parameter))
                .map(|(index, _)| index)
                .collect();
            if dead.is_empty() {
                continue;
            }

            let arity = parameters.len();
            for &site in sites.get(&block).into_iter().flatten() {
                let arguments = &mut graph.call_mut(site).arguments;
                if arguments.len() != arity {
                    return Err(internal_error!(
                        "call {} passes {} arguments to {} expecting {}",
                        site,
                        arguments.len(),
                        block,
                        arity
                    ));
                }
                for &index in dead.iter().rev() {
                    arguments.remove(index);
                }
            }
            let parameters = &mut graph.closure_mut(closure).parameters;
            for &index in dead.iter().rev() {
                parameters.remove(index);
            }
            pruned += dead.len();
        }
        Ok(pruned)
    }
}

impl CirPass for DeadLocalPruning {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool> {
        let mut total = 0;
        loop {
            let pruned = Self::round(graph)?;
            if pruned == 0 {
                break;
            }
            total += pruned;
        }

        if total > 0 {
            events
                .record(EventKind::ParametersPruned)
                .method(graph.method())
                .stage(self.name())
                .message(format!("{total} unused block parameters removed"));
        }
        Ok(total > 0)
    }

    fn description(&self) -> &'static str {
        "Removes block parameters that are never read"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{Constant, Kind, MethodActor},
        cir::{BlockRole, Call, Value, VariableOrigin},
    };

    #[test]
    fn test_forwarded_but_unused_parameter_is_pruned() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Void));
        let cc = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, Kind::Void);
        let ce = graph.fresh_variable(VariableOrigin::ExceptionContinuationParameter, Kind::Reference);

        // B1(x) = cc()
        let x1 = graph.fresh_variable(VariableOrigin::LocalVariable(1), Kind::Int);
        let b1_body = graph.add_call(Call::new(Value::Variable(cc), Vec::new()));
        let b1_closure = graph.add_closure(vec![x1], b1_body);
        let b1 = graph.add_block(BlockRole::Normal, b1_closure, Some(1));

        // B0(x) = B1(x)
        let x0 = graph.fresh_variable(VariableOrigin::LocalVariable(1), Kind::Int);
        let b0_body = graph.add_call(Call::new(Value::Block(b1), vec![Value::Variable(x0)]));
        let b0_closure = graph.add_closure(vec![x0], b0_body);
        let b0 = graph.add_block(BlockRole::Normal, b0_closure, Some(0));

        let entry = graph.entry();
        graph.closure_mut(entry).parameters = vec![cc, ce];
        let entry_body = graph.closure(entry).body;
        graph.replace_call(
            entry_body,
            Call::new(Value::Block(b0), vec![Value::Constant(Constant::Int(3))]),
        );

        let events = EventLog::new();
        assert!(DeadLocalPruning.run(&mut graph, &events).expect("pruned"));
        assert!(graph.closure(b0_closure).parameters.is_empty());
        assert!(graph.closure(b1_closure).parameters.is_empty());
        assert!(graph.call(entry_body).arguments.is_empty());
        assert!(graph.call(b0_body).arguments.is_empty());

        assert!(!DeadLocalPruning.run(&mut graph, &events).expect("pruned"));
    }
}
