//! Traversals over the closure trees and blocks of a [`CirGraph`].
//!
//! Every traversal is iterative: a long straight-line method nests one continuation
//! closure per instruction, far deeper than the call stack would tolerate.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cir::{BlockId, Call, CallId, CirGraph, ClosureId, Value, Variable};

/// Closures owned by a call: a closure-valued procedure and closure-valued arguments.
pub fn nested_closures(call: &Call) -> impl Iterator<Item = ClosureId> + '_ {
    std::iter::once(&call.procedure)
        .chain(call.arguments.iter())
        .filter_map(Value::as_closure)
}

/// Blocks named by a call, as procedure or argument.
pub fn referenced_blocks(call: &Call) -> impl Iterator<Item = BlockId> + '_ {
    std::iter::once(&call.procedure)
        .chain(call.arguments.iter())
        .filter_map(Value::as_block)
}

/// Variables occurring directly in a call, procedure first.
pub fn variables(call: &Call) -> impl Iterator<Item = Variable> + '_ {
    std::iter::once(&call.procedure)
        .chain(call.arguments.iter())
        .filter_map(Value::as_variable)
}

/// All calls in the closure tree rooted at `closure`, in pre-order.
///
/// Blocks are not entered.
#[must_use]
pub fn calls_within(graph: &CirGraph, closure: ClosureId) -> Vec<CallId> {
    let mut calls = Vec::new();
    let mut pending = vec![graph.closure(closure).body];
    while let Some(id) = pending.pop() {
        calls.push(id);
        let call = graph.call(id);
        let nested: Vec<ClosureId> = nested_closures(call).collect();
        for inner in nested.into_iter().rev() {
            pending.push(graph.closure(inner).body);
        }
    }
    calls
}

/// All closures in the tree rooted at `closure`, the root included.
#[must_use]
pub fn closures_within(graph: &CirGraph, closure: ClosureId) -> Vec<ClosureId> {
    let mut closures = Vec::new();
    let mut pending = vec![closure];
    while let Some(id) = pending.pop() {
        closures.push(id);
        pending.extend(nested_closures(graph.call(graph.closure(id).body)));
    }
    closures
}

/// Blocks reachable from the method closure, in discovery order.
#[must_use]
pub fn reachable_blocks(graph: &CirGraph) -> Vec<BlockId> {
    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    let mut pending = vec![graph.entry()];

    while let Some(closure) = pending.pop() {
        for call in calls_within(graph, closure) {
            for block in referenced_blocks(graph.call(call)) {
                if seen.insert(block) {
                    order.push(block);
                    pending.push(graph.block(block).closure());
                }
            }
        }
    }
    order
}

/// Root closures of the reachable graph: the method closure followed by the closure
/// of every reachable block.
#[must_use]
pub fn reachable_roots(graph: &CirGraph) -> Vec<(Option<BlockId>, ClosureId)> {
    std::iter::once((None, graph.entry()))
        .chain(
            reachable_blocks(graph)
                .into_iter()
                .map(|block| (Some(block), graph.block(block).closure())),
        )
        .collect()
}

/// Every call reachable from the method closure.
#[must_use]
pub fn reachable_calls(graph: &CirGraph) -> Vec<CallId> {
    reachable_roots(graph)
        .into_iter()
        .flat_map(|(_, root)| calls_within(graph, root))
        .collect()
}

/// Incoming calls of every reachable block.
#[must_use]
pub fn block_call_sites(graph: &CirGraph) -> FxHashMap<BlockId, Vec<CallId>> {
    let mut sites: FxHashMap<BlockId, Vec<CallId>> = FxHashMap::default();
    for call in reachable_calls(graph) {
        if let Some(block) = graph.call(call).procedure.as_block() {
            sites.entry(block).or_default().push(call);
        }
    }
    sites
}

/// Variables occurring free in the closure tree rooted at `closure`.
///
/// Variables in `scope` are considered bound around the tree. With `block_free`, a
/// call to a block additionally contributes the block's entry, which lets closure
/// conversion propagate requirements across the control-flow graph. The result is
/// sorted.
#[must_use]
pub fn free_variables(
    graph: &CirGraph,
    closure: ClosureId,
    scope: &imbl::HashSet<Variable>,
    block_free: Option<&FxHashMap<BlockId, Vec<Variable>>>,
) -> Vec<Variable> {
    let mut free = FxHashSet::default();
    let root = graph.closure(closure);
    let mut bound = scope.clone();
    bound.extend(root.parameters.iter().copied());
    let mut pending = vec![(root.body, bound)];

    while let Some((id, bound)) = pending.pop() {
        let call = graph.call(id);
        for variable in variables(call) {
            if !bound.contains(&variable) {
                free.insert(variable);
            }
        }
        if let (Some(block), Some(block_free)) = (call.procedure.as_block(), block_free) {
            for variable in block_free.get(&block).into_iter().flatten() {
                if !bound.contains(variable) {
                    free.insert(*variable);
                }
            }
        }
        for inner in nested_closures(call) {
            let inner = graph.closure(inner);
            let mut scope = bound.clone();
            scope.extend(inner.parameters.iter().copied());
            pending.push((inner.body, scope));
        }
    }

    let mut free: Vec<Variable> = free.into_iter().collect();
    free.sort();
    free
}

/// Number of calls in the closure tree rooted at `closure`.
#[must_use]
pub fn size(graph: &CirGraph, closure: ClosureId) -> usize {
    calls_within(graph, closure).len()
}
