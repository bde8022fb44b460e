//! Beta-reduction-based block inlining.

use rustc_hash::FxHashSet;

use crate::{
    cir::{visit, BlockId, CallId, CirGraph, Value},
    optimize::policy::{InlineCandidate, InlineReason, InliningPolicy},
    passes::{update_block_calls, CopyPropagation},
};

/// What one inlining round did.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct InlineRound {
    pub inlined: usize,
    pub specialized: usize,
}

/// Determines whether `block` may be inlined at `site`.
///
/// Self-recursive blocks are never eligible.
fn eligibility(graph: &CirGraph, block: BlockId, site: CallId, incoming: usize) -> Option<InlineReason> {
    if graph.is_recursive(block) {
        return None;
    }
    if incoming <= 1 {
        return Some(InlineReason::SingleCall);
    }

    let closure = graph.closure(graph.block(block).closure());
    let body = graph.call(closure.body);
    match &body.procedure {
        Value::Variable(target) if target.is_continuation() => Some(InlineReason::Trampoline),
        Value::Switch(switch) => {
            let arguments = &graph.call(site).arguments;
            // An operand is constant at the site if it is a constant in the body or a
            // parameter bound to a constant by the site.
            let constant = |value: &Value| match value {
                Value::Constant(_) => true,
                Value::Variable(variable) => closure
                    .parameters
                    .iter()
                    .position(|parameter| parameter == variable)
                    .and_then(|index| arguments.get(index))
                    .is_some_and(|argument| argument.as_constant().is_some()),
                _ => false,
            };
            (body.arguments.len() == switch.arity()
                && body.arguments.iter().take(switch.cases + 1).all(constant))
            .then_some(InlineReason::ConstantSwitch)
        }
        _ => None,
    }
}

/// Replaces the block call at `site` by the block's body.
///
/// A block with several incoming calls is first specialized into a fresh copy whose
/// closure the site then owns alone. A block with a single incoming call is replicated
/// so the original stays intact for stale references.
fn inline_at(graph: &mut CirGraph, site: CallId, block: BlockId, incoming: usize) -> bool {
    let closure = if incoming > 1 {
        let copy = graph.fresh_copy(block);
        graph.block(copy).closure()
    } else {
        graph.replicate_closure(graph.block(block).closure())
    };
    graph.call_mut(site).procedure = Value::Closure(closure);
    CopyPropagation::beta(graph, site);
    incoming > 1
}

/// Runs one inlining round over the reachable blocks.
pub(crate) fn inline_round(
    graph: &mut CirGraph,
    policy: &dyn InliningPolicy,
    inlined_so_far: usize,
) -> InlineRound {
    update_block_calls(graph);
    graph.invalidate_recursion();

    let mut round = InlineRound::default();
    // Calls inside blocks whose only caller received a replica.
    let mut dead: FxHashSet<CallId> = FxHashSet::default();
    for block in visit::reachable_blocks(graph) {
        let sites = graph.block(block).calls().to_vec();
        if sites.is_empty() {
            continue;
        }
        let size = visit::size(graph, graph.block(block).closure());

        for &site in &sites {
            // Earlier rewrites in this round may have replaced or orphaned the site.
            if dead.contains(&site) || graph.call(site).procedure != Value::Block(block) {
                continue;
            }
            let Some(reason) = eligibility(graph, block, site, sites.len()) else {
                continue;
            };
            let candidate = InlineCandidate {
                block,
                reason,
                incoming: sites.len(),
                size,
                inlined_so_far: inlined_so_far + round.inlined,
            };
            if !policy.should_inline(&candidate) {
                continue;
            }

            log::trace!("{}: inlining {block} at {site} ({reason})", graph.method());
            if inline_at(graph, site, block, sites.len()) {
                round.specialized += 1;
            } else {
                dead.extend(visit::calls_within(graph, graph.block(block).closure()));
            }
            round.inlined += 1;
        }
    }
    round
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{Kind, MethodActor},
        cir::{BlockRole, Call},
        optimize::{BudgetPolicy, StaticPolicy},
        test::{branch_join_method, lowered},
    };

    /// Accepts only candidates inlined for one reason.
    #[derive(Debug)]
    struct OnlyReason(InlineReason);

    impl InliningPolicy for OnlyReason {
        fn name(&self) -> &'static str {
            "only-reason"
        }

        fn should_inline(&self, candidate: &InlineCandidate) -> bool {
            candidate.reason == self.0
        }
    }

    /// `entry = B1()`, `B1 = B2()`, `B2 = B2()`.
    fn chain() -> (CirGraph, BlockId, BlockId) {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Void));
        let spin_body = graph.add_placeholder(None);
        let spin_closure = graph.add_closure(Vec::new(), spin_body);
        let spin = graph.add_block(BlockRole::Normal, spin_closure, Some(1));
        graph.replace_call(spin_body, Call::new(Value::Block(spin), Vec::new()));

        let first_body = graph.add_call(Call::new(Value::Block(spin), Vec::new()));
        let first_closure = graph.add_closure(Vec::new(), first_body);
        let first = graph.add_block(BlockRole::Normal, first_closure, Some(0));

        let entry_body = graph.closure(graph.entry()).body;
        graph.replace_call(entry_body, Call::new(Value::Block(first), Vec::new()));
        (graph, first, spin)
    }

    #[test]
    fn test_recursive_block_is_kept() {
        let (mut graph, first, spin) = chain();
        let round = inline_round(&mut graph, &StaticPolicy, 0);
        assert_eq!(round.inlined, 1);

        let reachable = visit::reachable_blocks(&graph);
        assert!(!reachable.contains(&first));
        assert!(reachable.contains(&spin));

        // Only the self-recursive block is left; nothing more to do.
        let round = inline_round(&mut graph, &StaticPolicy, 1);
        assert_eq!(round.inlined, 0);
    }

    #[test]
    fn test_zero_budget_inlines_nothing() {
        let (mut graph, first, _) = chain();
        let round = inline_round(&mut graph, &BudgetPolicy(0), 0);
        assert_eq!(round.inlined, 0);
        assert!(visit::reachable_blocks(&graph).contains(&first));
    }

    #[test]
    fn test_trampoline_inlined_at_every_caller() {
        let mut graph = lowered(&branch_join_method());
        let (join, sites) = visit::block_call_sites(&graph)
            .into_iter()
            .find(|(_, sites)| sites.len() == 2)
            .expect("join block with two callers");

        let round = inline_round(&mut graph, &OnlyReason(InlineReason::Trampoline), 0);
        assert_eq!(round.inlined, 2);
        assert_eq!(round.specialized, 2);
        assert!(!visit::reachable_blocks(&graph).contains(&join));

        let cc = graph.closure(graph.entry()).parameters[1];
        for site in sites {
            assert_eq!(graph.call(site).procedure, Value::Variable(cc));
        }
    }
}
