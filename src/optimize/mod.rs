//! Policy-driven optimization of LCIR.
//!
//! The optimizer alternates three rewrites until the graph stops changing or the
//! round limit is reached:
//!
//! 1. **Folding**: foldable builtins and switches with constant operands are evaluated
//!    and replaced by a call of the continuation they would take
//! 2. **Inlining**: eligible block calls are replaced by the block's body (see
//!    [`InliningPolicy`] for the eligibility rules and how policies veto)
//! 3. **Copy propagation**: the redexes left behind by 1 and 2 are reduced, exposing
//!    new constants to the next round
//!
//! Unused block parameters are pruned once at the end.
//!
//! # Policies
//!
//! | Policy | Inlines |
//! |--------|---------|
//! | [`StaticPolicy`] | every eligible block |
//! | [`DynamicPolicy`] | single-call blocks, duplicated blocks up to a size |
//! | [`BudgetPolicy`] | eligible blocks until the budget is spent |
//!
//! A method carrying [`crate::bir::MethodActor::inlining_budget`] is always optimized
//! with a [`BudgetPolicy`] of that size.

mod fold;
mod inline;
mod policy;

use std::sync::Arc;

pub use policy::{
    BudgetPolicy, DynamicPolicy, InlineCandidate, InlineReason, InliningPolicy, StaticPolicy,
};

use crate::{
    cir::{visit, CirGraph},
    generator::{EventKind, EventLog},
    passes::{update_block_calls, CirPass, CopyPropagation, DeadLocalPruning},
    Result,
};

/// Default limit on optimizer rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// The optimization stage.
#[derive(Debug, Clone)]
pub struct Optimizer {
    policy: Arc<dyn InliningPolicy>,
    max_rounds: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(Arc::new(StaticPolicy), DEFAULT_MAX_ROUNDS)
    }
}

impl Optimizer {
    /// Creates an optimizer with the given default policy and round limit.
    #[must_use]
    pub fn new(policy: Arc<dyn InliningPolicy>, max_rounds: usize) -> Self {
        Self { policy, max_rounds }
    }

    /// The policy used for methods without an inlining budget.
    #[must_use]
    pub fn policy(&self) -> &dyn InliningPolicy {
        self.policy.as_ref()
    }

    /// Folds every reachable builtin and switch with constant operands.
    fn fold(graph: &mut CirGraph) -> (usize, usize) {
        let mut builtins = 0;
        let mut switches = 0;
        for id in visit::reachable_calls(graph) {
            if fold::fold_builtin(graph, id) {
                builtins += 1;
            } else if fold::fold_switch(graph, id) {
                switches += 1;
            }
        }
        (builtins, switches)
    }
}

impl CirPass for Optimizer {
    fn name(&self) -> &'static str {
        "optimizer"
    }

    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool> {
        let budget = graph.method().inlining_budget.map(BudgetPolicy);
        let policy: &dyn InliningPolicy = match &budget {
            Some(budget) => budget as &dyn InliningPolicy,
            None => self.policy.as_ref(),
        };

        let mut changed = false;
        let mut inlined = 0;
        let mut specialized = 0;
        let mut folded = (0, 0);
        let mut rounds = 0;

        while rounds < self.max_rounds {
            rounds += 1;
            let (builtins, switches) = Self::fold(graph);
            let round = inline::inline_round(graph, policy, inlined);
            let propagated = CopyPropagation.run(graph, events)?;

            folded.0 += builtins;
            folded.1 += switches;
            inlined += round.inlined;
            specialized += round.specialized;

            let progress = builtins + switches + round.inlined > 0 || propagated;
            changed |= progress;
            if !progress {
                break;
            }
        }

        changed |= DeadLocalPruning.run(graph, events)?;
        update_block_calls(graph);
        graph.invalidate_recursion();

        log::debug!(
            "{}: {} policy, {rounds} rounds, {inlined} inlined, {} folded",
            graph.method(),
            policy.name(),
            folded.0 + folded.1
        );
        let counters = [
            (EventKind::BlockInlined, inlined, "blocks inlined"),
            (EventKind::BlockSpecialized, specialized, "blocks specialized"),
            (EventKind::ConstantFolded, folded.0, "builtins folded"),
            (EventKind::SwitchFolded, folded.1, "switches folded"),
        ];
        for (kind, count, what) in counters {
            if count > 0 {
                events
                    .record(kind)
                    .method(graph.method())
                    .stage(self.name())
                    .message(format!("{count} {what}"));
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Folds constants and inlines blocks under an inlining policy"
    }
}
