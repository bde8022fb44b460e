//! Worklist-based data flow solver.
//!
//! # Algorithm
//!
//! 1. Seed the body of the method closure with the analysis' boundary environment
//! 2. While the worklist is non-empty:
//!    a. Remove a call from the worklist
//!    b. Derive the environment of every successor call (see [`DataFlowAnalysis`])
//!    c. Meet it into the successor's recorded environment
//!    d. If the successor's environment changed, add it to the worklist
//!
//! Environments only ever move down the lattice, so the solver terminates for
//! lattices of finite height.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    cir::{CallId, CirGraph, Value},
    dataflow::framework::{meet_environments, AnalysisResults, DataFlowAnalysis, Environment},
};

/// Worklist-based data flow solver.
///
/// # Usage
///
/// ```rust,ignore
/// use cirgen::dataflow::{DataFlowSolver, InitializedAnalysis};
///
/// let results = DataFlowSolver::new(InitializedAnalysis).solve(&graph);
/// let env = results.environment(call);
/// ```
pub struct DataFlowSolver<A: DataFlowAnalysis> {
    /// The analysis being solved.
    analysis: A,
    /// Environment recorded for each reached call.
    environments: FxHashMap<CallId, Environment<A::Lattice>>,
    /// Calls whose environment changed since they were last processed.
    worklist: VecDeque<CallId>,
    /// Deduplicates the worklist.
    in_worklist: FxHashSet<CallId>,
    /// Number of iterations performed.
    iterations: usize,
}

impl<A: DataFlowAnalysis> DataFlowSolver<A> {
    /// Creates a new solver for the given analysis.
    #[must_use]
    pub fn new(analysis: A) -> Self {
        Self {
            analysis,
            environments: FxHashMap::default(),
            worklist: VecDeque::new(),
            in_worklist: FxHashSet::default(),
            iterations: 0,
        }
    }

    /// Solves the analysis to a fixpoint.
    pub fn solve(mut self, graph: &CirGraph) -> AnalysisResults<A::Lattice> {
        let entry = graph.closure(graph.entry()).body;
        let boundary = self.analysis.boundary(graph);
        self.propagate(entry, boundary);

        while let Some(call) = self.worklist.pop_front() {
            self.in_worklist.remove(&call);
            self.iterations += 1;

            let Some(env) = self.environments.get(&call).cloned() else {
                continue;
            };
            for (successor, successor_env) in self.successors(graph, call, &env) {
                self.propagate(successor, successor_env);
            }
        }

        log::trace!(
            "{} converged after {} iterations over {} calls",
            self.analysis.name(),
            self.iterations,
            self.environments.len()
        );
        AnalysisResults::new(self.environments, self.iterations)
    }

    /// Returns the number of iterations performed so far.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    fn propagate(&mut self, call: CallId, env: Environment<A::Lattice>) {
        let merged = match self.environments.get(&call) {
            Some(existing) => meet_environments(existing, &env),
            None => env,
        };
        if self.environments.get(&call) == Some(&merged) {
            return;
        }
        self.environments.insert(call, merged);
        if self.in_worklist.insert(call) {
            self.worklist.push_back(call);
        }
    }

    fn successors(
        &self,
        graph: &CirGraph,
        id: CallId,
        env: &Environment<A::Lattice>,
    ) -> Vec<(CallId, Environment<A::Lattice>)> {
        let call = graph.call(id);
        let mut successors = Vec::new();

        let applied = match &call.procedure {
            Value::Closure(closure) => Some((*closure, env.clone())),
            Value::Block(block) => Some((graph.block(*block).closure(), Environment::new())),
            _ => None,
        };
        if let Some((closure, mut inner)) = applied {
            let closure = graph.closure(closure);
            for (parameter, argument) in closure.parameters.iter().zip(&call.arguments) {
                inner.insert(*parameter, self.analysis.evaluate(argument, env));
            }
            successors.push((closure.body, inner));
        }

        let has_exception_continuation =
            matches!(call.procedure, Value::Builtin(_) | Value::Operator(_));
        let last = call.arguments.len().saturating_sub(1);
        let mut normal: Option<Environment<A::Lattice>> = None;

        for (position, argument) in call.arguments.iter().enumerate() {
            let Value::Closure(closure) = argument else {
                continue;
            };
            let closure = graph.closure(*closure);
            let inner = if has_exception_continuation && position == last {
                let mut inner = env.clone();
                for parameter in &closure.parameters {
                    inner.insert(*parameter, self.analysis.exception());
                }
                inner
            } else {
                let base = normal
                    .get_or_insert_with(|| self.analysis.transfer(graph, id, env))
                    .clone();
                let mut inner = base;
                if !closure.parameters.is_empty() {
                    let result = self.analysis.result(graph, id, env);
                    for parameter in &closure.parameters {
                        inner.insert(*parameter, result.clone());
                    }
                }
                inner
            };
            successors.push((closure.body, inner));
        }

        successors
    }
}
