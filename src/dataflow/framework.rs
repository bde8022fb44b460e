//! Data flow analysis framework trait and results.
//!
//! Any specific analysis implements [`DataFlowAnalysis`] to work with the solver. The
//! framework is forward-only: abstract values flow from the method closure along
//! calls into closures, blocks and continuations. Analyses never touch the node
//! types; everything they need is reachable through [`CirGraph`].

use rustc_hash::FxHashMap;

use crate::{
    cir::{CallId, CirGraph, Value, Variable},
    dataflow::lattice::MeetSemiLattice,
};

/// Abstract values of the variables in scope at a call.
///
/// Persistent, so extending the environment for a nested closure shares structure
/// with the enclosing one.
pub type Environment<L> = imbl::HashMap<Variable, L>;

/// Pointwise meet of two environments.
///
/// A variable missing from one side is treated as top, so it keeps the value of the
/// other side.
#[must_use]
pub fn meet_environments<L: MeetSemiLattice>(
    left: &Environment<L>,
    right: &Environment<L>,
) -> Environment<L> {
    let mut result = left.clone();
    for (variable, value) in right {
        let merged = match left.get(variable) {
            Some(existing) => existing.meet(value),
            None => value.clone(),
        };
        result.insert(*variable, merged);
    }
    result
}

/// A forward data flow analysis over the reachable calls of a [`CirGraph`].
///
/// The solver derives successor environments as follows:
///
/// - **Closure application** `((x..) -> body)(a..)`: the body sees the caller's
///   environment extended with `x := evaluate(a)`
/// - **Block call** `B(a..)`: the block body sees only its parameters, bound to the
///   evaluated arguments and met with every other call site
/// - **Continuation arguments**: the normal continuation sees
///   [`DataFlowAnalysis::transfer`] of the caller's environment with its parameter
///   bound to [`DataFlowAnalysis::result`]; the exception continuation of an operator
///   or builtin sees the unchanged environment with its parameter bound to
///   [`DataFlowAnalysis::exception`]
///
/// # Example
///
/// ```rust,ignore
/// use cirgen::dataflow::{DataFlowAnalysis, DataFlowSolver};
///
/// let results = DataFlowSolver::new(MyAnalysis).solve(&graph);
/// let state = results.value_at(call, &receiver);
/// ```
pub trait DataFlowAnalysis {
    /// The lattice type for this analysis.
    type Lattice: MeetSemiLattice;

    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Abstract values of the method closure's parameters.
    fn boundary(&self, graph: &CirGraph) -> Environment<Self::Lattice>;

    /// Abstract value of an operand in the given environment.
    fn evaluate(&self, value: &Value, env: &Environment<Self::Lattice>) -> Self::Lattice;

    /// Environment flowing into the normal continuation of a call.
    ///
    /// The default implementation passes the environment through unchanged.
    fn transfer(
        &self,
        _graph: &CirGraph,
        _call: CallId,
        env: &Environment<Self::Lattice>,
    ) -> Environment<Self::Lattice> {
        env.clone()
    }

    /// Abstract value passed to the normal continuation of a call.
    fn result(
        &self,
        graph: &CirGraph,
        call: CallId,
        env: &Environment<Self::Lattice>,
    ) -> Self::Lattice;

    /// Abstract value bound to the parameter of an exception continuation.
    fn exception(&self) -> Self::Lattice;
}

/// Results of a data flow analysis: one environment per reachable call.
///
/// Calls that were never reached have no environment.
#[derive(Debug, Clone)]
pub struct AnalysisResults<L> {
    environments: FxHashMap<CallId, Environment<L>>,
    iterations: usize,
}

impl<L: Clone> AnalysisResults<L> {
    /// Creates new analysis results.
    #[must_use]
    pub fn new(environments: FxHashMap<CallId, Environment<L>>, iterations: usize) -> Self {
        Self {
            environments,
            iterations,
        }
    }

    /// Environment in effect at a call.
    #[must_use]
    pub fn environment(&self, call: CallId) -> Option<&Environment<L>> {
        self.environments.get(&call)
    }

    /// Abstract value of a variable at a call.
    #[must_use]
    pub fn value_at(&self, call: CallId, variable: &Variable) -> Option<&L> {
        self.environments.get(&call)?.get(variable)
    }

    /// Returns `true` if the call was reached.
    #[must_use]
    pub fn is_reached(&self, call: CallId) -> bool {
        self.environments.contains_key(&call)
    }

    /// Number of reached calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.environments.len()
    }

    /// Returns `true` if no call was reached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Number of worklist iterations the solver needed.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}
