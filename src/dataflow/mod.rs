//! Data flow analysis framework for the CPS-IR.
//!
//! Forward analyses compute, for every reachable call, an environment mapping the
//! variables in scope to abstract values. The framework never inspects the node types
//! directly; new analyses plug in by implementing [`DataFlowAnalysis`] for a
//! [`MeetSemiLattice`].
//!
//! # Architecture
//!
//! - **Lattice**: the domain of abstract values with a meet operation
//! - **Analysis**: boundary environment, operand evaluation and transfer functions
//! - **Solver**: iterates a worklist of calls to a fixpoint
//!
//! # Analyses Provided
//!
//! - [`InitializedAnalysis`]: which references are known to be constructed and non-null
//! - [`ConstantPropagation`]: which variables carry the same constant on every path
//!
//! # Example
//!
//! ```rust,ignore
//! use cirgen::dataflow::{DataFlowSolver, InitializedAnalysis, InitializedState};
//!
//! let results = DataFlowSolver::new(InitializedAnalysis).solve(&graph);
//! if results.value_at(call, &receiver) == Some(&InitializedState::Initialized) {
//!     // the null check on `receiver` can be dropped
//! }
//! ```

mod constants;
mod framework;
mod initialized;
mod lattice;
mod solver;

pub use constants::{ConstantPropagation, ConstantValue};
pub use framework::{meet_environments, AnalysisResults, DataFlowAnalysis, Environment};
pub use initialized::{InitializedAnalysis, InitializedState};
pub use lattice::MeetSemiLattice;
pub use solver::DataFlowSolver;
