//! Structural passes over the CPS-IR.
//!
//! Every pass implements [`CirPass`] and rewrites a [`CirGraph`] in place. Passes are
//! idempotent: running one a second time is allowed and may be a no-op.
//!
//! # Passes
//!
//! - [`FreeVariableCapture`] - closure conversion of blocks
//! - [`AlphaConversion`] - fresh names for every bound variable
//! - [`DeadLocalPruning`] - drops block parameters nobody reads
//! - [`CopyPropagation`] - substitutes trivial bindings and eta-reduces continuations
//! - [`Verifier`] - read-only check of arity and scoping invariants
//!
//! [`update_block_calls`] refreshes the incoming-call bookkeeping of every block.

mod alpha;
mod capture;
mod copyprop;
mod prune;
mod update;
mod verify;

pub use alpha::AlphaConversion;
pub use capture::FreeVariableCapture;
pub use copyprop::CopyPropagation;
pub use prune::DeadLocalPruning;
pub use update::update_block_calls;
pub use verify::Verifier;

use crate::{cir::CirGraph, generator::EventLog, Result};

/// A rewriting pass over the CPS-IR of one method.
///
/// All passes must be thread-safe (Send + Sync) so one configured pipeline can serve
/// parallel compilations. Passes receive exclusive access to the graph and shared
/// access to the session's event log.
pub trait CirPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Runs the pass on one method's graph.
    ///
    /// Returns `true` if any changes were made, `false` otherwise. Events should be
    /// recorded directly to `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph violates an invariant the pass relies on.
    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
