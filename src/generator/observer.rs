//! Hooks around the pipeline stages.

use crate::{
    bir::MethodActor,
    cir::CirGraph,
    generator::Stage,
    passes::Verifier,
    Result,
};

/// Receives notifications around every pipeline stage.
///
/// Observers are attached when the generator is configured and are called in
/// attachment order. An error returned by an observer aborts generation of the method.
pub trait CirObserver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Called before `stage` runs. There is no graph before [`Stage::InitialBuild`].
    ///
    /// # Errors
    ///
    /// Any error aborts generation of `method`.
    fn before_stage(
        &self,
        _stage: Stage,
        _method: &MethodActor,
        _graph: Option<&CirGraph>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called after `stage` completed.
    ///
    /// # Errors
    ///
    /// Any error aborts generation of `method`.
    fn after_stage(&self, _stage: Stage, _method: &MethodActor, _graph: &CirGraph) -> Result<()> {
        Ok(())
    }

    /// Returns `true` for the verifying observer, which the generator places itself.
    fn is_verifier(&self) -> bool {
        false
    }
}

/// Logs the graph after every stage at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CirObserver for TracingObserver {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn before_stage(&self, stage: Stage, method: &MethodActor, _graph: Option<&CirGraph>) -> Result<()> {
        log::trace!("{method}: entering {stage}");
        Ok(())
    }

    fn after_stage(&self, stage: Stage, method: &MethodActor, graph: &CirGraph) -> Result<()> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{method} after {stage}:\n{}", graph.display());
        }
        Ok(())
    }
}

/// Runs the [`Verifier`] after every stage.
///
/// The initial build is checked without scoping: blocks read slot variables of their
/// predecessors until free variables are captured. The generator always orders this
/// observer after all others.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyingObserver;

impl CirObserver for VerifyingObserver {
    fn name(&self) -> &'static str {
        "verifier"
    }

    fn after_stage(&self, stage: Stage, _method: &MethodActor, graph: &CirGraph) -> Result<()> {
        let verifier = Verifier::after(stage);
        if stage == Stage::InitialBuild {
            verifier.without_scoping().verify(graph)
        } else {
            verifier.verify(graph)
        }
    }

    fn is_verifier(&self) -> bool {
        true
    }
}
