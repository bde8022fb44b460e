//! Per-method orchestration of the CPS-IR pipeline.
//!
//! [`CirGenerator`] turns a [`BirMethod`] into a finished, verified [`CirGraph`] and
//! stores it in the [`CompilationSession`]'s method cache. Each method runs through
//! the stages of [`Stage`] in order, every stage bracketed by observer notifications:
//!
//! ```text
//! InitialBuild → CaptureHigh → AlphaHigh → PruneHigh → CopyPropagation
//!   → DataflowAnalysis → Lowering → CaptureLow → AlphaLow → PruneLow → Optimization
//! ```
//!
//! Methods that are static, foldable and parameterless skip the pipeline: their graph
//! is a single call yielding the constant computed by the configured
//! [`ConstantFolder`].
//!
//! # Examples
//!
//! ```rust
//! use cirgen::bir::{Kind, MethodActor, MethodAssembler, MethodFlags};
//! use cirgen::generator::{CirGenerator, CompilationSession};
//!
//! let actor = MethodActor::new("Math", "add", vec![Kind::Int, Kind::Int], Kind::Int)
//!     .with_flags(MethodFlags::STATIC);
//! let mut asm = MethodAssembler::new(actor);
//! asm.load(Kind::Int, 0).load(Kind::Int, 1).add(Kind::Int).ret(Kind::Int);
//! let method = asm.finish()?;
//!
//! let generator = CirGenerator::builder().build();
//! let session = CompilationSession::new();
//! let record = generator.generate(&session, &method)?;
//! assert!(record.is_generated());
//! # Ok::<(), cirgen::Error>(())
//! ```

mod cache;
mod events;
mod observer;

use std::sync::Arc;

use rayon::prelude::*;
use strum::{EnumCount, EnumIter};

pub use cache::{CompilationSession, MethodRecord, Phase};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use observer::{CirObserver, TracingObserver, VerifyingObserver};

use crate::{
    bir::{BirMethod, Constant, MethodActor},
    cir::{Call, CirGraph, Level, Value, VariableOrigin},
    dataflow::{DataFlowSolver, InitializedAnalysis},
    lower::Lowering,
    optimize::{InliningPolicy, Optimizer, StaticPolicy, DEFAULT_MAX_ROUNDS},
    passes::{AlphaConversion, CirPass, CopyPropagation, DeadLocalPruning, FreeVariableCapture, Verifier},
    translate::translate,
    Error, Result,
};

/// The pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, EnumIter, EnumCount,
)]
pub enum Stage {
    /// Block translation of the input graph.
    #[strum(serialize = "initial build")]
    InitialBuild,
    /// Free-variable capturing on HCIR.
    #[strum(serialize = "capture (high)")]
    CaptureHigh,
    /// Alpha-conversion on HCIR.
    #[strum(serialize = "alpha (high)")]
    AlphaHigh,
    /// Dead-local pruning on HCIR.
    #[strum(serialize = "pruning (high)")]
    PruneHigh,
    /// Copy propagation.
    #[strum(serialize = "copy propagation")]
    CopyPropagation,
    /// Initializedness analysis.
    #[strum(serialize = "dataflow analysis")]
    DataflowAnalysis,
    /// HCIR to LCIR.
    #[strum(serialize = "lowering")]
    Lowering,
    /// Free-variable capturing on LCIR.
    #[strum(serialize = "capture (low)")]
    CaptureLow,
    /// Alpha-conversion on LCIR.
    #[strum(serialize = "alpha (low)")]
    AlphaLow,
    /// Dead-local pruning on LCIR.
    #[strum(serialize = "pruning (low)")]
    PruneLow,
    /// Folding and inlining; announced even when disabled.
    #[strum(serialize = "optimization")]
    Optimization,
}

/// Supplies the results of foldable, parameterless methods.
pub trait ConstantFolder: Send + Sync {
    /// Evaluates `method`.
    ///
    /// # Errors
    ///
    /// Any error is reported as [`Error::Folding`] for `method`.
    fn fold(&self, method: &MethodActor) -> Result<Constant>;
}

impl<F> ConstantFolder for F
where
    F: Fn(&MethodActor) -> Result<Constant> + Send + Sync,
{
    fn fold(&self, method: &MethodActor) -> Result<Constant> {
        self(method)
    }
}

/// Configuration of a [`CirGenerator`].
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Observers in notification order, excluding the verifying observer.
    pub observers: Vec<Arc<dyn CirObserver>>,
    /// Whether a [`VerifyingObserver`] runs after all other observers.
    pub verify: bool,
    /// Whether the optimization stage does any work.
    pub optimize: bool,
    /// Inlining policy for methods without an inlining budget.
    pub policy: Arc<dyn InliningPolicy>,
    /// Folder for the fast path; foldable methods fail without one.
    pub folder: Option<Arc<dyn ConstantFolder>>,
    /// Upper bound on optimizer rounds.
    pub max_rounds: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            verify: true,
            optimize: true,
            policy: Arc::new(StaticPolicy),
            folder: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field(
                "observers",
                &self.observers.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .field("verify", &self.verify)
            .field("optimize", &self.optimize)
            .field("policy", &self.policy.name())
            .field("folder", &self.folder.is_some())
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

/// Fluent construction of a [`CirGenerator`].
#[derive(Debug, Default)]
pub struct GeneratorBuilder {
    config: GeneratorConfig,
}

impl GeneratorBuilder {
    /// Appends an observer.
    ///
    /// A [`VerifyingObserver`] is not appended; it enables verification instead, so
    /// there is at most one and it stays last.
    #[must_use]
    pub fn observer(mut self, observer: impl CirObserver + 'static) -> Self {
        if observer.is_verifier() {
            self.config.verify = true;
        } else {
            self.config.observers.push(Arc::new(observer));
        }
        self
    }

    /// Enables or disables verification after every stage.
    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    /// Enables or disables the optimizer.
    #[must_use]
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.config.optimize = optimize;
        self
    }

    /// Sets the default inlining policy.
    #[must_use]
    pub fn policy(mut self, policy: impl InliningPolicy + 'static) -> Self {
        self.config.policy = Arc::new(policy);
        self
    }

    /// Sets the folder used for foldable methods.
    #[must_use]
    pub fn folder(mut self, folder: impl ConstantFolder + 'static) -> Self {
        self.config.folder = Some(Arc::new(folder));
        self
    }

    /// Limits the number of optimizer rounds.
    #[must_use]
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.config.max_rounds = max_rounds;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> CirGenerator {
        CirGenerator::new(self.config)
    }
}

/// Drives methods through the pipeline and caches the results.
#[derive(Clone)]
pub struct CirGenerator {
    config: GeneratorConfig,
    observers: Vec<Arc<dyn CirObserver>>,
}

impl std::fmt::Debug for CirGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CirGenerator")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for CirGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl CirGenerator {
    /// Creates a generator. The verifying observer, if enabled, is ordered last.
    #[must_use]
    pub fn new(mut config: GeneratorConfig) -> Self {
        if config.observers.iter().any(|observer| observer.is_verifier()) {
            config.observers.retain(|observer| !observer.is_verifier());
            config.verify = true;
        }
        let mut observers = config.observers.clone();
        if config.verify {
            observers.push(Arc::new(VerifyingObserver));
        }
        Self { config, observers }
    }

    /// Starts a configuration.
    #[must_use]
    pub fn builder() -> GeneratorBuilder {
        GeneratorBuilder::default()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Returns the record for `method`, generating it if this call created it.
    ///
    /// A caller that finds an existing record gets it back unchanged, whether or not
    /// its generation has completed. A failed generation leaves no record behind.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a stage, an observer or the fast-path folder.
    pub fn generate(
        &self,
        session: &CompilationSession,
        method: &BirMethod,
    ) -> Result<Arc<MethodRecord>> {
        let (record, created) = session.create_method(method.actor.clone())?;
        if !created {
            return Ok(record);
        }

        let events = session.events();
        let result = if method.actor.is_foldable_without_arguments() {
            self.fold(&method.actor, events)
        } else {
            self.build(method, events)
        };

        match result {
            Ok(graph) => {
                record.complete(graph);
                events
                    .record(EventKind::MethodGenerated)
                    .method(&method.actor)
                    .message("generated");
                Ok(record)
            }
            Err(error) => {
                session.remove(&method.actor);
                log::debug!("{}: generation failed: {error}", method.actor);
                events
                    .record(EventKind::Error)
                    .method(&method.actor)
                    .message(error.to_string());
                Err(error)
            }
        }
    }

    /// Generates independent methods in parallel.
    ///
    /// Results are returned in input order.
    pub fn generate_all(
        &self,
        session: &CompilationSession,
        methods: &[BirMethod],
    ) -> Vec<Result<Arc<MethodRecord>>> {
        methods
            .par_iter()
            .map(|method| self.generate(session, method))
            .collect()
    }

    /// Runs the full pipeline on `method` without consulting any cache.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a stage or an observer.
    pub fn build(&self, method: &BirMethod, events: &EventLog) -> Result<CirGraph> {
        let actor = &method.actor;

        self.before(Stage::InitialBuild, actor, None, events)?;
        let mut graph = translate(method, events)?;
        self.after(Stage::InitialBuild, actor, &graph, events)?;

        for stage in [
            Stage::CaptureHigh,
            Stage::AlphaHigh,
            Stage::PruneHigh,
            Stage::CopyPropagation,
            Stage::DataflowAnalysis,
            Stage::Lowering,
            Stage::CaptureLow,
            Stage::AlphaLow,
            Stage::PruneLow,
            Stage::Optimization,
        ] {
            self.before(stage, actor, Some(&graph), events)?;
            self.run_stage(stage, &mut graph, events)?;
            self.after(stage, actor, &graph, events)?;
        }
        Ok(graph)
    }

    fn run_stage(&self, stage: Stage, graph: &mut CirGraph, events: &EventLog) -> Result<()> {
        match stage {
            Stage::InitialBuild => {
                return Err(internal_error!("the initial build is not a graph stage"));
            }
            Stage::CaptureHigh | Stage::CaptureLow => {
                FreeVariableCapture.run(graph, events)?;
            }
            Stage::AlphaHigh | Stage::AlphaLow => {
                AlphaConversion.run(graph, events)?;
            }
            Stage::PruneHigh | Stage::PruneLow => {
                DeadLocalPruning.run(graph, events)?;
            }
            Stage::CopyPropagation => {
                CopyPropagation.run(graph, events)?;
            }
            Stage::DataflowAnalysis => {
                let results = DataFlowSolver::new(InitializedAnalysis).solve(graph);
                graph.set_initialized(results);
            }
            Stage::Lowering => {
                Lowering.run(graph, events)?;
            }
            Stage::Optimization => {
                if self.config.optimize {
                    Optimizer::new(Arc::clone(&self.config.policy), self.config.max_rounds)
                        .run(graph, events)?;
                }
            }
        }
        Ok(())
    }

    fn before(
        &self,
        stage: Stage,
        actor: &MethodActor,
        graph: Option<&CirGraph>,
        events: &EventLog,
    ) -> Result<()> {
        log::debug!("{actor}: {stage}");
        events.record(EventKind::StageStarted).method(actor).stage(stage);
        for observer in &self.observers {
            observer.before_stage(stage, actor, graph)?;
        }
        Ok(())
    }

    fn after(
        &self,
        stage: Stage,
        actor: &MethodActor,
        graph: &CirGraph,
        events: &EventLog,
    ) -> Result<()> {
        for observer in &self.observers {
            observer.after_stage(stage, actor, graph)?;
        }
        events.record(EventKind::StageCompleted).method(actor).stage(stage);
        Ok(())
    }

    /// Builds the graph of a foldable, parameterless method: `(cc, ce) -> c(cc)`.
    fn fold(&self, actor: &MethodActor, events: &EventLog) -> Result<CirGraph> {
        let folding = |message: String| Error::Folding {
            method: actor.to_string(),
            message,
        };
        let folder = self
            .config
            .folder
            .as_ref()
            .ok_or_else(|| folding("no constant folder configured".to_string()))?;
        let constant = folder.fold(actor).map_err(|error| match error {
            Error::Folding { .. } => error,
            other => folding(other.to_string()),
        })?;
        if constant.kind() != actor.return_kind {
            return Err(folding(format!(
                "folded to {} but the method returns {}",
                constant.kind(),
                actor.return_kind
            )));
        }

        let mut graph = CirGraph::new(actor.clone());
        let cc = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, actor.return_kind);
        let ce = graph.fresh_variable(
            VariableOrigin::ExceptionContinuationParameter,
            crate::bir::Kind::Reference,
        );
        let entry = graph.entry();
        graph.closure_mut(entry).parameters = vec![cc, ce];
        let body = graph.closure(entry).body;
        graph.replace_call(
            body,
            Call::new(Value::Constant(constant), vec![Value::Variable(cc)]),
        );
        graph.set_level(Level::Low);

        if self.config.verify {
            Verifier::after("folding").verify(&graph)?;
        }
        events
            .record(EventKind::MethodFolded)
            .method(actor)
            .message(format!("folded to {constant}"));
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::{
        bir::{Kind, MethodAssembler, MethodFlags},
        test::{add_method, branch_join_method},
    };

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(bool, Stage)>>,
    }

    impl CirObserver for Arc<Recorder> {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn before_stage(&self, stage: Stage, _: &MethodActor, graph: Option<&CirGraph>) -> Result<()> {
            assert_eq!(graph.is_none(), stage == Stage::InitialBuild);
            self.seen.lock().map_err(|_| Error::LockError)?.push((true, stage));
            Ok(())
        }

        fn after_stage(&self, stage: Stage, _: &MethodActor, _: &CirGraph) -> Result<()> {
            self.seen.lock().map_err(|_| Error::LockError)?.push((false, stage));
            Ok(())
        }
    }

    fn answer() -> BirMethod {
        let actor = MethodActor::new("T", "answer", vec![], Kind::Int)
            .with_flags(MethodFlags::STATIC | MethodFlags::FOLDABLE);
        let mut asm = MethodAssembler::new(actor);
        asm.iconst(40).iconst(2).add(Kind::Int).ret(Kind::Int);
        asm.finish().expect("assembled")
    }

    #[test]
    fn test_single_verifier_is_last() {
        let recorder = Arc::new(Recorder::default());
        let generator = CirGenerator::builder()
            .verify(false)
            .observer(VerifyingObserver)
            .observer(Arc::clone(&recorder))
            .build();
        assert!(generator.config().verify);
        let names: Vec<&str> = generator.observers.iter().map(|o| o.name()).collect();
        assert_eq!(names, ["recorder", "verifier"]);

        let config = GeneratorConfig {
            observers: vec![Arc::new(VerifyingObserver), Arc::new(TracingObserver)],
            verify: false,
            ..GeneratorConfig::default()
        };
        let generator = CirGenerator::new(config);
        let verifiers = generator.observers.iter().filter(|o| o.is_verifier()).count();
        assert_eq!(verifiers, 1);
        assert!(generator.observers.last().is_some_and(|o| o.is_verifier()));
    }

    #[test]
    fn test_stages_bracketed_in_order() {
        let recorder = Arc::new(Recorder::default());
        let generator = CirGenerator::builder()
            .observer(Arc::clone(&recorder))
            .build();
        let session = CompilationSession::new();
        generator.generate(&session, &branch_join_method()).expect("generated");

        let seen = recorder.seen.lock().expect("lock").clone();
        let expected: Vec<(bool, Stage)> = Stage::iter()
            .flat_map(|stage| [(true, stage), (false, stage)])
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(seen.len(), 2 * Stage::COUNT);
        assert_eq!(
            session.events().count_kind(EventKind::StageCompleted),
            Stage::COUNT
        );
    }

    #[test]
    fn test_fast_path_uses_folder() {
        let generator = CirGenerator::builder()
            .folder(|_: &MethodActor| -> Result<Constant> { Ok(Constant::Int(42)) })
            .build();
        let session = CompilationSession::new();

        let first = generator.generate(&session, &answer()).expect("folded");
        let second = generator.generate(&session, &answer()).expect("cached");
        let graph = first.graph().expect("generated");
        assert!(Arc::ptr_eq(graph, second.graph().expect("generated")));

        let body = graph.call(graph.closure(graph.entry()).body);
        assert_eq!(body.procedure, Value::Constant(Constant::Int(42)));
        assert_eq!(session.events().count_kind(EventKind::MethodFolded), 1);
    }

    #[test]
    fn test_missing_folder_leaves_no_record() {
        let generator = CirGenerator::default();
        let session = CompilationSession::new();
        let error = generator.generate(&session, &answer()).expect_err("no folder");
        assert!(matches!(error, Error::Folding { .. }));
        assert!(session.is_empty());
    }

    #[test]
    fn test_disabled_optimizer_keeps_blocks() {
        let generator = CirGenerator::builder().optimize(false).build();
        let session = CompilationSession::new();
        let record = generator.generate(&session, &branch_join_method()).expect("generated");
        let graph = record.graph().expect("generated");
        assert!(!crate::cir::visit::reachable_blocks(graph).is_empty());
        assert_eq!(graph.level(), Level::Low);
    }

    #[test]
    fn test_generate_all_parallel() {
        let generator = CirGenerator::default();
        let session = CompilationSession::new();
        let methods = vec![add_method(), branch_join_method(), add_method()];
        let results = generator.generate_all(&session, &methods);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(session.len(), 2);
    }
}
