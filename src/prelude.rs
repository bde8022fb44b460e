//! # cirgen Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cirgen library. Import this module to get quick access to the essential
//! types for generating CPS-IR from block-form methods.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cirgen operations
pub use crate::Error;

/// The result type used throughout cirgen
pub use crate::Result;

// ================================================================================================
// Input Methods
// ================================================================================================

/// Value kinds and literals
pub use crate::bir::{Constant, Kind};

/// Method identity and member references
pub use crate::bir::{FieldRef, MethodActor, MethodFlags, MethodRef, TypeRef};

/// Block-form methods and their construction
pub use crate::bir::{BirBlock, BirMethod, Comparator, InvokeKind, MethodAssembler, Opcode};

// ================================================================================================
// CPS-IR
// ================================================================================================

/// The graph and its nodes
pub use crate::cir::{BlockId, BlockRole, Call, CallId, CirGraph, ClosureId, Level};

/// Values, variables and procedures
pub use crate::cir::{Builtin, JavaOperator, Switch, Value, Variable, VariableOrigin};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Orchestration and caching
pub use crate::generator::{
    CirGenerator, CompilationSession, ConstantFolder, GeneratorConfig, MethodRecord, Phase,
    Stage,
};

/// Observation of stages and recorded events
pub use crate::generator::{
    CirObserver, EventKind, EventLog, TracingObserver, VerifyingObserver,
};

/// Inlining policies
pub use crate::optimize::{BudgetPolicy, DynamicPolicy, InliningPolicy, StaticPolicy};

/// Passes that can be run on their own
pub use crate::passes::{CirPass, Verifier};
