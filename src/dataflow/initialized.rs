//! Initializedness analysis.
//!
//! Tracks, for every reference variable, whether it is known to hold a fully
//! constructed, non-null object. Lowering consults the result to drop null checks on
//! receivers that are already known to be initialized.
//!
//! Sources of knowledge:
//!
//! - the receiver of an instance method is initialized on entry
//! - `new` yields an uninitialized object until its `<init>` has been invoked
//! - a reference that was successfully dereferenced is initialized in the normal
//!   continuation of the dereferencing operation
//! - caught throwables are initialized

use crate::{
    bir::InvokeKind,
    cir::{Builtin, CallId, CirGraph, JavaOperator, Value},
    dataflow::{DataFlowAnalysis, Environment, MeetSemiLattice},
};

/// Initializedness of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializedState {
    /// Not reached yet (top).
    Unreached,
    /// Known to be a constructed, non-null object.
    Initialized,
    /// Allocated, constructor not yet invoked.
    Uninitialized,
    /// Nothing is known; may be null (bottom).
    Unknown,
}

impl MeetSemiLattice for InitializedState {
    fn top() -> Self {
        Self::Unreached
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Unreached, x) | (x, Self::Unreached) => *x,
            (a, b) if a == b => *a,
            _ => Self::Unknown,
        }
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// The initializedness analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitializedAnalysis;

impl InitializedAnalysis {
    /// Returns `true` if completing the call normally proves its first argument non-null.
    fn dereferenced(procedure: &Value) -> bool {
        match procedure {
            Value::Operator(op) => matches!(
                op,
                JavaOperator::GetField(_)
                    | JavaOperator::PutField(_)
                    | JavaOperator::Invoke(InvokeKind::Virtual | InvokeKind::Interface, _)
                    | JavaOperator::ArrayLoad(_)
                    | JavaOperator::ArrayStore(_)
                    | JavaOperator::ArrayLength
                    | JavaOperator::MonitorEnter
                    | JavaOperator::MonitorExit
            ),
            Value::Builtin(builtin) => matches!(
                builtin,
                Builtin::NullCheck | Builtin::SelectVirtual(_) | Builtin::SelectInterface(_)
            ),
            _ => false,
        }
    }
}

impl DataFlowAnalysis for InitializedAnalysis {
    type Lattice = InitializedState;

    fn name(&self) -> &'static str {
        "initializedness"
    }

    fn boundary(&self, graph: &CirGraph) -> Environment<InitializedState> {
        let entry = graph.closure(graph.entry());
        let has_receiver = !graph.method().is_static();
        let arguments = graph.method().argument_kinds().len();

        entry
            .parameters
            .iter()
            .take(arguments)
            .enumerate()
            .map(|(index, parameter)| {
                let state = if index == 0 && has_receiver {
                    InitializedState::Initialized
                } else {
                    InitializedState::Unknown
                };
                (*parameter, state)
            })
            .collect()
    }

    fn evaluate(&self, value: &Value, env: &Environment<InitializedState>) -> InitializedState {
        match value {
            Value::Variable(v) => env.get(v).copied().unwrap_or(InitializedState::Unreached),
            _ => InitializedState::Unknown,
        }
    }

    fn transfer(
        &self,
        graph: &CirGraph,
        call: CallId,
        env: &Environment<InitializedState>,
    ) -> Environment<InitializedState> {
        let call = graph.call(call);
        let Some(receiver) = call.arguments.first().and_then(Value::as_variable) else {
            return env.clone();
        };

        let initializer = matches!(
            &call.procedure,
            Value::Operator(JavaOperator::Invoke(InvokeKind::Special, method))
                if method.is_initializer()
        );

        let current = env.get(&receiver).copied();
        if initializer
            || (Self::dereferenced(&call.procedure) && current == Some(InitializedState::Unknown))
        {
            env.update(receiver, InitializedState::Initialized)
        } else {
            env.clone()
        }
    }

    fn result(
        &self,
        graph: &CirGraph,
        call: CallId,
        env: &Environment<InitializedState>,
    ) -> InitializedState {
        let call = graph.call(call);
        match &call.procedure {
            Value::Operator(JavaOperator::New(_)) | Value::Builtin(Builtin::Allocate(_)) => {
                InitializedState::Uninitialized
            }
            Value::Operator(JavaOperator::NewArray(_))
            | Value::Builtin(Builtin::AllocateArray(_)) => InitializedState::Initialized,
            Value::Operator(JavaOperator::CheckCast(_)) | Value::Builtin(Builtin::TypeCheck(_)) => {
                call.arguments
                    .first()
                    .map_or(InitializedState::Unknown, |object| self.evaluate(object, env))
            }
            _ => InitializedState::Unknown,
        }
    }

    fn exception(&self) -> InitializedState {
        InitializedState::Initialized
    }
}
