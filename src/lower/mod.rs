//! Lowering of HCIR to LCIR.
//!
//! Every [`JavaOperator`] call is rewritten in place into target-neutral [`Builtin`]
//! calls. Operations that dereference an object are guarded by an explicit
//! [`Builtin::NullCheck`] unless the initializedness results attached to the graph
//! prove the object non-null at the original call. Multi-case switches are split into
//! chains of single-case switches.
//!
//! The rewritten call keeps its id, so the closure owning it is never touched. New
//! continuation closures are introduced where one operator expands into a sequence.
//! A closure-valued exception continuation needed by several builtins of the
//! expansion is replicated for every additional use.
//!
//! # Expansions
//!
//! | Operator | Lowered form |
//! |----------|--------------|
//! | `getfield` / `putfield` | null check, `readfield` / `writefield` |
//! | `getstatic` / `putstatic` | `readstatic` / `writestatic` |
//! | `invokestatic` | `calldirect` |
//! | `invokespecial` | null check, `calldirect` |
//! | `invokevirtual` / `invokeinterface` | null check, `selectvirtual` / `selectinterface`, `callindirect` |
//! | `new` / `newarray` | `allocate` / `allocatearray` |
//! | `arrayload` / `arraystore` | null check, `boundscheck`, element access |
//! | `arraylength` | null check, `readarraylength` |
//! | `checkcast` / `instanceof` | `typecheck` / `issubtype` |
//! | `monitorenter` / `monitorexit` / `throw` | null check, builtin of the same name |

use crate::{
    bir::{InvokeKind, Kind},
    cir::{visit, Builtin, Call, CallId, CirGraph, JavaOperator, Level, Switch, Value, VariableOrigin},
    generator::{EventKind, EventLog},
    passes::CirPass,
    Result,
};

/// Rewrites HCIR operators into LCIR builtins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lowering;

/// Lowering of a single operator call.
struct Expansion<'g> {
    graph: &'g mut CirGraph,
    site: CallId,
    location: Option<u32>,
    exception: Value,
    exception_taken: bool,
    elided: bool,
}

impl Expansion<'_> {
    /// The exception continuation for one more throwing builtin.
    fn exception(&mut self) -> Value {
        if !self.exception_taken {
            self.exception_taken = true;
            return self.exception.clone();
        }
        match &self.exception {
            Value::Closure(closure) => Value::Closure(self.graph.replicate_closure(*closure)),
            other => other.clone(),
        }
    }

    fn builtin(&mut self, builtin: Builtin, mut arguments: Vec<Value>, normal: Value) -> Call {
        let exception = if builtin.can_throw() {
            self.exception()
        } else {
            Value::Undefined
        };
        arguments.push(normal);
        arguments.push(exception);
        Call::new(Value::Builtin(builtin), arguments).at(self.location)
    }

    /// Sequences `call` after a parameterless continuation.
    fn then(&mut self, call: Call) -> Value {
        let body = self.graph.add_call(call);
        Value::Closure(self.graph.add_closure(Vec::new(), body))
    }

    /// Guards `call` by a null check of `object`.
    fn checked(&mut self, object: &Value, call: Call) -> Call {
        let known = object
            .as_variable()
            .is_some_and(|variable| self.graph.is_initialized_at(self.site, variable));
        if known {
            self.elided = true;
            return call;
        }
        let next = self.then(call);
        self.builtin(Builtin::NullCheck, vec![object.clone()], next)
    }

    fn lower(&mut self, op: JavaOperator, arguments: Vec<Value>, normal: Value) -> Result<Call> {
        let first = arguments.first().cloned();
        let object = || {
            first
                .clone()
                .ok_or_else(|| internal_error!("{} has no object operand", op))
        };

        let call = match &op {
            JavaOperator::GetField(field) => {
                let read = self.builtin(Builtin::ReadField(field.clone()), arguments, normal);
                self.checked(&object()?, read)
            }
            JavaOperator::PutField(field) => {
                let write = self.builtin(Builtin::WriteField(field.clone()), arguments, normal);
                self.checked(&object()?, write)
            }
            JavaOperator::GetStatic(field) => {
                self.builtin(Builtin::ReadStatic(field.clone()), arguments, normal)
            }
            JavaOperator::PutStatic(field) => {
                self.builtin(Builtin::WriteStatic(field.clone()), arguments, normal)
            }
            JavaOperator::Invoke(InvokeKind::Static, method) => {
                self.builtin(Builtin::CallDirect(method.clone()), arguments, normal)
            }
            JavaOperator::Invoke(InvokeKind::Special, method) => {
                let call = self.builtin(Builtin::CallDirect(method.clone()), arguments, normal);
                self.checked(&object()?, call)
            }
            JavaOperator::Invoke(kind, method) => {
                let receiver = object()?;
                let target = self
                    .graph
                    .synthetic_variable(VariableOrigin::Temporary, Kind::Word);
                let mut indirect = Vec::with_capacity(arguments.len() + 3);
                indirect.push(Value::Variable(target));
                indirect.extend(arguments);
                let dispatch = self.builtin(Builtin::CallIndirect(method.clone()), indirect, normal);
                let body = self.graph.add_call(dispatch);
                let continuation = Value::Closure(self.graph.add_closure(vec![target], body));

                let select = if *kind == InvokeKind::Interface {
                    Builtin::SelectInterface(method.clone())
                } else {
                    Builtin::SelectVirtual(method.clone())
                };
                let select = self.builtin(select, vec![receiver.clone()], continuation);
                self.checked(&receiver, select)
            }
            JavaOperator::New(ty) => self.builtin(Builtin::Allocate(ty.clone()), arguments, normal),
            JavaOperator::NewArray(ty) => {
                self.builtin(Builtin::AllocateArray(ty.clone()), arguments, normal)
            }
            JavaOperator::ArrayLoad(kind) | JavaOperator::ArrayStore(kind) => {
                let array = object()?;
                let index = arguments
                    .get(1)
                    .cloned()
                    .ok_or_else(|| internal_error!("{} has no index operand", op))?;
                let access = if matches!(op, JavaOperator::ArrayLoad(_)) {
                    Builtin::ReadArrayElement(*kind)
                } else {
                    Builtin::WriteArrayElement(*kind)
                };
                let access = self.builtin(access, arguments, normal);
                let next = self.then(access);
                let bounded = self.builtin(Builtin::BoundsCheck, vec![array.clone(), index], next);
                self.checked(&array, bounded)
            }
            JavaOperator::ArrayLength => {
                let read = self.builtin(Builtin::ReadArrayLength, arguments, normal);
                self.checked(&object()?, read)
            }
            JavaOperator::CheckCast(ty) => {
                self.builtin(Builtin::TypeCheck(ty.clone()), arguments, normal)
            }
            JavaOperator::InstanceOf(ty) => {
                self.builtin(Builtin::IsSubtype(ty.clone()), arguments, normal)
            }
            JavaOperator::MonitorEnter | JavaOperator::MonitorExit | JavaOperator::Throw => {
                let builtin = match op {
                    JavaOperator::MonitorEnter => Builtin::MonitorEnter,
                    JavaOperator::MonitorExit => Builtin::MonitorExit,
                    _ => Builtin::Throw,
                };
                let call = self.builtin(builtin, arguments, normal);
                self.checked(&object()?, call)
            }
        };
        Ok(call)
    }
}

/// Counters reported once per run.
#[derive(Debug, Default)]
struct Statistics {
    operators: usize,
    switches: usize,
    elided: usize,
}

impl Lowering {
    fn lower_operator(
        graph: &mut CirGraph,
        id: CallId,
        op: JavaOperator,
        statistics: &mut Statistics,
    ) -> Result<()> {
        let call = graph.call(id).clone();
        let arity = op.arity();
        if call.arguments.len() != arity + 2 {
            return Err(internal_error!(
                "{} passes {} arguments to {}, expected {}",
                id,
                call.arguments.len(),
                op,
                arity + 2
            ));
        }

        let mut arguments = call.arguments;
        let mut continuations = arguments.split_off(arity).into_iter();
        let (Some(normal), Some(exception)) = (continuations.next(), continuations.next()) else {
            return Err(internal_error!("{} lacks continuations", id));
        };

        let mut expansion = Expansion {
            graph: &mut *graph,
            site: id,
            location: call.location,
            exception,
            exception_taken: false,
            elided: false,
        };
        let lowered = expansion.lower(op, arguments, normal)?;
        if expansion.elided {
            statistics.elided += 1;
        }
        graph.replace_call(id, lowered);
        statistics.operators += 1;
        Ok(())
    }

    /// Splits an n-case switch into n single-case switches tried in order.
    fn split_switch(graph: &mut CirGraph, id: CallId, switch: Switch) -> Result<()> {
        let call = graph.call(id).clone();
        let cases = switch.cases;
        if call.arguments.len() != switch.arity() {
            return Err(internal_error!(
                "{} passes {} arguments to {}",
                id,
                call.arguments.len(),
                switch
            ));
        }

        let discriminant = call.arguments[0].clone();
        let matches = call.arguments[1..=cases].iter().cloned();
        let targets = call.arguments[cases + 1..=2 * cases].iter().cloned();
        let mut arms: Vec<(Value, Value)> = matches.zip(targets).collect();
        let mut otherwise = call.arguments[2 * cases + 1].clone();
        let single = Value::Switch(Switch::new(switch.kind, switch.comparator, 1));

        for (value, target) in arms.drain(1..).rev() {
            let body = graph.add_call(
                Call::new(
                    single.clone(),
                    vec![discriminant.clone(), value, target, otherwise],
                )
                .at(call.location),
            );
            otherwise = Value::Closure(graph.add_closure(Vec::new(), body));
        }
        let Some((value, target)) = arms.pop() else {
            return Err(internal_error!("{} has no cases to split", id));
        };
        graph.replace_call(
            id,
            Call::new(single, vec![discriminant, value, target, otherwise]).at(call.location),
        );
        Ok(())
    }
}

impl CirPass for Lowering {
    fn name(&self) -> &'static str {
        "lowering"
    }

    fn run(&self, graph: &mut CirGraph, events: &EventLog) -> Result<bool> {
        let mut statistics = Statistics::default();

        for id in visit::reachable_calls(graph) {
            match graph.call(id).procedure.clone() {
                Value::Operator(op) => Self::lower_operator(graph, id, op, &mut statistics)?,
                Value::Switch(switch) if switch.cases > 1 => {
                    Self::split_switch(graph, id, switch)?;
                    statistics.switches += 1;
                }
                _ => {}
            }
        }
        graph.set_level(Level::Low);

        log::debug!(
            "{}: lowered {} operators, split {} switches, elided {} null checks",
            graph.method(),
            statistics.operators,
            statistics.switches,
            statistics.elided
        );
        if statistics.operators + statistics.switches > 0 {
            events
                .record(EventKind::OperatorLowered)
                .method(graph.method())
                .stage(self.name())
                .message(format!(
                    "{} operators lowered, {} switches split",
                    statistics.operators, statistics.switches
                ));
        }
        if statistics.elided > 0 {
            events
                .record(EventKind::NullCheckElided)
                .method(graph.method())
                .stage(self.name())
                .message(format!("{} null checks elided", statistics.elided));
        }
        Ok(statistics.operators + statistics.switches > 0)
    }

    fn description(&self) -> &'static str {
        "Rewrites VM operators into target-neutral builtins"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataflow::{DataFlowSolver, InitializedAnalysis},
        passes::{AlphaConversion, DeadLocalPruning, FreeVariableCapture, Verifier},
        test::{field_getter_method, field_sum_method, prepared, table_switch_method},
    };

    fn lowered(method: &crate::bir::BirMethod) -> (CirGraph, EventLog) {
        let events = EventLog::new();
        let mut graph = prepared(method);
        let results = DataFlowSolver::new(InitializedAnalysis).solve(&graph);
        graph.set_initialized(results);
        Lowering.run(&mut graph, &events).expect("lowered");
        (graph, events)
    }

    fn count(graph: &CirGraph, wanted: fn(&Value) -> bool) -> usize {
        visit::reachable_calls(graph)
            .into_iter()
            .filter(|&call| wanted(&graph.call(call).procedure))
            .count()
    }

    #[test]
    fn test_second_dereference_is_unchecked() {
        let (graph, events) = lowered(&field_sum_method());

        assert_eq!(graph.level(), Level::Low);
        assert_eq!(count(&graph, |p| matches!(p, Value::Operator(_))), 0);
        assert_eq!(count(&graph, |p| *p == Value::Builtin(Builtin::NullCheck)), 1);
        assert_eq!(
            count(&graph, |p| matches!(p, Value::Builtin(Builtin::ReadField(_)))),
            2
        );
        assert_eq!(events.count_kind(EventKind::NullCheckElided), 1);
    }

    #[test]
    fn test_receiver_needs_no_check() {
        let (graph, _) = lowered(&field_getter_method());
        assert_eq!(count(&graph, |p| *p == Value::Builtin(Builtin::NullCheck)), 0);
        Verifier::after("lowering").verify(&graph).expect("valid");
    }

    #[test]
    fn test_table_switch_becomes_chain() {
        let (mut graph, events) = lowered(&table_switch_method());

        let switches: Vec<Switch> = visit::reachable_calls(&graph)
            .into_iter()
            .filter_map(|call| match graph.call(call).procedure {
                Value::Switch(switch) => Some(switch),
                _ => None,
            })
            .collect();
        assert_eq!(switches.len(), 3);
        assert!(switches.iter().all(|switch| switch.cases == 1));

        FreeVariableCapture.run(&mut graph, &events).expect("captured");
        AlphaConversion.run(&mut graph, &events).expect("converted");
        DeadLocalPruning.run(&mut graph, &events).expect("pruned");
        Verifier::after("lowering").verify(&graph).expect("valid");
    }
}
