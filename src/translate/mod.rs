//! Block translator: stack-machine blocks to high-level CPS-IR.
//!
//! The translator walks the block graph of a [`BirMethod`] with a worklist,
//! simulating the operand stack and the local slots symbolically. Every instruction
//! becomes one call whose continuation holds the translation of the next instruction;
//! every block becomes a [`crate::cir::Block`] ending in calls to its successors.
//!
//! # Join points
//!
//! The first path to reach a block establishes its frame and stack. Later arrivals
//! must bring an operand stack of the same depth and kinds, otherwise translation
//! fails. Frames are not compared: a local that is not bound on every incoming path
//! surfaces later as a scoping violation.
//!
//! # Exception dispatchers
//!
//! A throwing instruction inside a covered block passes a continuation that calls the
//! dispatcher with the throwable on an otherwise empty stack. Dispatchers are only
//! translated once normal control flow is exhausted, and that phase repeats until no
//! new dispatcher becomes reachable. Dispatchers that are never reached are reported
//! as warnings and skipped.
//!
//! The result is *open*: blocks refer to variables bound in their predecessors. Free
//! variable capturing closes it.

mod bytecode;
mod frame;

use std::collections::VecDeque;

use crate::{
    bir::{BirMethod, Kind},
    cir::{BlockId, BlockRole, Call, CallId, CirGraph, Value, Variable, VariableOrigin},
    error::Location,
    generator::{EventKind, EventLog},
    Error, Result,
};

pub use frame::{Frame, Stack, VariableFactory};

/// Translates a method into high-level CPS-IR.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the block graph violates its structural contract
/// and [`Error::Translation`] for stack underflow, kind mismatches, inconsistent
/// operand stacks at join points or control falling off the end of a block.
pub fn translate(method: &BirMethod, events: &EventLog) -> Result<CirGraph> {
    method.validate()?;
    MethodTranslation::new(method).run(events)
}

/// Entry state of a block, fixed by the first path that reaches it.
struct Seed {
    frame: Frame,
    stack: Stack,
}

/// Translation state of one block being scanned.
pub(crate) struct Cursor {
    /// Placeholder to be filled by the next emitted call.
    call: CallId,
    frame: Frame,
    stack: Stack,
    /// Dispatcher covering the block.
    handler: Option<usize>,
    /// Offset of the instruction being translated.
    location: Option<u32>,
}

/// State of one method translation.
pub(crate) struct MethodTranslation<'a> {
    method: &'a BirMethod,
    graph: CirGraph,
    variables: VariableFactory,
    blocks: Vec<Option<BlockId>>,
    seeds: Vec<Option<Seed>>,
    translated: Vec<bool>,
    worklist: VecDeque<usize>,
    normal_continuation: Variable,
    exception_continuation: Variable,
}

impl<'a> MethodTranslation<'a> {
    fn new(method: &'a BirMethod) -> Self {
        let mut graph = CirGraph::new(method.actor.clone());
        let normal_continuation = graph.fresh_variable(
            VariableOrigin::NormalContinuationParameter,
            method.actor.return_kind,
        );
        let exception_continuation =
            graph.fresh_variable(VariableOrigin::ExceptionContinuationParameter, Kind::Reference);
        let count = method.block_count();

        Self {
            method,
            graph,
            variables: VariableFactory::new(),
            blocks: vec![None; count],
            seeds: (0..count).map(|_| None).collect(),
            translated: vec![false; count],
            worklist: VecDeque::new(),
            normal_continuation,
            exception_continuation,
        }
    }

    fn run(mut self, events: &EventLog) -> Result<CirGraph> {
        let method = self.method;
        let actor = &method.actor;
        log::debug!("translating {actor} ({} blocks)", self.method.block_count());

        // Method closure: [arguments..., cc, ce], copying every argument into its slot.
        let mut parameters = Vec::new();
        for (index, kind) in actor.argument_kinds().into_iter().enumerate() {
            let index = u16::try_from(index)
                .map_err(|_| malformed_error!("too many arguments for {}", actor))?;
            parameters.push(
                self.graph
                    .fresh_variable(VariableOrigin::MethodParameter(index), kind),
            );
        }

        let body = self.graph.closure(self.graph.entry()).body;
        let mut cursor = Cursor {
            call: body,
            frame: Frame::new(self.method.max_locals),
            stack: Stack::default(),
            handler: None,
            location: None,
        };
        for (slot, parameter) in parameters.iter().enumerate() {
            let slot = u16::try_from(slot)
                .map_err(|_| malformed_error!("too many arguments for {}", actor))?;
            let local = self
                .variables
                .local(&mut self.graph, parameter.kind(), slot);
            cursor.frame.set(slot, parameter.kind());
            self.assign(&mut cursor, local, Value::Variable(*parameter));
        }
        parameters.push(self.normal_continuation);
        parameters.push(self.exception_continuation);
        self.graph.closure_mut(self.graph.entry()).parameters = parameters;

        // Entry code without incoming edges is emitted straight into the method closure.
        if self.method.predecessor_counts()[0] == 0 && !self.method.is_dispatcher(0) {
            self.translated[0] = true;
            cursor.handler = self.method.blocks[0].handler;
            self.scan(0, cursor)?;
        } else {
            let target = self.jump(&cursor, 0)?;
            self.finish(&cursor, Call::new(Value::Block(target), Vec::new()));
        }
        self.drain()?;

        // Exception dispatchers, until no new one becomes reachable.
        loop {
            let ready: Vec<usize> = self
                .method
                .dispatchers
                .iter()
                .copied()
                .filter(|&d| self.seeds[d].is_some() && !self.translated[d])
                .collect();
            if ready.is_empty() {
                break;
            }
            for dispatcher in ready {
                self.enqueue(dispatcher);
            }
            self.drain()?;
        }

        for &dispatcher in &self.method.dispatchers {
            if self.seeds[dispatcher].is_none() {
                log::warn!("{actor}: exception dispatcher {dispatcher} is unreachable");
                events
                    .record(EventKind::Warning)
                    .method(actor)
                    .location(u32::try_from(dispatcher).unwrap_or(u32::MAX))
                    .message(format!("exception dispatcher {dispatcher} is unreachable"));
            }
        }

        log::trace!(
            "{actor}: {} blocks, {} calls",
            self.graph.block_count(),
            self.graph.call_count()
        );
        Ok(self.graph)
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(index) = self.worklist.pop_front() {
            let Some(block) = self.blocks[index] else {
                return Err(internal_error!("block {} enqueued without a closure", index));
            };
            let Some(seed) = self.seeds[index].as_ref() else {
                return Err(internal_error!("block {} enqueued without a seed", index));
            };
            let cursor = Cursor {
                call: self.graph.closure(self.graph.block(block).closure()).body,
                frame: seed.frame.clone(),
                stack: seed.stack.clone(),
                handler: self.method.blocks[index].handler,
                location: self.method.blocks[index].offset(),
            };
            self.scan(index, cursor)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, index: usize) {
        if !self.translated[index] {
            self.translated[index] = true;
            self.worklist.push_back(index);
        }
    }

    /// Returns the block for `index`, creating an empty one on first use.
    fn block_for(&mut self, index: usize) -> BlockId {
        if let Some(block) = self.blocks[index] {
            return block;
        }
        let role = if self.method.is_dispatcher(index) {
            BlockRole::ExceptionDispatcher
        } else {
            BlockRole::Normal
        };
        let location = self.method.blocks[index].offset();
        let body = self.graph.add_placeholder(location);
        let closure = self.graph.add_closure(Vec::new(), body);
        let block = self.graph.add_block(role, closure, Some(index));
        self.blocks[index] = Some(block);
        block
    }

    /// Establishes or checks the entry state of `target`.
    fn seed(
        &mut self,
        cursor: &Cursor,
        target: usize,
        frame: Frame,
        stack: Stack,
    ) -> Result<BlockId> {
        if target >= self.method.block_count() {
            return Err(self.error(cursor, format!("branch to missing block {target}")));
        }
        let mismatch = self.seeds[target]
            .as_ref()
            .filter(|existing| existing.stack != stack)
            .map(|existing| existing.stack.depth());
        if let Some(established) = mismatch {
            return Err(self.error(
                cursor,
                format!(
                    "operand stack mismatch at join into block {target}: depth {established} vs {}",
                    stack.depth()
                ),
            ));
        }
        if self.seeds[target].is_none() {
            self.seeds[target] = Some(Seed { frame, stack });
        }
        Ok(self.block_for(target))
    }

    /// Seeds a normal successor with the current state and schedules it.
    fn jump(&mut self, cursor: &Cursor, target: usize) -> Result<BlockId> {
        let block = self.seed(cursor, target, cursor.frame.clone(), cursor.stack.clone())?;
        if !self.method.is_dispatcher(target) {
            self.enqueue(target);
        }
        Ok(block)
    }

    fn error(&self, cursor: &Cursor, message: impl Into<String>) -> Error {
        Error::Translation {
            method: self.method.actor.to_string(),
            location: Location(cursor.location),
            message: message.into(),
        }
    }

    /// Emits `procedure(arguments.., (results) -> .., exception)` and moves the cursor
    /// into the continuation.
    fn emit(
        &mut self,
        cursor: &mut Cursor,
        procedure: Value,
        mut arguments: Vec<Value>,
        results: Vec<Variable>,
        exception: Value,
    ) {
        let next = self.graph.add_placeholder(cursor.location);
        let continuation = self.graph.add_closure(results, next);
        arguments.push(Value::Closure(continuation));
        arguments.push(exception);
        self.graph
            .replace_call(cursor.call, Call::new(procedure, arguments).at(cursor.location));
        cursor.call = next;
    }

    /// Emits `((variable) -> ..)(value)`.
    fn assign(&mut self, cursor: &mut Cursor, variable: Variable, value: Value) {
        let next = self.graph.add_placeholder(cursor.location);
        let binder = self.graph.add_closure(vec![variable], next);
        self.graph.replace_call(
            cursor.call,
            Call::new(Value::Closure(binder), vec![value]).at(cursor.location),
        );
        cursor.call = next;
    }

    /// Fills the cursor with a final control transfer.
    fn finish(&mut self, cursor: &Cursor, call: Call) {
        self.graph.replace_call(cursor.call, call.at(cursor.location));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{Comparator, MethodActor, MethodAssembler, Opcode},
        cir::{visit, Builtin, Switch},
        test::{
            add_method, branch_join_method, exception_handler_method, loop_method,
            table_switch_method, unreachable_dispatcher_method,
        },
    };

    fn translated(method: &BirMethod) -> CirGraph {
        translate(method, &EventLog::new()).expect("translation failed")
    }

    #[test]
    fn test_straight_line_has_no_blocks() {
        let graph = translated(&add_method());
        assert_eq!(graph.block_count(), 0);

        let entry = graph.closure(graph.entry());
        assert_eq!(entry.parameters.len(), 4);
        assert_eq!(
            entry.parameters[2].origin(),
            VariableOrigin::NormalContinuationParameter
        );
        assert_eq!(
            entry.parameters[3].origin(),
            VariableOrigin::ExceptionContinuationParameter
        );

        let adds = visit::reachable_calls(&graph)
            .into_iter()
            .filter(|&call| matches!(graph.call(call).procedure, Value::Builtin(Builtin::Arithmetic(..))))
            .count();
        assert_eq!(adds, 1);
        assert!(visit::reachable_calls(&graph)
            .into_iter()
            .all(|call| !graph.call(call).is_placeholder()));
    }

    #[test]
    fn test_branches_become_one_case_switches() {
        let graph = translated(&branch_join_method());
        // A, B and the join block C; the entry block is inlined.
        assert_eq!(visit::reachable_blocks(&graph).len(), 3);

        let switch = visit::reachable_calls(&graph)
            .into_iter()
            .find_map(|call| match graph.call(call).procedure {
                Value::Switch(switch) => Some((call, switch)),
                _ => None,
            })
            .expect("branch translated to a switch");
        assert_eq!(switch.1, Switch::new(Kind::Int, Comparator::Equal, 1));
        assert_eq!(graph.call(switch.0).arguments.len(), 4);
    }

    #[test]
    fn test_loop_header_is_a_block() {
        let graph = translated(&loop_method());
        let sites = visit::block_call_sites(&graph);
        // Entered from the method closure and again from the loop body.
        assert!(sites.values().any(|calls| calls.len() == 2));
    }

    #[test]
    fn test_table_switch() {
        let graph = translated(&table_switch_method());
        let switch = visit::reachable_calls(&graph)
            .into_iter()
            .find_map(|call| match graph.call(call).procedure {
                Value::Switch(switch) => Some(switch),
                _ => None,
            })
            .expect("switch");
        assert_eq!(switch.cases, 3);
        assert_eq!(switch.arity(), 8);
    }

    #[test]
    fn test_dispatcher_translated_after_normal_flow() {
        let events = EventLog::new();
        let graph = translate(&exception_handler_method(), &events).expect("translation failed");
        let dispatchers: Vec<BlockId> = visit::reachable_blocks(&graph)
            .into_iter()
            .filter(|&b| graph.block(b).role() == BlockRole::ExceptionDispatcher)
            .collect();
        assert_eq!(dispatchers.len(), 1);
        assert!(events.warnings().next().is_none());
    }

    #[test]
    fn test_unreachable_dispatcher_is_soft() {
        let events = EventLog::new();
        let graph =
            translate(&unreachable_dispatcher_method(), &events).expect("translation failed");
        assert_eq!(events.warnings().count(), 1);
        assert!(graph
            .blocks()
            .all(|(_, block)| block.role() == BlockRole::Normal));
    }

    #[test]
    fn test_stack_mismatch_at_join_is_fatal() {
        let actor = MethodActor::new("T", "bad", vec![Kind::Int], Kind::Int);
        let mut asm = MethodAssembler::new(actor);
        let left = asm.new_block();
        let right = asm.new_block();
        let join = asm.new_block();
        asm.load(Kind::Int, 0).if_zero(Comparator::Equal, left, right);
        asm.select(left).iconst(1).goto(join);
        asm.select(right).goto(join);
        asm.select(join).iconst(2).add(Kind::Int).ret(Kind::Int);
        let method = asm.finish().expect("assembled");

        let error = translate(&method, &EventLog::new()).expect_err("must fail");
        assert!(matches!(error, Error::Translation { .. }), "{error}");
    }

    #[test]
    fn test_underflow_reports_location() {
        let actor = MethodActor::new("T", "under", vec![], Kind::Int);
        let mut asm = MethodAssembler::new(actor);
        asm.iconst(1).add(Kind::Int).ret(Kind::Int);
        let method = asm.finish().expect("assembled");

        match translate(&method, &EventLog::new()) {
            Err(Error::Translation { location, .. }) => assert_eq!(location, Location(Some(1))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_falling_off_the_end_is_fatal() {
        let actor = MethodActor::new("T", "open", vec![], Kind::Void);
        let mut asm = MethodAssembler::new(actor);
        asm.emit(Opcode::Pop);
        let method = asm.finish().expect("assembled");
        assert!(translate(&method, &EventLog::new()).is_err());
    }
}
