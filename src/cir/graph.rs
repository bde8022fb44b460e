//! Arena storage for the CPS-IR of one method.
//!
//! All closures, calls and blocks of a method live in a [`CirGraph`] and refer to each
//! other through copyable ids. Rewriting passes mutate nodes in place: a call keeps its
//! id when its contents are replaced, so the closure owning it never needs to be
//! touched. Nodes that become unreachable are left in the arena.
//!
//! # Sharing rules
//!
//! - A closure is owned by exactly one value. Duplicating a closure-valued argument
//!   requires [`CirGraph::replicate_closure`].
//! - Blocks are shared by every call that names them. Their incoming-call lists are
//!   bookkeeping that may be stale between a rewrite and the next
//!   [`crate::passes::update_block_calls`].
//! - A block's recursion flag is computed lazily and memoized; replacing the block's
//!   closure or cloning the block resets it.

use std::{
    fmt,
    mem,
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
};

use crate::{
    bir::{Kind, MethodActor},
    cir::{visit, Value, Variable, VariableOrigin},
    dataflow::{AnalysisResults, InitializedState},
};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(u32::try_from(index).unwrap_or(u32::MAX))
            }

            /// Position of the node in its arena.
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Identifies a [`Closure`] inside a [`CirGraph`].
    ClosureId,
    "C"
);
arena_id!(
    /// Identifies a [`Call`] inside a [`CirGraph`].
    CallId,
    "K"
);
arena_id!(
    /// Identifies a [`Block`] inside a [`CirGraph`].
    BlockId,
    "B"
);

/// A procedure with a parameter list and a single call as its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    /// Formal parameters.
    pub parameters: Vec<Variable>,
    /// The body.
    pub body: CallId,
}

/// Application of a procedure to arguments.
///
/// Calls represent both ordinary operations and control transfer; there is no
/// separate notion of a return.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The applied procedure.
    pub procedure: Value,
    /// The actual arguments, continuations included.
    pub arguments: Vec<Value>,
    /// Bytecode offset of the instruction the call was translated from.
    pub location: Option<u32>,
}

impl Call {
    /// Creates a call.
    #[must_use]
    pub fn new(procedure: Value, arguments: Vec<Value>) -> Self {
        Self {
            procedure,
            arguments,
            location: None,
        }
    }

    /// Sets the source location.
    #[must_use]
    pub fn at(mut self, location: Option<u32>) -> Self {
        self.location = location;
        self
    }

    /// A call that has not been filled in yet.
    #[must_use]
    pub fn placeholder(location: Option<u32>) -> Self {
        Self {
            procedure: Value::Undefined,
            arguments: Vec::new(),
            location,
        }
    }

    /// Returns `true` while the call has not been filled in.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.procedure.is_undefined()
    }
}

/// Role of a block in the method's control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRole {
    /// Reached through normal control flow.
    Normal,
    /// Entered with a pending throwable when a covered operation throws.
    ExceptionDispatcher,
}

/// A shareable, named closure: one node of the method's control-flow graph.
#[derive(Debug)]
pub struct Block {
    role: BlockRole,
    closure: ClosureId,
    origin: Option<usize>,
    calls: Vec<CallId>,
    recursive: OnceLock<bool>,
    searches: AtomicUsize,
}

impl Block {
    fn new(role: BlockRole, closure: ClosureId, origin: Option<usize>) -> Self {
        Self {
            role,
            closure,
            origin,
            calls: Vec::new(),
            recursive: OnceLock::new(),
            searches: AtomicUsize::new(0),
        }
    }

    /// The block's role.
    #[must_use]
    pub fn role(&self) -> BlockRole {
        self.role
    }

    /// The wrapped closure.
    #[must_use]
    pub fn closure(&self) -> ClosureId {
        self.closure
    }

    /// Index of the input basic block this block was translated from.
    #[must_use]
    pub fn origin(&self) -> Option<usize> {
        self.origin
    }

    /// Incoming calls as of the last bookkeeping refresh.
    #[must_use]
    pub fn calls(&self) -> &[CallId] {
        &self.calls
    }

    /// Returns the memoized recursion flag without computing it.
    #[must_use]
    pub fn cached_recursion(&self) -> Option<bool> {
        self.recursive.get().copied()
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            closure: self.closure,
            origin: self.origin,
            calls: self.calls.clone(),
            recursive: self.recursive.clone(),
            searches: AtomicUsize::new(self.searches.load(Ordering::Relaxed)),
        }
    }
}

/// Whether the graph still contains high-level VM operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// HCIR: VM operators present.
    High,
    /// LCIR: only target-neutral primitives.
    Low,
}

/// The CPS-IR of one method.
#[derive(Debug, Clone)]
pub struct CirGraph {
    method: MethodActor,
    closures: Vec<Closure>,
    calls: Vec<Call>,
    blocks: Vec<Block>,
    entry: ClosureId,
    level: Level,
    next_serial: i64,
    next_synthetic: i64,
    initialized: Option<AnalysisResults<InitializedState>>,
}

impl CirGraph {
    /// Creates a graph whose entry closure has no parameters and an empty body.
    #[must_use]
    pub fn new(method: MethodActor) -> Self {
        let mut graph = Self {
            method,
            closures: Vec::new(),
            calls: Vec::new(),
            blocks: Vec::new(),
            entry: ClosureId::new(0),
            level: Level::High,
            next_serial: 1,
            next_synthetic: -1,
            initialized: None,
        };
        let body = graph.add_placeholder(None);
        graph.entry = graph.add_closure(Vec::new(), body);
        graph
    }

    // ── identity ──

    /// The method this graph implements.
    #[must_use]
    pub fn method(&self) -> &MethodActor {
        &self.method
    }

    /// The current level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Sets the level after lowering.
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// The method closure: `[arguments..., normal continuation, exception continuation]`.
    #[must_use]
    pub fn entry(&self) -> ClosureId {
        self.entry
    }

    /// Replaces the method closure.
    pub fn set_entry(&mut self, entry: ClosureId) {
        self.entry = entry;
    }

    // ── nodes ──

    /// Adds a closure.
    pub fn add_closure(&mut self, parameters: Vec<Variable>, body: CallId) -> ClosureId {
        self.closures.push(Closure { parameters, body });
        ClosureId::new(self.closures.len() - 1)
    }

    /// Adds a call.
    pub fn add_call(&mut self, call: Call) -> CallId {
        self.calls.push(call);
        CallId::new(self.calls.len() - 1)
    }

    /// Adds a call to be filled in later.
    pub fn add_placeholder(&mut self, location: Option<u32>) -> CallId {
        self.add_call(Call::placeholder(location))
    }

    /// Adds a block wrapping `closure`.
    pub fn add_block(
        &mut self,
        role: BlockRole,
        closure: ClosureId,
        origin: Option<usize>,
    ) -> BlockId {
        self.blocks.push(Block::new(role, closure, origin));
        BlockId::new(self.blocks.len() - 1)
    }

    /// Returns a closure.
    #[must_use]
    pub fn closure(&self, id: ClosureId) -> &Closure {
        &self.closures[id.index()]
    }

    /// Returns a closure for modification.
    pub fn closure_mut(&mut self, id: ClosureId) -> &mut Closure {
        &mut self.closures[id.index()]
    }

    /// Returns a call.
    #[must_use]
    pub fn call(&self, id: CallId) -> &Call {
        &self.calls[id.index()]
    }

    /// Returns a call for modification.
    pub fn call_mut(&mut self, id: CallId) -> &mut Call {
        &mut self.calls[id.index()]
    }

    /// Replaces the contents of a call, returning the previous contents.
    pub fn replace_call(&mut self, id: CallId, call: Call) -> Call {
        mem::replace(&mut self.calls[id.index()], call)
    }

    /// Moves the contents out of a call, leaving a placeholder behind.
    pub fn take_call(&mut self, id: CallId) -> Call {
        let location = self.calls[id.index()].location;
        self.replace_call(id, Call::placeholder(location))
    }

    /// Returns a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Iterates over all blocks, reachable or not.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockId::new(index), block))
    }

    /// Number of blocks in the arena.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of calls in the arena, including unreachable ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Number of closures in the arena, including unreachable ones.
    #[must_use]
    pub fn closure_count(&self) -> usize {
        self.closures.len()
    }

    // ── blocks ──

    /// Replaces the closure wrapped by a block and forgets its recursion flag.
    pub fn set_block_closure(&mut self, id: BlockId, closure: ClosureId) {
        let block = &mut self.blocks[id.index()];
        block.closure = closure;
        block.recursive = OnceLock::new();
    }

    /// Records the incoming calls of a block.
    pub fn set_block_calls(&mut self, id: BlockId, calls: Vec<CallId>) {
        self.blocks[id.index()].calls = calls;
    }

    /// Clones a block.
    ///
    /// The copy wraps a replica of the original closure with fresh variables, has no
    /// recorded incoming calls and an undetermined recursion flag.
    pub fn fresh_copy(&mut self, id: BlockId) -> BlockId {
        let (role, closure, origin) = {
            let block = self.block(id);
            (block.role, block.closure, block.origin)
        };
        let replica = self.replicate_closure(closure);
        self.add_block(role, replica, origin)
    }

    /// Returns `true` if some call inside the block's own body calls the block.
    ///
    /// The answer is memoized until the block's closure is replaced or
    /// [`CirGraph::invalidate_recursion`] is called.
    #[must_use]
    pub fn is_recursive(&self, id: BlockId) -> bool {
        let block = self.block(id);
        *block.recursive.get_or_init(|| {
            block.searches.fetch_add(1, Ordering::Relaxed);
            visit::calls_within(self, block.closure)
                .into_iter()
                .any(|call| self.call(call).procedure == Value::Block(id))
        })
    }

    /// Number of times the recursion search actually ran for a block.
    #[must_use]
    pub fn recursion_searches(&self, id: BlockId) -> usize {
        self.block(id).searches.load(Ordering::Relaxed)
    }

    /// Forgets every memoized recursion flag.
    pub fn invalidate_recursion(&mut self) {
        for block in &mut self.blocks {
            block.recursive = OnceLock::new();
        }
    }

    // ── variables ──

    /// Mints a translator variable with the next positive serial.
    pub fn fresh_variable(&mut self, origin: VariableOrigin, kind: Kind) -> Variable {
        let serial = self.next_serial;
        self.next_serial += 1;
        Variable::new(origin, kind, serial)
    }

    /// Mints a post-translation variable with the next negative serial.
    pub fn synthetic_variable(&mut self, origin: VariableOrigin, kind: Kind) -> Variable {
        let serial = self.next_synthetic;
        self.next_synthetic -= 1;
        Variable::new(origin, kind, serial)
    }

    /// Mints a synthetic variable with the origin and kind of `variable`.
    pub fn rename(&mut self, variable: Variable) -> Variable {
        self.synthetic_variable(variable.origin(), variable.kind())
    }

    /// Deep-copies a closure tree, giving every variable bound inside it a fresh name.
    ///
    /// Variables free in the tree are kept. Blocks referenced from the tree are shared,
    /// not copied.
    pub fn replicate_closure(&mut self, root: ClosureId) -> ClosureId {
        let (root_closure, env) = self.replicate_binder(root, imbl::HashMap::new());
        let mut pending = vec![(self.closure(root).body, self.closure(root_closure).body, env)];

        while let Some((original, copy, env)) = pending.pop() {
            let source = self.call(original).clone();
            let mut substitute = |graph: &mut Self, value: &Value| match value {
                Value::Variable(v) => Value::Variable(env.get(v).copied().unwrap_or(*v)),
                Value::Closure(inner) => {
                    let (replica, inner_env) = graph.replicate_binder(*inner, env.clone());
                    pending.push((
                        graph.closure(*inner).body,
                        graph.closure(replica).body,
                        inner_env,
                    ));
                    Value::Closure(replica)
                }
                other => other.clone(),
            };

            let procedure = substitute(self, &source.procedure);
            let arguments = source
                .arguments
                .iter()
                .map(|argument| substitute(self, argument))
                .collect();

            self.replace_call(
                copy,
                Call {
                    procedure,
                    arguments,
                    location: source.location,
                },
            );
        }

        root_closure
    }

    fn replicate_binder(
        &mut self,
        original: ClosureId,
        mut env: imbl::HashMap<Variable, Variable>,
    ) -> (ClosureId, imbl::HashMap<Variable, Variable>) {
        let parameters = self.closure(original).parameters.clone();
        let location = self.call(self.closure(original).body).location;
        let renamed = parameters
            .iter()
            .map(|&parameter| {
                let fresh = self.rename(parameter);
                env.insert(parameter, fresh);
                fresh
            })
            .collect();
        let body = self.add_placeholder(location);
        (self.add_closure(renamed, body), env)
    }

    // ── annotations ──

    /// Attaches initializedness results.
    pub fn set_initialized(&mut self, results: AnalysisResults<InitializedState>) {
        self.initialized = Some(results);
    }

    /// Initializedness results attached by the dataflow stage, if any.
    #[must_use]
    pub fn initialized(&self) -> Option<&AnalysisResults<InitializedState>> {
        self.initialized.as_ref()
    }

    /// Returns `true` if `variable` is known to hold an initialized object at `call`.
    #[must_use]
    pub fn is_initialized_at(&self, call: CallId, variable: Variable) -> bool {
        self.initialized
            .as_ref()
            .and_then(|results| results.value_at(call, &variable))
            .is_some_and(|state| *state == InitializedState::Initialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{ArithmeticOp, Constant},
        cir::Builtin,
    };

    fn self_loop() -> (CirGraph, BlockId) {
        let actor = MethodActor::new("T", "loop", vec![], Kind::Void);
        let mut graph = CirGraph::new(actor);
        let body = graph.add_placeholder(None);
        let closure = graph.add_closure(Vec::new(), body);
        let block = graph.add_block(BlockRole::Normal, closure, Some(0));
        graph.replace_call(body, Call::new(Value::Block(block), Vec::new()));
        let entry_body = graph.closure(graph.entry()).body;
        graph.replace_call(entry_body, Call::new(Value::Block(block), Vec::new()));
        (graph, block)
    }

    #[test]
    fn test_recursion_memoized() {
        let (mut graph, block) = self_loop();
        assert_eq!(graph.block(block).cached_recursion(), None);
        assert!(graph.is_recursive(block));
        assert!(graph.is_recursive(block));
        assert_eq!(graph.recursion_searches(block), 1);

        graph.invalidate_recursion();
        assert_eq!(graph.block(block).cached_recursion(), None);
        assert!(graph.is_recursive(block));
        assert_eq!(graph.recursion_searches(block), 2);
    }

    #[test]
    fn test_set_block_closure_resets_flag() {
        let (mut graph, block) = self_loop();
        assert!(graph.is_recursive(block));

        let ret = graph.add_call(Call::new(Value::Undefined, Vec::new()));
        let closure = graph.add_closure(Vec::new(), ret);
        graph.set_block_closure(block, closure);
        assert_eq!(graph.block(block).cached_recursion(), None);
        assert!(!graph.is_recursive(block));
    }

    #[test]
    fn test_fresh_copy_starts_clean() {
        let (mut graph, block) = self_loop();
        assert!(graph.is_recursive(block));
        graph.set_block_calls(block, vec![graph.closure(graph.entry()).body]);

        let copy = graph.fresh_copy(block);
        assert_ne!(copy, block);
        assert!(graph.block(copy).calls().is_empty());
        assert_eq!(graph.block(copy).cached_recursion(), None);
        assert_ne!(graph.block(copy).closure(), graph.block(block).closure());
        // The copy still calls the original block, not itself.
        assert!(!graph.is_recursive(copy));
    }

    #[test]
    fn test_replicate_renames_bound_variables() {
        let actor = MethodActor::new("T", "m", vec![], Kind::Int);
        let mut graph = CirGraph::new(actor);
        let free = graph.fresh_variable(VariableOrigin::NormalContinuationParameter, Kind::Int);
        let x = graph.fresh_variable(VariableOrigin::StackVariable(0), Kind::Int);
        let t = graph.fresh_variable(VariableOrigin::Temporary, Kind::Int);

        // (x) -> add(x, 1, (t) -> cc(t), undefined)
        let ret = graph.add_call(Call::new(Value::Variable(free), vec![Value::Variable(t)]));
        let cont = graph.add_closure(vec![t], ret);
        let add = graph.add_call(Call::new(
            Value::Builtin(Builtin::Arithmetic(ArithmeticOp::Add, Kind::Int)),
            vec![
                Value::Variable(x),
                Value::Constant(Constant::Int(1)),
                Value::Closure(cont),
                Value::Undefined,
            ],
        ));
        let root = graph.add_closure(vec![x], add);

        let copy = graph.replicate_closure(root);
        let copied = graph.closure(copy).clone();
        assert_ne!(copied.parameters[0], x);
        assert!(copied.parameters[0].is_synthetic());

        let body = graph.call(copied.body).clone();
        assert_eq!(body.arguments[0], Value::Variable(copied.parameters[0]));
        let inner = body.arguments[2].as_closure().map(|c| graph.closure(c).clone());
        let inner = inner.expect("continuation closure");
        assert_ne!(inner.parameters[0], t);
        let inner_body = graph.call(inner.body);
        assert_eq!(inner_body.procedure, Value::Variable(free));
        assert_eq!(inner_body.arguments, vec![Value::Variable(inner.parameters[0])]);
    }
}
