//! Shared fixtures for unit tests.
//!
//! Every builder returns a small, valid block-form method exercising one feature of
//! the translator. [`prepared`] and [`lowered`] run the pipeline up to the named point
//! without a generator or observers.

use crate::{
    bir::{
        BirMethod, Comparator, FieldRef, InvokeKind, Kind, MethodActor, MethodAssembler,
        MethodFlags, MethodRef, Opcode,
    },
    cir::CirGraph,
    dataflow::{DataFlowSolver, InitializedAnalysis},
    generator::EventLog,
    lower::Lowering,
    passes::{AlphaConversion, CirPass, CopyPropagation, DeadLocalPruning, FreeVariableCapture},
    translate::translate,
};

fn static_actor(name: &str, parameters: Vec<Kind>, ret: Kind) -> MethodActor {
    MethodActor::new("Fixture", name, parameters, ret).with_flags(MethodFlags::STATIC)
}

fn field(name: &str) -> FieldRef {
    FieldRef::new("Point", name, Kind::Int)
}

/// `static int add(int a, int b) { return a + b; }`
pub fn add_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("add", vec![Kind::Int, Kind::Int], Kind::Int));
    asm.load(Kind::Int, 0).load(Kind::Int, 1).add(Kind::Int).ret(Kind::Int);
    asm.finish().expect("add assembles")
}

/// ```text
/// static int join(int x) {
///     int y = 7;
///     if (x != 0) foo(x); else bar();
///     return y;
/// }
/// ```
pub fn branch_join_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("join", vec![Kind::Int], Kind::Int));
    let call_foo = asm.new_block();
    let call_bar = asm.new_block();
    let join = asm.new_block();

    asm.iconst(7)
        .store(Kind::Int, 1)
        .load(Kind::Int, 0)
        .if_zero(Comparator::Equal, call_bar, call_foo);
    asm.select(call_foo)
        .load(Kind::Int, 0)
        .emit(Opcode::Invoke(
            InvokeKind::Static,
            MethodRef::new("Fixture", "foo", &[Kind::Int], Kind::Void),
        ))
        .goto(join);
    asm.select(call_bar)
        .emit(Opcode::Invoke(
            InvokeKind::Static,
            MethodRef::new("Fixture", "bar", &[], Kind::Void),
        ))
        .goto(join);
    asm.select(join).load(Kind::Int, 1).ret(Kind::Int);
    asm.finish().expect("join assembles")
}

/// ```text
/// static int count(int n) {
///     int i = 0;
///     while (i < n) i++;
///     return i;
/// }
/// ```
pub fn loop_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("count", vec![Kind::Int], Kind::Int));
    let header = asm.new_block();
    let body = asm.new_block();
    let exit = asm.new_block();

    asm.iconst(0).store(Kind::Int, 1).goto(header);
    asm.select(header)
        .load(Kind::Int, 1)
        .load(Kind::Int, 0)
        .if_cmp(Comparator::GreaterEqual, exit, body);
    asm.select(body)
        .emit(Opcode::Increment { slot: 1, delta: 1 })
        .goto(header);
    asm.select(exit).load(Kind::Int, 1).ret(Kind::Int);
    asm.finish().expect("count assembles")
}

/// `int getA() { return this.a; }`
pub fn field_getter_method() -> BirMethod {
    let actor = MethodActor::new("Point", "getA", vec![], Kind::Int);
    let mut asm = MethodAssembler::new(actor);
    asm.load(Kind::Reference, 0)
        .emit(Opcode::GetField(field("a")))
        .ret(Kind::Int);
    asm.finish().expect("getA assembles")
}

/// `static int sum(Point p) { return p.a + p.b; }`
pub fn field_sum_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("sum", vec![Kind::Reference], Kind::Int));
    asm.load(Kind::Reference, 0)
        .emit(Opcode::GetField(field("a")))
        .load(Kind::Reference, 0)
        .emit(Opcode::GetField(field("b")))
        .add(Kind::Int)
        .ret(Kind::Int);
    asm.finish().expect("sum assembles")
}

/// ```text
/// static int guarded(Point p) {
///     try { return p.a; } catch (Throwable t) { return -1; }
/// }
/// ```
pub fn exception_handler_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("guarded", vec![Kind::Reference], Kind::Int));
    let dispatcher = asm.new_dispatcher();

    asm.covered_by(dispatcher)
        .load(Kind::Reference, 0)
        .emit(Opcode::GetField(field("a")))
        .ret(Kind::Int);
    asm.select(dispatcher)
        .emit(Opcode::Pop)
        .iconst(-1)
        .ret(Kind::Int);
    asm.finish().expect("guarded assembles")
}

/// A protected region that cannot throw, so its dispatcher is never entered.
pub fn unreachable_dispatcher_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("safe", vec![], Kind::Int));
    let dispatcher = asm.new_dispatcher();

    asm.covered_by(dispatcher).iconst(1).ret(Kind::Int);
    asm.select(dispatcher)
        .emit(Opcode::Pop)
        .iconst(0)
        .ret(Kind::Int);
    asm.finish().expect("safe assembles")
}

/// ```text
/// static int pick(int x) {
///     switch (x) { case 0: return 10; case 1: return 11; case 2: return 12; default: return -1; }
/// }
/// ```
pub fn table_switch_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("pick", vec![Kind::Int], Kind::Int));
    let targets: Vec<usize> = (0..3).map(|_| asm.new_block()).collect();
    let default = asm.new_block();

    asm.load(Kind::Int, 0).emit(Opcode::TableSwitch {
        low: 0,
        targets: targets.clone(),
        default,
    });
    for (value, &target) in (10..).zip(&targets) {
        asm.select(target).iconst(value).ret(Kind::Int);
    }
    asm.select(default).iconst(-1).ret(Kind::Int);
    asm.finish().expect("pick assembles")
}

/// `static int five() { return 2 + 3; }`
pub fn constant_add_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("five", vec![], Kind::Int));
    asm.iconst(2).iconst(3).add(Kind::Int).ret(Kind::Int);
    asm.finish().expect("five assembles")
}

/// `static int choose() { return 1 == 0 ? 10 : 20; }`
pub fn constant_branch_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("choose", vec![], Kind::Int));
    let taken = asm.new_block();
    let fallthrough = asm.new_block();

    asm.iconst(1).if_zero(Comparator::Equal, taken, fallthrough);
    asm.select(taken).iconst(10).ret(Kind::Int);
    asm.select(fallthrough).iconst(20).ret(Kind::Int);
    asm.finish().expect("choose assembles")
}

/// ```text
/// static int flag(int p) {
///     int c;
///     if (p == 0) { f(); c = 1; } else { g(); c = 0; }
///     return c != 0 ? 10 : 20;
/// }
/// ```
///
/// The join block switches on a local that each predecessor sets to a constant.
pub fn flag_join_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("flag", vec![Kind::Int], Kind::Int));
    let zero = asm.new_block();
    let nonzero = asm.new_block();
    let join = asm.new_block();
    let ten = asm.new_block();
    let twenty = asm.new_block();

    asm.load(Kind::Int, 0).if_zero(Comparator::Equal, zero, nonzero);
    asm.select(zero)
        .emit(Opcode::Invoke(
            InvokeKind::Static,
            MethodRef::new("Fixture", "f", &[], Kind::Void),
        ))
        .iconst(1)
        .store(Kind::Int, 1)
        .goto(join);
    asm.select(nonzero)
        .emit(Opcode::Invoke(
            InvokeKind::Static,
            MethodRef::new("Fixture", "g", &[], Kind::Void),
        ))
        .iconst(0)
        .store(Kind::Int, 1)
        .goto(join);
    asm.select(join)
        .load(Kind::Int, 1)
        .if_zero(Comparator::Equal, twenty, ten);
    asm.select(ten).iconst(10).ret(Kind::Int);
    asm.select(twenty).iconst(20).ret(Kind::Int);
    asm.finish().expect("flag assembles")
}

/// ```text
/// static int shadow() { int a = f(); int b = 5; return a; }
/// ```
///
/// The stack variable holding `f()` is reused for `5` before `a` is read back.
pub fn shadowed_stack_method() -> BirMethod {
    let mut asm = MethodAssembler::new(static_actor("shadow", vec![], Kind::Int));
    asm.emit(Opcode::Invoke(
        InvokeKind::Static,
        MethodRef::new("Fixture", "f", &[], Kind::Int),
    ))
    .store(Kind::Int, 0)
    .iconst(5)
    .store(Kind::Int, 1)
    .load(Kind::Int, 0)
    .ret(Kind::Int);
    asm.finish().expect("shadow assembles")
}

/// Translates `method` and runs the high-level passes up to copy propagation.
pub fn prepared(method: &BirMethod) -> CirGraph {
    let events = EventLog::new();
    let mut graph = translate(method, &events).expect("translation failed");
    FreeVariableCapture.run(&mut graph, &events).expect("capture failed");
    AlphaConversion.run(&mut graph, &events).expect("alpha failed");
    CopyPropagation.run(&mut graph, &events).expect("copy propagation failed");
    graph
}

/// [`prepared`], then dataflow analysis, lowering and the low-level clean-up passes.
pub fn lowered(method: &BirMethod) -> CirGraph {
    let events = EventLog::new();
    let mut graph = prepared(method);
    let results = DataFlowSolver::new(InitializedAnalysis).solve(&graph);
    graph.set_initialized(results);
    Lowering.run(&mut graph, &events).expect("lowering failed");
    FreeVariableCapture.run(&mut graph, &events).expect("capture failed");
    AlphaConversion.run(&mut graph, &events).expect("alpha failed");
    DeadLocalPruning.run(&mut graph, &events).expect("pruning failed");
    graph
}
