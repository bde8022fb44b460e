//! Block-form input IR.
//!
//! The CPS-IR generator consumes methods that have already been decoded from raw
//! bytecode and split into basic blocks. This module defines that input contract:
//!
//! - [`Kind`] and [`Constant`] - value kinds and literals shared with the CPS-IR
//! - [`MethodActor`] - method identity, flags and signature
//! - [`Instruction`] / [`Opcode`] - the stack-machine vocabulary
//! - [`BirBlock`] / [`BirMethod`] - the block graph, including exception dispatchers
//! - [`MethodAssembler`] - a fluent builder for block-form methods

mod assembler;
mod block;
mod instruction;
mod kind;
mod method;

pub use assembler::MethodAssembler;
pub use block::{BirBlock, BirMethod};
pub use instruction::{
    ArithmeticOp, Comparator, CompareBias, Instruction, InvokeKind, Opcode,
};
pub use kind::{Constant, Kind};
pub use method::{FieldRef, MethodActor, MethodFlags, MethodRef, TypeRef};
