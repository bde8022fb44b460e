//! The continuation-passing intermediate representation.
//!
//! A method is a [`Closure`] taking its arguments followed by a normal and an exception
//! continuation. Every closure body is exactly one [`Call`]; sequencing is expressed by
//! passing continuation closures, and control-flow joins by calling shared [`Block`]s.
//!
//! Before lowering the graph is at [`Level::High`] and may contain [`JavaOperator`]s;
//! afterwards only [`Builtin`]s and [`Switch`]es remain.
//!
//! # Key Types
//!
//! - [`CirGraph`] - arena owning every node of a method
//! - [`Value`] - operands and procedures
//! - [`Variable`] / [`VariableOrigin`] - serial-identified variables
//! - [`Closure`], [`Call`], [`Block`] - the node types

mod graph;
mod operator;
mod pretty;
mod value;
mod variable;
pub mod visit;

pub use graph::{Block, BlockId, BlockRole, Call, CallId, CirGraph, Closure, ClosureId, Level};
pub use operator::{Builtin, JavaOperator, Switch};
pub use pretty::GraphDisplay;
pub use value::Value;
pub use variable::{Variable, VariableOrigin};
