// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cirgen
//!
//! A CPS intermediate representation generator for the compiler of a stack-bytecode
//! virtual machine. `cirgen` takes methods in basic-block form, translates them into
//! continuation-passing style, normalizes and lowers the result, and optimizes it under
//! a configurable inlining policy.
//!
//! ## Features
//!
//! - **Block translation** - stack-machine code to CPS with explicit continuations
//! - **Structural passes** - free-variable capture, alpha-conversion, pruning, copy propagation
//! - **Dataflow framework** - lattice-based forward analyses with a worklist solver
//! - **Lowering** - high-level operators to target-neutral builtins with null-check elision
//! - **Optimization** - constant folding and policy-driven block inlining
//! - **Parallel generation** - one shared session cache, methods compiled on a rayon pool
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust
//! use cirgen::prelude::*;
//!
//! // static int add(int a, int b) { return a + b; }
//! let actor = MethodActor::new("Math", "add", vec![Kind::Int, Kind::Int], Kind::Int)
//!     .with_flags(MethodFlags::STATIC);
//! let mut asm = MethodAssembler::new(actor);
//! asm.load(Kind::Int, 0).load(Kind::Int, 1).add(Kind::Int).ret(Kind::Int);
//! let method = asm.finish()?;
//!
//! let session = CompilationSession::new();
//! let record = CirGenerator::default().generate(&session, &method)?;
//! if let Some(graph) = record.graph() {
//!     println!("{}", graph.display());
//! }
//! # Ok::<(), cirgen::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ### Core Components
//!
//! - [`bir`] - Input basic-block IR and the [`bir::MethodAssembler`] builder
//! - [`cir`] - The CPS-IR graph, its values and operators
//! - [`translate`] - The block translator producing high-level CPS-IR
//! - [`passes`] - Structural passes and the verifier
//! - [`dataflow`] - Lattices, analyses and the fixpoint solver
//! - [`lower`] - High-level to low-level CPS-IR
//! - [`optimize`] - Folding and inlining policies
//! - [`generator`] - Pipeline orchestration, observers, events and the method cache
//!
//! ### Error Handling
//!
//! All fallible operations return [`Result<T>`]. Every error aborts generation of the
//! affected method only; see [`Error`] for the categories.

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

/// Input basic-block IR.
pub mod bir;

/// The continuation-passing-style intermediate representation.
pub mod cir;

/// Forward dataflow analyses over the CPS-IR.
pub mod dataflow;

/// Generation, observation and caching of per-method CPS-IR.
pub mod generator;

/// Lowering of high-level operators to builtins.
pub mod lower;

/// Constant folding and block inlining.
pub mod optimize;

/// Structural rewriting passes.
pub mod passes;

/// Translation of block-form methods into CPS-IR.
pub mod translate;

/// `cirgen` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate for all fallible
/// operations.
///
/// # Examples
///
/// ```rust
/// use cirgen::{Result, bir::{Kind, MethodActor, MethodAssembler}};
///
/// fn assemble() -> Result<()> {
///     let mut asm = MethodAssembler::new(MethodActor::new("T", "f", vec![], Kind::Void));
///     asm.ret(Kind::Void);
///     asm.finish()?;
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `cirgen` Error type
///
/// The main error type for all operations in this crate. Provides detailed error
/// information for translation, verification, folding and concurrency failures.
pub use error::{Error, Location};
