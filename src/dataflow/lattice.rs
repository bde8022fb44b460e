//! Lattice traits for data flow analysis.
//!
//! A lattice defines how abstract values combine where control flow joins. In the
//! CPS-IR, joins happen at blocks: every call to a block contributes the abstract
//! values of its arguments to the block's parameters.
//!
//! # Lattice Theory Background
//!
//! - **Meet (∧)**: Greatest lower bound of two elements
//! - **Top (⊤)**: Greatest element, "not reached yet", the identity of meet
//! - **Bottom (⊥)**: Least element, "nothing is known"
//!
//! The solver only ever meets, so a forward analysis needs nothing beyond
//! [`MeetSemiLattice`] plus a top element for variables that have not been reached.

use std::fmt::Debug;

/// A meet semi-lattice with a meet (greatest lower bound) operation.
///
/// The meet operation combines information from multiple control flow paths.
/// It must satisfy:
///
/// - **Idempotent**: `x.meet(x) = x`
/// - **Commutative**: `x.meet(y) = y.meet(x)`
/// - **Associative**: `x.meet(y.meet(z)) = (x.meet(y)).meet(z)`
///
/// # Examples
///
/// ```rust
/// use cirgen::dataflow::MeetSemiLattice;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Parity { Top, Even, Odd, Bottom }
///
/// impl MeetSemiLattice for Parity {
///     fn top() -> Self { Self::Top }
///
///     fn meet(&self, other: &Self) -> Self {
///         match (self, other) {
///             (Self::Top, x) | (x, Self::Top) => x.clone(),
///             (a, b) if a == b => a.clone(),
///             _ => Self::Bottom,
///         }
///     }
///
///     fn is_bottom(&self) -> bool {
///         matches!(self, Self::Bottom)
///     }
/// }
///
/// assert_eq!(Parity::Even.meet(&Parity::Top), Parity::Even);
/// assert_eq!(Parity::Even.meet(&Parity::Odd), Parity::Bottom);
/// ```
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Returns the top (⊤) element, the identity for meet.
    fn top() -> Self;

    /// Computes the meet (greatest lower bound) of two lattice elements.
    ///
    /// The meet represents combining information from two paths that merge.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;

    /// Returns `true` if this is the bottom element.
    ///
    /// Once bottom is reached, further meets cannot change the value.
    fn is_bottom(&self) -> bool;

    /// Returns `true` if this is the top element.
    fn is_top(&self) -> bool {
        *self == Self::top()
    }
}
