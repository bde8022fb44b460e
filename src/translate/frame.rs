//! Symbolic frame and operand stack of the block translator.

use rustc_hash::FxHashMap;

use crate::{
    bir::Kind,
    cir::{CirGraph, Variable, VariableOrigin},
};

/// Kinds of the local variable slots at a program point.
///
/// `None` marks a slot that holds no value on the path that established the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    locals: Vec<Option<Kind>>,
}

impl Frame {
    /// Creates a frame with `max_locals` empty slots.
    #[must_use]
    pub fn new(max_locals: u16) -> Self {
        Self {
            locals: vec![None; usize::from(max_locals)],
        }
    }

    /// Kind stored in a slot, `None` if the slot is empty or out of range.
    #[must_use]
    pub fn get(&self, slot: u16) -> Option<Kind> {
        self.locals.get(usize::from(slot)).copied().flatten()
    }

    /// Returns `true` if `slot` is a valid slot index.
    #[must_use]
    pub fn contains(&self, slot: u16) -> bool {
        usize::from(slot) < self.locals.len()
    }

    /// Records that `slot` now holds a value of `kind`.
    pub fn set(&mut self, slot: u16, kind: Kind) {
        if let Some(entry) = self.locals.get_mut(usize::from(slot)) {
            *entry = Some(kind);
        }
    }
}

/// Kinds of the operand stack entries, bottom first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack(Vec<Kind>);

impl Stack {
    /// The stack an exception dispatcher starts with: the pending throwable.
    #[must_use]
    pub fn throwable() -> Self {
        Self(vec![Kind::Reference])
    }

    /// Number of entries.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Kind of the entry `offset` positions below the top.
    #[must_use]
    pub fn peek(&self, offset: usize) -> Option<Kind> {
        self.0.len().checked_sub(offset + 1).map(|index| self.0[index])
    }

    /// Pushes an entry and returns its slot.
    pub fn push(&mut self, kind: Kind) -> u16 {
        self.0.push(kind);
        slot(self.0.len() - 1)
    }

    /// Pops the top entry, returning its kind and slot.
    pub fn pop(&mut self) -> Option<(Kind, u16)> {
        let kind = self.0.pop()?;
        Some((kind, slot(self.0.len())))
    }
}

fn slot(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

/// Hands out translator variables for frame and stack slots.
///
/// The same slot of the same kind always maps to the same variable, so every block
/// that reads `l1` as an `Int` refers to one variable and closure conversion can match
/// uses across blocks.
#[derive(Debug, Default)]
pub struct VariableFactory {
    variables: FxHashMap<(Kind, VariableOrigin), Variable>,
}

impl VariableFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable of a local slot.
    pub fn local(&mut self, graph: &mut CirGraph, kind: Kind, slot: u16) -> Variable {
        self.get(graph, VariableOrigin::LocalVariable(slot), kind)
    }

    /// Variable of an operand stack slot.
    pub fn stack(&mut self, graph: &mut CirGraph, kind: Kind, slot: u16) -> Variable {
        self.get(graph, VariableOrigin::StackVariable(slot), kind)
    }

    fn get(&mut self, graph: &mut CirGraph, origin: VariableOrigin, kind: Kind) -> Variable {
        *self
            .variables
            .entry((kind, origin))
            .or_insert_with(|| graph.fresh_variable(origin, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bir::MethodActor;

    #[test]
    fn test_stack_slots() {
        let mut stack = Stack::default();
        assert_eq!(stack.push(Kind::Int), 0);
        assert_eq!(stack.push(Kind::Reference), 1);
        assert_eq!(stack.peek(0), Some(Kind::Reference));
        assert_eq!(stack.peek(1), Some(Kind::Int));
        assert_eq!(stack.peek(2), None);

        let copy = stack.clone();
        assert_eq!(stack.pop(), Some((Kind::Reference, 1)));
        assert_eq!(stack.depth(), 1);
        assert_eq!(copy.depth(), 2);
    }

    #[test]
    fn test_factory_is_stable() {
        let mut graph = CirGraph::new(MethodActor::new("T", "m", vec![], Kind::Void));
        let mut factory = VariableFactory::new();

        let a = factory.local(&mut graph, Kind::Int, 1);
        let b = factory.local(&mut graph, Kind::Int, 1);
        let c = factory.local(&mut graph, Kind::Long, 1);
        let d = factory.stack(&mut graph, Kind::Int, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.serial() > 0);
    }

    #[test]
    fn test_frame() {
        let mut frame = Frame::new(2);
        assert_eq!(frame.get(0), None);
        frame.set(0, Kind::Reference);
        frame.set(5, Kind::Int);
        assert_eq!(frame.get(0), Some(Kind::Reference));
        assert!(frame.contains(1));
        assert!(!frame.contains(2));
    }
}
