//! Basic blocks and the per-method block graph handed to the translator.

use crate::{
    bir::{Instruction, MethodActor},
    Result,
};

/// A straight-line sequence of instructions with explicit successor edges.
///
/// A block either ends in a terminator (branch, switch, return, throw) or falls
/// through to its single successor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BirBlock {
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
    /// Indices of the normal successor blocks.
    pub successors: Vec<usize>,
    /// Exception dispatcher covering every instruction of this block.
    pub handler: Option<usize>,
}

impl BirBlock {
    /// Offset of the first instruction, if any.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        self.instructions.first().map(|i| i.offset)
    }

    /// Returns `true` if the last instruction transfers control explicitly.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|i| i.opcode.is_terminator())
    }
}

/// A method in block form: the input of the CPS-IR generator.
///
/// Block `0` is the entry block. Exception dispatchers are ordinary blocks whose
/// indices are listed in `dispatchers`; they are only entered through the `handler`
/// link of a covered block, with the pending throwable as the single stack operand.
#[derive(Debug, Clone)]
pub struct BirMethod {
    /// Identity of the method.
    pub actor: MethodActor,
    /// All blocks, entry first.
    pub blocks: Vec<BirBlock>,
    /// Indices of the exception dispatcher blocks.
    pub dispatchers: Vec<usize>,
    /// Number of local slots, including the incoming arguments.
    pub max_locals: u16,
}

impl BirMethod {
    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&BirBlock> {
        self.blocks.get(index)
    }

    /// Returns `true` if `index` names an exception dispatcher.
    #[must_use]
    pub fn is_dispatcher(&self, index: usize) -> bool {
        self.dispatchers.contains(&index)
    }

    /// Number of normal control-flow edges entering each block.
    ///
    /// Handler links are not counted. A block listed twice in the successors of the
    /// same predecessor counts twice.
    #[must_use]
    pub fn predecessor_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.blocks.len()];
        for block in &self.blocks {
            for &successor in &block.successors {
                if let Some(count) = counts.get_mut(successor) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Checks the structural contract of the block graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if there are no blocks, an edge or handler
    /// points outside the block list, a handler does not name a dispatcher, or the
    /// incoming arguments do not fit into `max_locals`.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(malformed_error!("method {} has no blocks", self.actor));
        }

        let arguments = self.actor.argument_kinds().len();
        if arguments > usize::from(self.max_locals) {
            return Err(malformed_error!(
                "method {} has {} arguments but only {} local slots",
                self.actor,
                arguments,
                self.max_locals
            ));
        }

        for &dispatcher in &self.dispatchers {
            if dispatcher >= self.blocks.len() {
                return Err(malformed_error!(
                    "dispatcher {} out of range ({} blocks)",
                    dispatcher,
                    self.blocks.len()
                ));
            }
        }

        for (index, block) in self.blocks.iter().enumerate() {
            if let Some(&bad) = block.successors.iter().find(|&&s| s >= self.blocks.len()) {
                return Err(malformed_error!(
                    "block {} has successor {} out of range",
                    index,
                    bad
                ));
            }
            if let Some(handler) = block.handler {
                if !self.is_dispatcher(handler) {
                    return Err(malformed_error!(
                        "block {} is covered by {} which is not a dispatcher",
                        index,
                        handler
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bir::{Kind, Opcode},
        Error,
    };

    fn method(blocks: Vec<BirBlock>) -> BirMethod {
        BirMethod {
            actor: MethodActor::new("Test", "m", vec![], Kind::Void),
            blocks,
            dispatchers: Vec::new(),
            max_locals: 0,
        }
    }

    #[test]
    fn test_predecessor_counts() {
        let ret = BirBlock {
            instructions: vec![Instruction::new(0, Opcode::Return(Kind::Void))],
            ..BirBlock::default()
        };
        let goto = |target| BirBlock {
            instructions: vec![Instruction::new(0, Opcode::Goto(target))],
            successors: vec![target],
            handler: None,
        };
        let m = method(vec![goto(2), goto(2), ret]);
        assert_eq!(m.predecessor_counts(), vec![0, 0, 2]);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_edges() {
        let block = BirBlock {
            instructions: vec![Instruction::new(0, Opcode::Goto(7))],
            successors: vec![7],
            handler: None,
        };
        assert!(matches!(
            method(vec![block]).validate(),
            Err(Error::Malformed { .. })
        ));
        assert!(method(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_dispatcher_handler() {
        let block = BirBlock {
            instructions: vec![Instruction::new(0, Opcode::Return(Kind::Void))],
            successors: Vec::new(),
            handler: Some(0),
        };
        assert!(method(vec![block]).validate().is_err());
    }
}
