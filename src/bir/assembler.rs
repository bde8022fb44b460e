//! Fluent construction of block-form methods.
//!
//! [`MethodAssembler`] lets embedders and tests write block-form methods without a
//! bytecode decoder. Instructions are appended to the currently selected block;
//! successor lists are derived from terminators, or from an explicit fall-through
//! edge, when the method is finished.
//!
//! # Examples
//!
//! ```rust
//! use cirgen::bir::{Kind, MethodActor, MethodAssembler, MethodFlags};
//!
//! // static int add(int a, int b) { return a + b; }
//! let actor = MethodActor::new("Math", "add", vec![Kind::Int, Kind::Int], Kind::Int)
//!     .with_flags(MethodFlags::STATIC);
//!
//! let mut asm = MethodAssembler::new(actor);
//! asm.load(Kind::Int, 0).load(Kind::Int, 1).add(Kind::Int).ret(Kind::Int);
//! let method = asm.finish()?;
//!
//! assert_eq!(method.blocks.len(), 1);
//! # Ok::<(), cirgen::Error>(())
//! ```

use crate::{
    bir::{
        ArithmeticOp, BirBlock, BirMethod, Comparator, Constant, Instruction, Kind, MethodActor,
        Opcode,
    },
    Result,
};

#[derive(Debug, Default)]
struct PendingBlock {
    instructions: Vec<Instruction>,
    falls_to: Option<usize>,
    handler: Option<usize>,
}

/// Builder for [`BirMethod`]s.
///
/// The entry block (index `0`) exists from the start and is selected. Offsets are
/// assigned in emission order. `max_locals` is inferred from the arguments and every
/// local slot mentioned by an instruction unless set explicitly.
#[derive(Debug)]
pub struct MethodAssembler {
    actor: MethodActor,
    blocks: Vec<PendingBlock>,
    dispatchers: Vec<usize>,
    current: usize,
    next_offset: u32,
    max_locals: Option<u16>,
}

impl MethodAssembler {
    /// Creates an assembler with a single, selected entry block.
    #[must_use]
    pub fn new(actor: MethodActor) -> Self {
        Self {
            actor,
            blocks: vec![PendingBlock::default()],
            dispatchers: Vec::new(),
            current: 0,
            next_offset: 0,
            max_locals: None,
        }
    }

    /// Appends a new normal block and returns its index. The selection is unchanged.
    pub fn new_block(&mut self) -> usize {
        self.blocks.push(PendingBlock::default());
        self.blocks.len() - 1
    }

    /// Appends a new exception dispatcher block and returns its index.
    pub fn new_dispatcher(&mut self) -> usize {
        let index = self.new_block();
        self.dispatchers.push(index);
        index
    }

    /// Selects the block subsequent instructions are appended to.
    pub fn select(&mut self, block: usize) -> &mut Self {
        self.current = block;
        self
    }

    /// Index of the selected block.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Marks the selected block as falling through to `block`.
    pub fn falls_to(&mut self, block: usize) -> &mut Self {
        if let Some(pending) = self.blocks.get_mut(self.current) {
            pending.falls_to = Some(block);
        }
        self
    }

    /// Marks the selected block as covered by the exception dispatcher `dispatcher`.
    pub fn covered_by(&mut self, dispatcher: usize) -> &mut Self {
        if let Some(pending) = self.blocks.get_mut(self.current) {
            pending.handler = Some(dispatcher);
        }
        self
    }

    /// Overrides the inferred number of local slots.
    pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
        self.max_locals = Some(max_locals);
        self
    }

    /// Appends an instruction to the selected block.
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        let offset = self.next_offset;
        self.next_offset += 1;
        if let Some(pending) = self.blocks.get_mut(self.current) {
            pending.instructions.push(Instruction::new(offset, opcode));
        }
        self
    }

    /// Pushes an `Int` constant.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.emit(Opcode::Const(Constant::Int(value)))
    }

    /// Pushes an arbitrary constant.
    pub fn constant(&mut self, value: Constant) -> &mut Self {
        self.emit(Opcode::Const(value))
    }

    /// Pushes a local.
    pub fn load(&mut self, kind: Kind, slot: u16) -> &mut Self {
        self.emit(Opcode::Load(kind, slot))
    }

    /// Pops into a local.
    pub fn store(&mut self, kind: Kind, slot: u16) -> &mut Self {
        self.emit(Opcode::Store(kind, slot))
    }

    /// Emits a binary arithmetic operation.
    pub fn arithmetic(&mut self, op: ArithmeticOp, kind: Kind) -> &mut Self {
        self.emit(Opcode::Arithmetic(op, kind))
    }

    /// Emits an addition.
    pub fn add(&mut self, kind: Kind) -> &mut Self {
        self.arithmetic(ArithmeticOp::Add, kind)
    }

    /// Emits a return of the given kind.
    pub fn ret(&mut self, kind: Kind) -> &mut Self {
        self.emit(Opcode::Return(kind))
    }

    /// Emits an unconditional jump.
    pub fn goto(&mut self, target: usize) -> &mut Self {
        self.emit(Opcode::Goto(target))
    }

    /// Emits a branch comparing the top of the stack against zero.
    pub fn if_zero(&mut self, comparator: Comparator, target: usize, next: usize) -> &mut Self {
        self.emit(Opcode::IfZero {
            comparator,
            kind: Kind::Int,
            target,
            next,
        })
    }

    /// Emits a branch comparing the two topmost `Int` operands.
    pub fn if_cmp(&mut self, comparator: Comparator, target: usize, next: usize) -> &mut Self {
        self.emit(Opcode::If {
            comparator,
            kind: Kind::Int,
            target,
            next,
        })
    }

    /// Finishes the method, deriving successor lists and validating the result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the assembled graph is not a valid
    /// block-form method (see [`BirMethod::validate`]).
    pub fn finish(self) -> Result<BirMethod> {
        let mut max_locals = u16::try_from(self.actor.argument_kinds().len())
            .map_err(|_| malformed_error!("too many arguments for {}", self.actor))?;

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for pending in self.blocks {
            let mut successors = Vec::new();
            match pending.instructions.last() {
                Some(last) if last.opcode.is_terminator() => {
                    for target in last.opcode.targets() {
                        if !successors.contains(&target) {
                            successors.push(target);
                        }
                    }
                }
                _ => successors.extend(pending.falls_to),
            }

            for instruction in &pending.instructions {
                let slot = match instruction.opcode {
                    Opcode::Load(_, slot)
                    | Opcode::Store(_, slot)
                    | Opcode::Increment { slot, .. } => Some(slot),
                    _ => None,
                };
                if let Some(slot) = slot {
                    max_locals = max_locals.max(slot.saturating_add(1));
                }
            }

            blocks.push(BirBlock {
                instructions: pending.instructions,
                successors,
                handler: pending.handler,
            });
        }

        let method = BirMethod {
            actor: self.actor,
            blocks,
            dispatchers: self.dispatchers,
            max_locals: self.max_locals.unwrap_or(max_locals),
        };
        method.validate()?;
        Ok(method)
    }
}
