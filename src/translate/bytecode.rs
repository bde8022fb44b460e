//! Translation of individual stack-machine instructions.

use std::iter;

use crate::{
    bir::{ArithmeticOp, Comparator, Constant, Kind, Opcode},
    cir::{Builtin, Call, JavaOperator, Switch, Value, Variable, VariableOrigin},
    translate::{Cursor, MethodTranslation, Stack},
    Result,
};

impl MethodTranslation<'_> {
    /// Translates block `index` starting at `cursor`.
    pub(super) fn scan(&mut self, index: usize, mut cursor: Cursor) -> Result<()> {
        let method = self.method;
        let block = &method.blocks[index];
        let count = block.instructions.len();

        for (position, instruction) in block.instructions.iter().enumerate() {
            cursor.location = Some(instruction.offset);
            if instruction.opcode.is_terminator() {
                if position + 1 != count {
                    return Err(self.error(
                        &cursor,
                        format!("`{}` in the middle of block {index}", instruction.opcode),
                    ));
                }
                return self.terminator(&mut cursor, &instruction.opcode);
            }
            self.instruction(&mut cursor, &instruction.opcode)?;
        }

        match block.successors.as_slice() {
            [next] => {
                let target = self.jump(&cursor, *next)?;
                self.finish(&cursor, Call::new(Value::Block(target), Vec::new()));
                Ok(())
            }
            _ => Err(self.error(
                &cursor,
                format!("control falls off the end of block {index}"),
            )),
        }
    }

    fn instruction(&mut self, cursor: &mut Cursor, opcode: &Opcode) -> Result<()> {
        match opcode {
            Opcode::Const(constant) => {
                let target = self.push(cursor, constant.kind());
                self.assign(cursor, target, Value::Constant(*constant));
            }
            Opcode::Load(kind, slot) => {
                self.check_local(cursor, *kind, *slot)?;
                let local = self.variables.local(&mut self.graph, *kind, *slot);
                let target = self.push(cursor, *kind);
                self.assign(cursor, target, Value::Variable(local));
            }
            Opcode::Store(kind, slot) => {
                if !cursor.frame.contains(*slot) {
                    return Err(self.error(cursor, format!("local slot {slot} out of range")));
                }
                let value = self.pop(cursor, *kind)?;
                let local = self.variables.local(&mut self.graph, *kind, *slot);
                cursor.frame.set(*slot, *kind);
                self.assign(cursor, local, value);
            }
            Opcode::Increment { slot, delta } => {
                if cursor.frame.get(*slot) != Some(Kind::Int) {
                    return Err(self.error(cursor, format!("local slot {slot} does not hold an int")));
                }
                let local = self.variables.local(&mut self.graph, Kind::Int, *slot);
                self.emit(
                    cursor,
                    Value::Builtin(Builtin::Arithmetic(ArithmeticOp::Add, Kind::Int)),
                    vec![Value::Variable(local), Value::Constant(Constant::Int(*delta))],
                    vec![local],
                    Value::Undefined,
                );
            }
            Opcode::Pop => {
                self.pop_any(cursor)?;
            }
            Opcode::Dup => {
                let Some(kind) = cursor.stack.peek(0) else {
                    return Err(self.error(cursor, "operand stack underflow"));
                };
                let source = self.top(cursor, kind);
                let target = self.push(cursor, kind);
                self.assign(cursor, target, Value::Variable(source));
            }
            Opcode::Swap => self.swap(cursor)?,
            Opcode::Arithmetic(op, kind) => {
                let right = if op.is_shift() { Kind::Int } else { *kind };
                let b = self.pop(cursor, right)?;
                let a = self.pop(cursor, *kind)?;
                self.operate(
                    cursor,
                    Value::Builtin(Builtin::Arithmetic(*op, *kind)),
                    vec![a, b],
                    Some(*kind),
                    op.can_throw(*kind),
                )?;
            }
            Opcode::Negate(kind) => {
                let a = self.pop(cursor, *kind)?;
                self.operate(cursor, Value::Builtin(Builtin::Negate(*kind)), vec![a], Some(*kind), false)?;
            }
            Opcode::Compare(kind, bias) => {
                let b = self.pop(cursor, *kind)?;
                let a = self.pop(cursor, *kind)?;
                self.operate(
                    cursor,
                    Value::Builtin(Builtin::Compare(*kind, *bias)),
                    vec![a, b],
                    Some(Kind::Int),
                    false,
                )?;
            }
            Opcode::Convert { from, to } => {
                let a = self.pop(cursor, *from)?;
                self.operate(
                    cursor,
                    Value::Builtin(Builtin::Convert { from: *from, to: *to }),
                    vec![a],
                    Some(*to),
                    false,
                )?;
            }
            Opcode::GetField(field) => {
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::GetField(field.clone()), vec![object])?;
            }
            Opcode::PutField(field) => {
                let value = self.pop(cursor, field.kind)?;
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::PutField(field.clone()), vec![object, value])?;
            }
            Opcode::GetStatic(field) => {
                self.java(cursor, JavaOperator::GetStatic(field.clone()), Vec::new())?;
            }
            Opcode::PutStatic(field) => {
                let value = self.pop(cursor, field.kind)?;
                self.java(cursor, JavaOperator::PutStatic(field.clone()), vec![value])?;
            }
            Opcode::Invoke(kind, target) => {
                let mut arguments = Vec::with_capacity(target.parameter_kinds.len() + 1);
                for parameter in target.parameter_kinds.iter().rev() {
                    arguments.push(self.pop(cursor, *parameter)?);
                }
                if kind.has_receiver() {
                    arguments.push(self.pop(cursor, Kind::Reference)?);
                }
                arguments.reverse();
                self.java(cursor, JavaOperator::Invoke(*kind, target.clone()), arguments)?;
            }
            Opcode::New(ty) => {
                self.java(cursor, JavaOperator::New(ty.clone()), Vec::new())?;
            }
            Opcode::NewArray(ty) => {
                let length = self.pop(cursor, Kind::Int)?;
                self.java(cursor, JavaOperator::NewArray(ty.clone()), vec![length])?;
            }
            Opcode::ArrayLoad(kind) => {
                let index = self.pop(cursor, Kind::Int)?;
                let array = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::ArrayLoad(*kind), vec![array, index])?;
            }
            Opcode::ArrayStore(kind) => {
                let value = self.pop(cursor, *kind)?;
                let index = self.pop(cursor, Kind::Int)?;
                let array = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::ArrayStore(*kind), vec![array, index, value])?;
            }
            Opcode::ArrayLength => {
                let array = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::ArrayLength, vec![array])?;
            }
            Opcode::CheckCast(ty) => {
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::CheckCast(ty.clone()), vec![object])?;
            }
            Opcode::InstanceOf(ty) => {
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::InstanceOf(ty.clone()), vec![object])?;
            }
            Opcode::MonitorEnter => {
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::MonitorEnter, vec![object])?;
            }
            Opcode::MonitorExit => {
                let object = self.pop(cursor, Kind::Reference)?;
                self.java(cursor, JavaOperator::MonitorExit, vec![object])?;
            }
            Opcode::IfZero { .. }
            | Opcode::If { .. }
            | Opcode::Goto(_)
            | Opcode::TableSwitch { .. }
            | Opcode::LookupSwitch { .. }
            | Opcode::Return(_)
            | Opcode::Throw => {
                return Err(internal_error!("terminator {} scanned as an instruction", opcode));
            }
        }
        Ok(())
    }

    fn terminator(&mut self, cursor: &mut Cursor, opcode: &Opcode) -> Result<()> {
        match opcode {
            Opcode::IfZero {
                comparator,
                kind,
                target,
                next,
            } => {
                let value = self.pop(cursor, *kind)?;
                let Some(zero) = Constant::zero(*kind) else {
                    return Err(self.error(cursor, format!("cannot compare {kind} against zero")));
                };
                self.branch(
                    cursor,
                    Switch::new(*kind, *comparator, 1),
                    value,
                    vec![Value::Constant(zero)],
                    &[*target],
                    *next,
                )
            }
            Opcode::If {
                comparator,
                kind,
                target,
                next,
            } => {
                let b = self.pop(cursor, *kind)?;
                let a = self.pop(cursor, *kind)?;
                self.branch(cursor, Switch::new(*kind, *comparator, 1), a, vec![b], &[*target], *next)
            }
            Opcode::Goto(target) => {
                let block = self.jump(cursor, *target)?;
                self.finish(cursor, Call::new(Value::Block(block), Vec::new()));
                Ok(())
            }
            Opcode::TableSwitch {
                low,
                targets,
                default,
            } => {
                let value = self.pop(cursor, Kind::Int)?;
                let mut matches = Vec::with_capacity(targets.len());
                for offset in 0..targets.len() {
                    let offset = i32::try_from(offset)
                        .map_err(|_| self.error(cursor, "table switch too large"))?;
                    matches.push(Value::Constant(Constant::Int(low.wrapping_add(offset))));
                }
                self.branch(
                    cursor,
                    Switch::new(Kind::Int, Comparator::Equal, targets.len()),
                    value,
                    matches,
                    targets,
                    *default,
                )
            }
            Opcode::LookupSwitch {
                matches,
                targets,
                default,
            } => {
                if matches.len() != targets.len() {
                    return Err(self.error(
                        cursor,
                        format!("{} match values for {} targets", matches.len(), targets.len()),
                    ));
                }
                let value = self.pop(cursor, Kind::Int)?;
                let matches = matches
                    .iter()
                    .map(|m| Value::Constant(Constant::Int(*m)))
                    .collect();
                self.branch(
                    cursor,
                    Switch::new(Kind::Int, Comparator::Equal, targets.len()),
                    value,
                    matches,
                    targets,
                    *default,
                )
            }
            Opcode::Return(kind) => {
                let expected = self.method.actor.return_kind;
                if *kind != expected {
                    return Err(self.error(
                        cursor,
                        format!("returning {kind} from a method returning {expected}"),
                    ));
                }
                let arguments = if *kind == Kind::Void {
                    Vec::new()
                } else {
                    vec![self.pop(cursor, *kind)?]
                };
                let continuation = Value::Variable(self.normal_continuation);
                self.finish(cursor, Call::new(continuation, arguments));
                Ok(())
            }
            Opcode::Throw => {
                let throwable = self.pop(cursor, Kind::Reference)?;
                let exception = self.exception(cursor, true)?;
                self.finish(
                    cursor,
                    Call::new(
                        Value::Operator(JavaOperator::Throw),
                        vec![throwable, Value::Undefined, exception],
                    ),
                );
                Ok(())
            }
            other => Err(internal_error!("{} scanned as a terminator", other)),
        }
    }

    /// Emits a high-level operator call with its result and exception continuations.
    fn java(&mut self, cursor: &mut Cursor, op: JavaOperator, arguments: Vec<Value>) -> Result<()> {
        let result = op.result_kind();
        let can_throw = op.can_throw();
        self.operate(cursor, Value::Operator(op), arguments, result, can_throw)
    }

    fn operate(
        &mut self,
        cursor: &mut Cursor,
        procedure: Value,
        arguments: Vec<Value>,
        result: Option<Kind>,
        can_throw: bool,
    ) -> Result<()> {
        let exception = self.exception(cursor, can_throw)?;
        let results = result
            .map(|kind| self.push(cursor, kind))
            .into_iter()
            .collect();
        self.emit(cursor, procedure, arguments, results, exception);
        Ok(())
    }

    /// The exception continuation for an operation at the cursor.
    ///
    /// Inside a covered block the continuation enters the dispatcher with the throwable
    /// as its only stack operand; otherwise the method's exception continuation is used.
    fn exception(&mut self, cursor: &Cursor, can_throw: bool) -> Result<Value> {
        if !can_throw {
            return Ok(Value::Undefined);
        }
        let Some(handler) = cursor.handler else {
            return Ok(Value::Variable(self.exception_continuation));
        };

        let dispatcher = self.seed(cursor, handler, cursor.frame.clone(), Stack::throwable())?;
        let throwable = self.variables.stack(&mut self.graph, Kind::Reference, 0);
        let body = self
            .graph
            .add_call(Call::new(Value::Block(dispatcher), Vec::new()).at(cursor.location));
        Ok(Value::Closure(self.graph.add_closure(vec![throwable], body)))
    }

    fn branch(
        &mut self,
        cursor: &Cursor,
        switch: Switch,
        discriminant: Value,
        matches: Vec<Value>,
        targets: &[usize],
        default: usize,
    ) -> Result<()> {
        let mut arguments = Vec::with_capacity(switch.arity());
        arguments.push(discriminant);
        arguments.extend(matches);
        for &target in targets.iter().chain(iter::once(&default)) {
            let block = self.jump(cursor, target)?;
            let body = self
                .graph
                .add_call(Call::new(Value::Block(block), Vec::new()).at(cursor.location));
            arguments.push(Value::Closure(self.graph.add_closure(Vec::new(), body)));
        }
        self.finish(cursor, Call::new(Value::Switch(switch), arguments));
        Ok(())
    }

    fn swap(&mut self, cursor: &mut Cursor) -> Result<()> {
        let (upper_kind, upper) = self.pop_any(cursor)?;
        let (lower_kind, lower) = self.pop_any(cursor)?;

        let saved = self.graph.fresh_variable(VariableOrigin::Temporary, upper_kind);
        self.assign(cursor, saved, Value::Variable(upper));
        let new_lower = self.push(cursor, upper_kind);
        let new_upper = self.push(cursor, lower_kind);
        self.assign(cursor, new_upper, Value::Variable(lower));
        self.assign(cursor, new_lower, Value::Variable(saved));
        Ok(())
    }

    fn check_local(&self, cursor: &Cursor, kind: Kind, slot: u16) -> Result<()> {
        if !cursor.frame.contains(slot) {
            return Err(self.error(cursor, format!("local slot {slot} out of range")));
        }
        match cursor.frame.get(slot) {
            Some(found) if found != kind => Err(self.error(
                cursor,
                format!("local slot {slot} holds {found}, loaded as {kind}"),
            )),
            _ => Ok(()),
        }
    }

    fn push(&mut self, cursor: &mut Cursor, kind: Kind) -> Variable {
        let slot = cursor.stack.push(kind);
        self.variables.stack(&mut self.graph, kind, slot)
    }

    fn top(&mut self, cursor: &Cursor, kind: Kind) -> Variable {
        let slot = u16::try_from(cursor.stack.depth().saturating_sub(1)).unwrap_or(u16::MAX);
        self.variables.stack(&mut self.graph, kind, slot)
    }

    fn pop(&mut self, cursor: &mut Cursor, kind: Kind) -> Result<Value> {
        let (found, variable) = self.pop_any(cursor)?;
        if found != kind {
            return Err(self.error(cursor, format!("expected {kind} on the stack, found {found}")));
        }
        Ok(Value::Variable(variable))
    }

    fn pop_any(&mut self, cursor: &mut Cursor) -> Result<(Kind, Variable)> {
        let Some((kind, slot)) = cursor.stack.pop() else {
            return Err(self.error(cursor, "operand stack underflow"));
        };
        Ok((kind, self.variables.stack(&mut self.graph, kind, slot)))
    }
}
