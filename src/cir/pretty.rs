//! Human-readable rendering of a [`CirGraph`].
//!
//! Every closure is printed on its own line as `Cn(params) = procedure(arguments)`,
//! with the closures it owns listed beneath it, indented one level deeper. The method
//! closure comes first, followed by every reachable block:
//!
//! ```text
//! Math.abs(int)int [high]
//! C0(p0#-1, cc#-2, ce#-3) = switch.int</1(p0#-1, 0, C4, C5)
//!   C4() = neg.int(p0#-1, cc#-2, undefined)
//!   C5() = cc#-2(p0#-1)
//! ```

use std::fmt::{self, Write};

use crate::cir::{visit, BlockRole, CirGraph, ClosureId, Level};

/// Display adapter returned by [`CirGraph::display`].
pub struct GraphDisplay<'a> {
    graph: &'a CirGraph,
}

impl CirGraph {
    /// Returns an adapter rendering the reachable graph as text.
    #[must_use]
    pub fn display(&self) -> GraphDisplay<'_> {
        GraphDisplay { graph: self }
    }
}

impl GraphDisplay<'_> {
    fn write_tree(&self, f: &mut fmt::Formatter<'_>, root: ClosureId, prefix: &str) -> fmt::Result {
        let graph = self.graph;
        let mut pending = vec![(root, 0usize)];
        while let Some((id, depth)) = pending.pop() {
            let closure = graph.closure(id);
            let call = graph.call(closure.body);

            let mut line = String::new();
            if depth == 0 {
                line.push_str(prefix);
            } else {
                line.push_str(&"  ".repeat(depth));
            }
            write!(line, "{id}(")?;
            for (i, parameter) in closure.parameters.iter().enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                write!(line, "{parameter}")?;
            }
            write!(line, ") = {}(", call.procedure)?;
            for (i, argument) in call.arguments.iter().enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                write!(line, "{argument}")?;
            }
            line.push(')');
            writeln!(f, "{line}")?;

            let nested: Vec<ClosureId> = visit::nested_closures(call).collect();
            for inner in nested.into_iter().rev() {
                pending.push((inner, depth + 1));
            }
        }
        Ok(())
    }
}

impl fmt::Display for GraphDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.graph.level() {
            Level::High => "high",
            Level::Low => "low",
        };
        writeln!(f, "{} [{level}]", self.graph.method())?;
        self.write_tree(f, self.graph.entry(), "")?;

        for block in visit::reachable_blocks(self.graph) {
            let role = match self.graph.block(block).role() {
                BlockRole::Normal => "normal",
                BlockRole::ExceptionDispatcher => "dispatcher",
            };
            let prefix = format!("{block} [{role}] ");
            self.write_tree(f, self.graph.block(block).closure(), &prefix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bir::{ArithmeticOp, Kind, MethodActor},
        cir::{Builtin, Call, CirGraph, Value, VariableOrigin},
    };

    #[test]
    fn test_display_lists_closures() {
        let mut graph = CirGraph::new(MethodActor::new("Math", "inc", vec![Kind::Int], Kind::Int));
        let p = graph.synthetic_variable(VariableOrigin::MethodParameter(0), Kind::Int);
        let cc = graph.synthetic_variable(VariableOrigin::NormalContinuationParameter, Kind::Int);
        let ce =
            graph.synthetic_variable(VariableOrigin::ExceptionContinuationParameter, Kind::Reference);
        let body = graph.add_call(Call::new(
            Value::Builtin(Builtin::Arithmetic(ArithmeticOp::Add, Kind::Int)),
            vec![
                Value::Variable(p),
                Value::Constant(crate::bir::Constant::Int(1)),
                Value::Variable(cc),
                Value::Undefined,
            ],
        ));
        let entry = graph.add_closure(vec![p, cc, ce], body);
        graph.set_entry(entry);

        let text = graph.display().to_string();
        assert!(text.starts_with("Math.inc(int)int [high]\n"));
        assert!(text.contains("(p0#-1, cc#-2, ce#-3) = add.int(p0#-1, 1, cc#-2, undefined)"));
    }
}
