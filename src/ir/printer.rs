//! Textual form of the IR: one line per instruction, stable enough to
//! round-trip structurally (operation tag plus ordered operands).

use std::fmt;

use itertools::Itertools;

use crate::ir::{
    AluOp, ConstValue, Instruction, IrUnit, Label, Op, Operand, ScopeIndex, ScopeKind, Variable,
};

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Temp(id) => write!(f, "%{id}"),
            Variable::Local(name) => write!(f, "{name}"),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Nil => write!(f, "nil"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Float(x) => write!(f, "{x:?}"),
            ConstValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Var(v) => write!(f, "{v}"),
        }
    }
}

fn alu_name(op: AluOp) -> &'static str {
    match op {
        AluOp::Add => "add",
        AluOp::Sub => "sub",
        AluOp::Mul => "mul",
        AluOp::Div => "div",
        AluOp::Mod => "mod",
        AluOp::Eq => "eq",
        AluOp::Ne => "ne",
        AluOp::Lt => "lt",
        AluOp::Le => "le",
        AluOp::Gt => "gt",
        AluOp::Ge => "ge",
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result() {
            write!(f, "{result} = ")?;
        }
        let operands = || self.operands().iter().join(", ");
        match self.op() {
            Op::Copy => write!(f, "copy({})", operands()),
            Op::Alu(op) => write!(f, "{}({})", alu_name(*op), operands()),
            Op::Call { method } => write!(f, "call {method:?}({})", operands()),
            Op::ReceiveSelf => write!(f, "recv_self"),
            Op::ReceiveArg { index } => write!(f, "recv_arg({index})"),
            Op::BuildClosure { .. } => write!(f, "closure"),
            Op::Yield => write!(f, "yield({})", operands()),
            Op::Mark(label) => write!(f, "{label}:"),
            Op::Jump(target) => write!(f, "jump {target}"),
            Op::Branch { target, when_true } => {
                let name = if *when_true { "b_true" } else { "b_false" };
                write!(f, "{name}({}, {target})", operands())
            }
            Op::Return => write!(f, "return({})", operands()),
            Op::BoxValue => write!(f, "box({})", operands()),
            Op::UnboxValue => write!(f, "unbox({})", operands()),
        }
    }
}

fn kind_name(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Script => "script",
        ScopeKind::Method => "method",
        ScopeKind::Closure => "closure",
    }
}

fn dump_scope_into(unit: &IrUnit, scope: ScopeIndex, depth: usize, out: &mut String) {
    let scope_ref = &unit.scopes[scope];
    let pad = "  ".repeat(depth);
    out.push_str(&format!(
        "{pad}scope {:?} ({}):\n",
        scope_ref.name,
        kind_name(scope_ref.kind)
    ));
    for instruction in scope_ref.instructions() {
        out.push_str(&format!("{pad}  {instruction}\n"));
    }
    for &child in &scope_ref.children {
        dump_scope_into(unit, child, depth + 1, out);
    }
}

/// Render `scope` and every scope nested inside it.
pub fn dump_scope(unit: &IrUnit, scope: ScopeIndex) -> String {
    let mut out = String::new();
    dump_scope_into(unit, scope, 0, &mut out);
    out
}

/// Render the whole unit starting at its entry scope.
pub fn dump_unit(unit: &IrUnit) -> String {
    match unit.entry {
        Some(entry) => dump_scope(unit, entry),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::ScopeBuilder;
    use crate::ir::AluOp;

    #[test]
    fn renders_instructions_one_per_line() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);
        let t0 = b.copy(Operand::int(5));
        let t1 = b.alu(AluOp::Add, Operand::var(t0.clone()), Operand::int(2));
        b.store_local("x", Operand::var(t1));
        b.ret(Operand::var(t0));

        let dump = dump_scope(&unit, script);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "scope \"main\" (script):");
        assert_eq!(lines[1], "  %0 = copy(5)");
        assert_eq!(lines[2], "  %1 = add(%0, 2)");
        assert_eq!(lines[3], "  x = copy(%1)");
        assert_eq!(lines[4], "  return(%0)");
    }

    #[test]
    fn renders_control_flow_symbolically() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);
        let out = b.label();
        b.branch_unless(Operand::local("ready"), out);
        b.mark(out);
        b.ret(Operand::nil());

        let dump = dump_scope(&unit, script);
        assert!(dump.contains("b_false(ready, L0)"));
        assert!(dump.contains("L0:"));
        assert!(dump.contains("return(nil)"));
    }

    #[test]
    fn nested_scopes_are_indented() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);
        let (child, _) = b.build_closure();
        let mut cb = b.nested(child);
        cb.ret(Operand::nil());

        let dump = dump_unit(&unit);
        assert!(dump.contains("scope \"main_closure_0\" (closure):"));
    }
}
