use tracing::debug;

use crate::ir::{
    AluOp, Instruction, IrUnit, Label, Operand, ScopeIndex, Variable,
};

/// Incrementally emits instructions into one scope.
///
/// This is the construction surface the AST-lowering collaborator drives:
/// one builder per scope being lowered, with nested builders for the
/// closures and methods defined inside it.
pub struct ScopeBuilder<'u> {
    unit: &'u mut IrUnit,
    scope: ScopeIndex,
}

impl<'u> ScopeBuilder<'u> {
    pub fn new(unit: &'u mut IrUnit, scope: ScopeIndex) -> Self {
        Self { unit, scope }
    }

    pub fn scope(&self) -> ScopeIndex {
        self.scope
    }

    pub fn unit(&mut self) -> &mut IrUnit {
        self.unit
    }

    pub fn temp(&mut self) -> Variable {
        self.unit.scopes[self.scope].new_temp()
    }

    pub fn label(&mut self) -> Label {
        self.unit.scopes[self.scope].new_label()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.unit.scopes[self.scope].push(instruction);
    }

    /// result = src
    pub fn copy(&mut self, src: Operand) -> Variable {
        let result = self.temp();
        self.emit(Instruction::copy(result.clone(), src));
        result
    }

    /// name = src, through the binding.
    pub fn store_local(&mut self, name: &str, src: Operand) {
        self.emit(Instruction::copy(Variable::local(name), src));
    }

    pub fn alu(&mut self, op: AluOp, lhs: Operand, rhs: Operand) -> Variable {
        let result = self.temp();
        self.emit(Instruction::alu(result.clone(), op, lhs, rhs));
        result
    }

    pub fn call(&mut self, method: &str, receiver: Operand, args: Vec<Operand>) -> Variable {
        let result = self.temp();
        self.emit(Instruction::call(result.clone(), method, receiver, args));
        result
    }

    pub fn receive_self(&mut self) -> Variable {
        let result = self.temp();
        self.emit(Instruction::receive_self(result.clone()));
        result
    }

    pub fn receive_arg(&mut self, index: usize) -> Variable {
        let result = self.temp();
        self.emit(Instruction::receive_arg(result.clone(), index));
        result
    }

    /// Define a closure scope nested in this one and emit the instruction
    /// that materializes it. Returns the closure's scope index along with
    /// the variable holding the closure value.
    pub fn build_closure(&mut self) -> (ScopeIndex, Variable) {
        let child = self.unit.new_closure(self.scope);
        debug!("lowering closure scope {:?}", child);
        let result = self.temp();
        self.emit(Instruction::build_closure(result.clone(), child));
        (child, result)
    }

    pub fn yield_to_block(&mut self, args: Vec<Operand>) -> Variable {
        let result = self.temp();
        self.emit(Instruction::yield_to_block(result.clone(), args));
        result
    }

    pub fn mark(&mut self, label: Label) {
        self.emit(Instruction::mark(label));
    }

    pub fn jump(&mut self, target: Label) {
        self.emit(Instruction::jump(target));
    }

    pub fn branch_if(&mut self, cond: Operand, target: Label) {
        self.emit(Instruction::branch_if(cond, target));
    }

    pub fn branch_unless(&mut self, cond: Operand, target: Label) {
        self.emit(Instruction::branch_unless(cond, target));
    }

    pub fn ret(&mut self, value: Operand) {
        self.emit(Instruction::ret(value));
    }

    /// Builder for a scope nested in this one (from `build_closure` or
    /// `IrUnit::new_method`).
    pub fn nested(&mut self, child: ScopeIndex) -> ScopeBuilder<'_> {
        ScopeBuilder::new(self.unit, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Op, ScopeKind};

    #[test]
    fn builder_allocates_distinct_temps_per_scope() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);

        let t0 = b.copy(Operand::int(1));
        let (child, _closure_var) = b.build_closure();
        let mut cb = b.nested(child);
        let c0 = cb.copy(Operand::int(2));

        assert_eq!(t0, Variable::Temp(0));
        assert_eq!(c0, Variable::Temp(0));
        assert_eq!(unit.scopes[child].kind, ScopeKind::Closure);
        assert_eq!(unit.scopes[script].children, vec![child]);
    }

    #[test]
    fn build_closure_emits_materialization() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);
        let (child, var) = b.build_closure();

        let instr = &unit.scopes[script].instructions()[0];
        assert!(matches!(instr.op(), Op::BuildClosure { scope } if *scope == child));
        assert_eq!(instr.result(), Some(&var));
    }
}
