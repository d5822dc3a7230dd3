use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::Binding;
use crate::ir::{Instruction, IrUnit, Label, Op, ScopeIndex, ScopeKind, Variable};

/// Execution view of one scope, derived once from its instruction list
/// and cached by the interpreter.
///
/// Label marks are stripped and branch targets resolved to instruction
/// positions here; inside the IR, labels stay symbolic so passes can
/// insert and delete instructions freely. Building a context freezes the
/// scope: mutating its instruction list afterwards is undefined behavior,
/// not guarded dynamically.
#[derive(Debug)]
pub struct InterpreterContext {
    scope: ScopeIndex,
    kind: ScopeKind,
    name: String,
    instructions: Vec<Instruction>,
    targets: HashMap<Label, usize>,
    temp_count: usize,
}

impl InterpreterContext {
    /// Derive the execution view for `scope`.
    pub fn build(unit: &IrUnit, scope: ScopeIndex) -> Self {
        let scope_ref = &unit.scopes[scope];
        let mut instructions = Vec::with_capacity(scope_ref.instructions().len());
        let mut targets = HashMap::new();
        let mut temp_count = 0;

        for instruction in scope_ref.instructions() {
            for variable in instruction.used_variables().chain(instruction.result()) {
                if let Variable::Temp(id) = variable {
                    temp_count = temp_count.max(id + 1);
                }
            }
            if let Op::Mark(label) = instruction.op() {
                // the label resolves to the next executable instruction;
                // a mark at the very end resolves past the list
                targets.insert(*label, instructions.len());
            } else {
                instructions.push(instruction.clone());
            }
        }

        Self {
            scope,
            kind: scope_ref.kind,
            name: scope_ref.name.clone(),
            instructions,
            targets,
            temp_count,
        }
    }

    pub fn scope(&self) -> ScopeIndex {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instruction snapshot this context executes, marks stripped.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Temp slots one activation of this scope needs.
    pub fn temp_count(&self) -> usize {
        self.temp_count
    }

    /// The instruction position `label` resolves to.
    pub fn target(&self, label: Label) -> usize {
        match self.targets.get(&label) {
            Some(ipc) => *ipc,
            None => panic!("branch to a label with no mark: {label:?} in {}", self.name),
        }
    }

    /// Whether activations of this scope allocate their own binding
    /// frame. Closures do not: they execute inside the binding of their
    /// lexically enclosing scope.
    pub fn needs_binding(&self) -> bool {
        self.kind != ScopeKind::Closure
    }

    /// Allocate the binding frame for one activation.
    ///
    /// Fatal for closure contexts. A closure never owns a binding, so a
    /// request for one means the caller is confused about what it is
    /// executing, never a runtime condition to recover from.
    pub fn new_binding(&self) -> Rc<RefCell<Binding>> {
        if !self.needs_binding() {
            panic!(
                "closure {} cannot allocate a binding; \
                 closures execute in the binding of their enclosing scope",
                self.name
            );
        }
        Rc::new(RefCell::new(Binding::default()))
    }
}
