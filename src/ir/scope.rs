use std::collections::HashSet;

use typed_generational_arena::{SmallSlab, SmallSlabIndex};

use crate::ir::{Instruction, Label, Variable};

pub type Scopes = SmallSlab<Scope>;
pub type ScopeIndex = SmallSlabIndex<Scope>;

/// What kind of executable unit a scope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Top level script body. Its binding outlives the activation.
    Script,
    /// Method body; allocates a fresh binding per activation.
    Method,
    /// Closure body; executes inside the binding of its lexically
    /// enclosing scope and never allocates one of its own.
    Closure,
}

/// Deoptimization-relevant facts about a scope, set during lowering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeFlags {
    /// The binding may outlive the activation (eval, binding capture).
    /// Local variables of such a scope are observable from outside and
    /// must never be treated as dead.
    pub binding_has_escaped: bool,
}

/// A lexical executable unit: the exclusive owner of an ordered
/// instruction list, plus the nested scopes defined inside it.
///
/// The instruction list is mutated in place by compiler passes through
/// [`Scope::retain_instructions`] and [`Scope::push`], which bump the
/// scope version so cached analysis results can be recognized as stale.
/// Once a scope has been handed to the interpreter (its context built),
/// mutating it further is undefined behavior; this is not guarded
/// dynamically.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeIndex>,
    pub children: Vec<ScopeIndex>,
    pub flags: ScopeFlags,
    instructions: Vec<Instruction>,
    next_temp: usize,
    next_label: usize,
    version: u64,
}

impl Scope {
    fn new(kind: ScopeKind, name: String, parent: Option<ScopeIndex>) -> Self {
        Self {
            kind,
            name,
            parent,
            children: Vec::new(),
            flags: ScopeFlags::default(),
            instructions: Vec::new(),
            next_temp: 0,
            next_label: 0,
            version: 0,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Monotonic counter bumped on every instruction-list mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Allocate a fresh scope-private temporary.
    pub fn new_temp(&mut self) -> Variable {
        let id = self.next_temp;
        self.next_temp += 1;
        Variable::Temp(id)
    }

    /// Allocate a fresh label for this scope.
    pub fn new_label(&mut self) -> Label {
        let id = self.next_label;
        self.next_label += 1;
        Label(id)
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
        self.version += 1;
    }

    /// Keep only the instructions for which `keep` returns true,
    /// preserving relative order.
    pub fn retain_instructions<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize, &Instruction) -> bool,
    {
        let mut index = 0;
        self.instructions.retain(|instruction| {
            let kept = keep(index, instruction);
            index += 1;
            kept
        });
        self.version += 1;
    }

    /// Every local variable this scope's instructions read or define.
    pub fn referenced_locals(&self) -> HashSet<Variable> {
        let mut locals = HashSet::new();
        for instruction in &self.instructions {
            for used in instruction.used_variables() {
                if used.is_local() {
                    locals.insert(used.clone());
                }
            }
            if let Some(result) = instruction.result() {
                if result.is_local() {
                    locals.insert(result.clone());
                }
            }
        }
        locals
    }
}

/// One compilation unit: every scope lowered from a single source unit,
/// held in a flat arena and linked by index.
#[derive(Debug, Clone)]
pub struct IrUnit {
    pub scopes: Scopes,
    /// The top level script scope, once lowered.
    pub entry: Option<ScopeIndex>,
}

impl Default for IrUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl IrUnit {
    pub fn new() -> Self {
        Self {
            scopes: Scopes::new(),
            entry: None,
        }
    }

    /// Create the top level script scope. The first one becomes the
    /// unit's entry.
    pub fn new_script(&mut self, name: &str) -> ScopeIndex {
        let idx = self
            .scopes
            .insert(Scope::new(ScopeKind::Script, name.to_string(), None));
        if self.entry.is_none() {
            self.entry = Some(idx);
        }
        idx
    }

    pub fn new_method(&mut self, parent: ScopeIndex, name: &str) -> ScopeIndex {
        self.new_child(parent, ScopeKind::Method, name.to_string())
    }

    pub fn new_closure(&mut self, parent: ScopeIndex) -> ScopeIndex {
        let name = format!(
            "{}_closure_{}",
            self.scopes[parent].name,
            self.scopes[parent].children.len()
        );
        self.new_child(parent, ScopeKind::Closure, name)
    }

    fn new_child(&mut self, parent: ScopeIndex, kind: ScopeKind, name: String) -> ScopeIndex {
        let idx = self.scopes.insert(Scope::new(kind, name, Some(parent)));
        self.scopes[parent].children.push(idx);
        idx
    }

    /// Local variables referenced (read or defined) by any scope nested
    /// transitively inside `scope`. These live in `scope`'s binding, so
    /// its own analyses must treat them as live past every exit.
    pub fn captured_locals(&self, scope: ScopeIndex) -> HashSet<Variable> {
        let mut captured = HashSet::new();
        let mut pending: Vec<ScopeIndex> = self.scopes[scope].children.clone();
        while let Some(idx) = pending.pop() {
            captured.extend(self.scopes[idx].referenced_locals());
            pending.extend(self.scopes[idx].children.iter().copied());
        }
        captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Operand};

    #[test]
    fn retain_preserves_order_and_bumps_version() {
        let mut unit = IrUnit::new();
        let idx = unit.new_script("main");
        let scope = &mut unit.scopes[idx];
        let t0 = scope.new_temp();
        let t1 = scope.new_temp();
        let t2 = scope.new_temp();
        scope.push(Instruction::copy(t0, Operand::int(1)));
        scope.push(Instruction::copy(t1, Operand::int(2)));
        scope.push(Instruction::copy(t2, Operand::int(3)));

        let before = scope.version();
        scope.retain_instructions(|i, _| i != 1);
        assert!(scope.version() > before);
        assert_eq!(scope.instructions().len(), 2);
        assert_eq!(scope.instructions()[0].operands()[0], Operand::int(1));
        assert_eq!(scope.instructions()[1].operands()[0], Operand::int(3));
    }

    #[test]
    fn captured_locals_walks_nested_scopes() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let closure = unit.new_closure(script);
        let inner = unit.new_closure(closure);

        let t = unit.scopes[closure].new_temp();
        unit.scopes[closure].push(Instruction::copy(t, Operand::local("count")));
        let t = unit.scopes[inner].new_temp();
        unit.scopes[inner].push(Instruction::copy(t, Operand::local("depth")));

        let captured = unit.captured_locals(script);
        assert!(captured.contains(&Variable::local("count")));
        assert!(captured.contains(&Variable::local("depth")));
        assert_eq!(captured.len(), 2);
    }
}
