use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;

use crate::ir::cfg::Cfg;
use crate::ir::dataflow::{solve, DataflowProblem, Direction};
use crate::ir::{Instruction, IrUnit, Op, ScopeIndex, ScopeKind, Variable};

/// Backward may-analysis: a variable is live at a point when its current
/// value may be read on some path forward from that point.
pub struct LiveVariablesProblem {
    /// Variables live past every scope exit: locals observable after the
    /// activation returns.
    exit_live: HashSet<Variable>,
}

impl LiveVariablesProblem {
    pub fn new(unit: &IrUnit, scope: ScopeIndex) -> Self {
        let scope_ref = &unit.scopes[scope];

        // Locals referenced by nested scopes live in this scope's binding
        // and stay observable through the closures that captured them.
        let mut exit_live = unit.captured_locals(scope);

        // A closure writes through its caller's binding, so every local it
        // touches outlives the activation. Script bindings outlive the run
        // entirely, and an escaped binding can be read by anyone. Only a
        // method with an unescaped binding owns its locals outright.
        let locals_escape =
            scope_ref.kind != ScopeKind::Method || scope_ref.flags.binding_has_escaped;
        if locals_escape {
            exit_live.extend(scope_ref.referenced_locals());
        }

        Self { exit_live }
    }
}

impl DataflowProblem for LiveVariablesProblem {
    type Fact = HashSet<Variable>;

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn boundary_fact(&self) -> Self::Fact {
        self.exit_live.clone()
    }

    fn init_fact(&self) -> Self::Fact {
        HashSet::new()
    }

    fn join(&self, fact: &mut Self::Fact, other: &Self::Fact) {
        fact.extend(other.iter().cloned());
    }

    /// live-in = (live-out − defs) ∪ uses
    fn transfer(&self, instruction: &Instruction, fact: &mut Self::Fact) {
        if let Some(result) = instruction.result() {
            fact.remove(result);
        }
        for used in instruction.used_variables() {
            fact.insert(used.clone());
        }
    }
}

/// Outcome of live-variable analysis over one scope, aligned index by
/// index with the instruction list it was computed over.
#[derive(Debug, Clone)]
pub struct LivenessResult {
    /// Whether the instruction's defined result is live immediately
    /// after it.
    pub result_live: Vec<bool>,
    /// Instructions whose only contribution is an unused pure value.
    pub dead: Vec<bool>,
}

impl LivenessResult {
    pub fn dead_indexes(&self) -> Vec<usize> {
        self.dead
            .iter()
            .positions(|dead| *dead)
            .collect()
    }
}

/// Solve liveness for `scope` and mark its dead instructions: those whose
/// defined result is never live after them and which carry no side effect
/// beyond producing that result. Control transfers and label marks are
/// never marked, whatever their liveness.
pub fn mark_dead_instructions(unit: &IrUnit, scope: ScopeIndex) -> LivenessResult {
    let scope_ref = &unit.scopes[scope];
    let cfg = Cfg::build(scope_ref);
    let problem = LiveVariablesProblem::new(unit, scope);
    let solution = solve(&problem, scope_ref, &cfg);

    let instructions = scope_ref.instructions();
    let mut result_live = vec![false; instructions.len()];
    let mut dead = vec![false; instructions.len()];

    for (b, block) in cfg.blocks.iter().enumerate() {
        let mut live = solution.exit[b].clone();
        for i in (block.start..block.end).rev() {
            let instruction = &instructions[i];
            if let Some(result) = instruction.result() {
                result_live[i] = live.contains(result);
            }
            let removable = !instruction.op().has_side_effects()
                && !instruction.op().is_terminator()
                && !matches!(instruction.op(), Op::Mark(_));
            dead[i] = instruction.result().is_some() && !result_live[i] && removable;
            problem.transfer(instruction, &mut live);
        }
    }

    let dead_count = dead.iter().filter(|d| **d).count();
    if dead_count > 0 {
        debug!(
            "liveness marked {dead_count} dead instruction(s) in {}",
            scope_ref.name
        );
    }

    LivenessResult { result_live, dead }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::ScopeBuilder;
    use crate::ir::{AluOp, Operand};

    #[test]
    fn unused_pure_result_is_dead() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);

        // t0 = 5; t1 = t0 + t0; return t0
        let t0 = b.copy(Operand::int(5));
        let _t1 = b.alu(AluOp::Add, Operand::var(t0.clone()), Operand::var(t0.clone()));
        b.ret(Operand::var(t0));

        let result = mark_dead_instructions(&unit, script);
        assert_eq!(result.dead, vec![false, true, false]);
        assert_eq!(result.dead_indexes(), vec![1]);
    }

    #[test]
    fn side_effecting_call_is_never_dead() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);

        // t0 = 1; t1 = call log(t0); return 0; t1 unused, call retained
        let t0 = b.copy(Operand::int(1));
        let _t1 = b.call("log", Operand::var(t0), vec![]);
        b.ret(Operand::int(0));

        let result = mark_dead_instructions(&unit, script);
        assert!(!result.dead[1]);
        assert!(!result.result_live[1]);
    }

    #[test]
    fn loop_back_edges_keep_variables_live() {
        let mut unit = IrUnit::new();
        let method = {
            let script = unit.new_script("main");
            unit.new_method(script, "spin")
        };
        let mut b = ScopeBuilder::new(&mut unit, method);

        // t0 = 10; head: t1 = t0 > 0; branch_if t1 -> head; return t0
        let head = b.label();
        let t0 = b.copy(Operand::int(10));
        b.mark(head);
        let t1 = b.alu(AluOp::Gt, Operand::var(t0.clone()), Operand::int(0));
        b.branch_if(Operand::var(t1), head);
        b.ret(Operand::var(t0));

        let result = mark_dead_instructions(&unit, method);
        assert!(result.dead.iter().all(|dead| !dead));
    }

    #[test]
    fn captured_local_is_live_at_method_exit() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let method = unit.new_method(script, "counter");
        let mut b = ScopeBuilder::new(&mut unit, method);

        // count = 1; closure reads count; return closure
        b.store_local("count", Operand::int(1));
        let (child, closure_var) = b.build_closure();
        let mut cb = b.nested(child);
        let c = cb.copy(Operand::local("count"));
        cb.ret(Operand::var(c));
        b.ret(Operand::var(closure_var));

        let result = mark_dead_instructions(&unit, method);
        // the store to `count` must survive: the closure observes it
        assert!(!result.dead[0]);
    }

    #[test]
    fn uncaptured_local_store_in_method_is_dead() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let method = unit.new_method(script, "busy");
        let mut b = ScopeBuilder::new(&mut unit, method);

        b.store_local("scratch", Operand::int(1));
        b.ret(Operand::int(0));

        let result = mark_dead_instructions(&unit, method);
        assert!(result.dead[0]);
    }

    #[test]
    fn escaped_binding_pins_every_local() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let method = unit.new_method(script, "evalish");
        unit.scopes[method].flags.binding_has_escaped = true;
        let mut b = ScopeBuilder::new(&mut unit, method);

        b.store_local("scratch", Operand::int(1));
        b.ret(Operand::int(0));

        let result = mark_dead_instructions(&unit, method);
        assert!(!result.dead[0]);
    }

    #[test]
    fn script_locals_survive_scope_exit() {
        let mut unit = IrUnit::new();
        let script = unit.new_script("main");
        let mut b = ScopeBuilder::new(&mut unit, script);

        b.store_local("top", Operand::int(1));
        b.ret(Operand::int(0));

        let result = mark_dead_instructions(&unit, script);
        assert!(!result.dead[0]);
    }
}
