use crate::ir::cfg::Cfg;
use crate::ir::{Instruction, Scope};

pub mod liveness;

/// Direction a dataflow problem propagates facts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A problem solvable by the fixed-point engine.
///
/// Facts must form a finite lattice under `join` and `transfer` must be
/// monotonic; with both, round-robin iteration reaches a fixed point in a
/// bounded number of sweeps.
pub trait DataflowProblem {
    type Fact: Clone + PartialEq;

    fn direction(&self) -> Direction;

    /// Fact at the graph boundary: scope exit for backward problems,
    /// scope entry for forward ones.
    fn boundary_fact(&self) -> Self::Fact;

    /// Initial fact for interior blocks, usually the lattice bottom.
    fn init_fact(&self) -> Self::Fact;

    /// fact := fact ⊔ other
    fn join(&self, fact: &mut Self::Fact, other: &Self::Fact);

    /// Apply one instruction's transfer function to `fact`, against the
    /// problem's direction of iteration.
    fn transfer(&self, instruction: &Instruction, fact: &mut Self::Fact);
}

/// Per-block facts at the fixed point: `entry[b]` holds at block entry,
/// `exit[b]` at block exit, regardless of problem direction.
#[derive(Debug, Clone)]
pub struct Solution<F> {
    pub entry: Vec<F>,
    pub exit: Vec<F>,
}

/// Iterate `problem` over `cfg` to a fixed point.
pub fn solve<P: DataflowProblem>(problem: &P, scope: &Scope, cfg: &Cfg) -> Solution<P::Fact> {
    let count = cfg.blocks.len();
    let mut entry = vec![problem.init_fact(); count];
    let mut exit = vec![problem.init_fact(); count];
    let instructions = scope.instructions();

    match problem.direction() {
        Direction::Backward => loop {
            let mut changed = false;
            for b in (0..count).rev() {
                let block = &cfg.blocks[b];
                let mut fact = if block.successors.is_empty() {
                    problem.boundary_fact()
                } else {
                    let mut acc = problem.init_fact();
                    for &s in &block.successors {
                        problem.join(&mut acc, &entry[s]);
                    }
                    acc
                };
                if fact != exit[b] {
                    exit[b] = fact.clone();
                    changed = true;
                }
                for instruction in instructions[block.start..block.end].iter().rev() {
                    problem.transfer(instruction, &mut fact);
                }
                if fact != entry[b] {
                    entry[b] = fact;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        },
        Direction::Forward => loop {
            let mut changed = false;
            for b in 0..count {
                let block = &cfg.blocks[b];
                let mut fact = if block.predecessors.is_empty() {
                    problem.boundary_fact()
                } else {
                    let mut acc = problem.init_fact();
                    for &p in &block.predecessors {
                        problem.join(&mut acc, &exit[p]);
                    }
                    acc
                };
                if fact != entry[b] {
                    entry[b] = fact.clone();
                    changed = true;
                }
                for instruction in &instructions[block.start..block.end] {
                    problem.transfer(instruction, &mut fact);
                }
                if fact != exit[b] {
                    exit[b] = fact;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        },
    }

    Solution { entry, exit }
}
