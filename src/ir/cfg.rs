use std::collections::HashMap;

use crate::ir::{Label, Op, Scope};

pub type BlockIndex = usize;

/// A maximal straight-line run of instructions, identified by its index
/// range into the owning scope's instruction list. Blocks never copy
/// instructions out of the scope.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
    pub successors: Vec<BlockIndex>,
    pub predecessors: Vec<BlockIndex>,
}

/// Control-flow graph view over a scope's instruction list, delimited by
/// label marks and control-transfer instructions. Transient: built fresh
/// for each analysis run and discarded with it.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
}

impl Cfg {
    pub fn build(scope: &Scope) -> Cfg {
        let instructions = scope.instructions();
        if instructions.is_empty() {
            return Cfg { blocks: Vec::new() };
        }

        // Leaders: the first instruction, every label mark, and every
        // instruction following a control transfer.
        let mut leaders = vec![false; instructions.len()];
        leaders[0] = true;
        for (i, instruction) in instructions.iter().enumerate() {
            if matches!(instruction.op(), Op::Mark(_)) {
                leaders[i] = true;
            }
            if instruction.op().is_terminator() && i + 1 < instructions.len() {
                leaders[i + 1] = true;
            }
        }

        let mut blocks = Vec::new();
        let mut label_blocks: HashMap<Label, BlockIndex> = HashMap::new();
        let mut start = 0;
        for i in 1..=instructions.len() {
            if i == instructions.len() || leaders[i] {
                let block = blocks.len();
                if let Op::Mark(label) = instructions[start].op() {
                    label_blocks.insert(*label, block);
                }
                blocks.push(BasicBlock {
                    start,
                    end: i,
                    successors: Vec::new(),
                    predecessors: Vec::new(),
                });
                start = i;
            }
        }

        let target_block = |label: &Label| -> BlockIndex {
            *label_blocks
                .get(label)
                .unwrap_or_else(|| panic!("branch to a label with no mark: {label:?}"))
        };

        let count = blocks.len();
        for b in 0..count {
            let last = &instructions[blocks[b].end - 1];
            let successors = match last.op() {
                Op::Jump(target) => vec![target_block(target)],
                Op::Branch { target, .. } => {
                    let mut succ = vec![target_block(target)];
                    if b + 1 < count {
                        succ.push(b + 1);
                    }
                    succ
                }
                Op::Return => Vec::new(),
                _ if b + 1 < count => vec![b + 1],
                _ => Vec::new(),
            };
            blocks[b].successors = successors.clone();
            for s in successors {
                blocks[s].predecessors.push(b);
            }
        }

        Cfg { blocks }
    }
}
