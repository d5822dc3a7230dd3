use std::collections::HashMap;

use educe::Educe;

pub mod builder;
pub mod cfg;
pub mod dataflow;
pub mod passes;
pub mod printer;
pub mod scope;

pub use scope::{IrUnit, Scope, ScopeFlags, ScopeIndex, ScopeKind, Scopes};

/// A branch target inside a scope's instruction list.
///
/// Labels are resolved to instruction positions only when a scope is
/// prepared for execution; inside the IR they stay symbolic so passes can
/// insert and delete instructions freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

/// A value an instruction can read or define.
///
/// Equality is identity of the variable itself: two temporaries are the
/// same variable iff they share an id, two locals iff they share a name.
/// The dataflow analyses rely on this, never on the values a variable
/// holds at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Scope-private temporary allocated by the builder.
    Temp(usize),
    /// Named local variable living in the enclosing binding.
    Local(String),
}

impl Variable {
    pub fn local(name: &str) -> Self {
        Variable::Local(name.to_string())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Variable::Local(_))
    }
}

/// Constant data an operand can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(ConstValue),
    Var(Variable),
}

impl Operand {
    pub fn nil() -> Self {
        Operand::Const(ConstValue::Nil)
    }

    pub fn int(value: i64) -> Self {
        Operand::Const(ConstValue::Int(value))
    }

    pub fn str(value: &str) -> Self {
        Operand::Const(ConstValue::Str(value.to_string()))
    }

    pub fn var(variable: Variable) -> Self {
        Operand::Var(variable)
    }

    pub fn local(name: &str) -> Self {
        Operand::Var(Variable::local(name))
    }

    /// The variable this operand reads, if any.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Const(_) => None,
        }
    }
}

/// Primitive arithmetic and comparison on unboxed values. Pure: no
/// observable effect besides the produced result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Instruction kinds.
///
/// The operand ordering for each kind is fixed and part of its contract:
/// `UnboxValue` always takes the value to unbox at index 0, `Branch` reads
/// its condition at index 0, `Call` places the receiver at index 0 with the
/// arguments after it.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// result = operand 0.
    Copy,
    /// Primitive arithmetic over the two operands.
    Alu(AluOp),
    /// Dynamic method dispatch through the host object model.
    Call { method: String },
    /// Receive the frame's `self` value.
    ReceiveSelf,
    /// Receive the positional argument at `index` (nil when absent).
    ReceiveArg { index: usize },
    /// Materialize the closure for a nested scope, capturing the current
    /// frame's binding.
    BuildClosure { scope: ScopeIndex },
    /// Invoke the frame's block with the operands as arguments.
    Yield,
    /// Jump target marker; executes as a no-op.
    Mark(Label),
    /// Unconditional jump.
    Jump(Label),
    /// Jump to `target` when the condition matches `when_true`.
    Branch { target: Label, when_true: bool },
    /// Return operand 0 to the caller.
    Return,
    /// Re-box the primitive at index 0 into an object value. Tied to the
    /// emission site of its matching unbox; not clonable.
    BoxValue,
    /// Unbox the value at index 0 into a primitive. Tied to a specific
    /// call site; not clonable.
    UnboxValue,
}

impl Op {
    /// Whether this kind ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Jump(_) | Op::Branch { .. } | Op::Return)
    }

    /// Whether executing this kind is observable beyond its result.
    /// Instructions for which this holds are never dead, no matter how
    /// unused their result is.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Op::Call { .. } | Op::Yield)
    }

    /// Whether instructions of this kind may be duplicated for inlining.
    pub fn is_clonable(&self) -> bool {
        !matches!(self, Op::BoxValue | Op::UnboxValue)
    }

    /// The exact operand count this kind requires, when fixed.
    pub fn fixed_arity(&self) -> Option<usize> {
        match self {
            Op::Copy | Op::Return | Op::BoxValue | Op::UnboxValue => Some(1),
            Op::Alu(_) => Some(2),
            Op::Branch { .. } => Some(1),
            Op::ReceiveSelf
            | Op::ReceiveArg { .. }
            | Op::BuildClosure { .. }
            | Op::Mark(_)
            | Op::Jump(_) => Some(0),
            Op::Call { .. } | Op::Yield => None,
        }
    }
}

/// A single IR instruction: an operation tag over ordered operands, plus
/// an optional result variable for result-producing kinds.
///
/// The tag is fixed at construction. Operands may be replaced during
/// optimization, but never added or removed. Equality ignores the source
/// line, which is debug metadata.
#[derive(Debug, Clone, Educe)]
#[educe(PartialEq)]
pub struct Instruction {
    op: Op,
    operands: Vec<Operand>,
    result: Option<Variable>,
    /// Source line this instruction was lowered from.
    #[educe(PartialEq(ignore))]
    pub line: Option<u32>,
}

impl Instruction {
    pub fn new(op: Op, operands: Vec<Operand>, result: Option<Variable>) -> Self {
        if let Some(arity) = op.fixed_arity() {
            assert_eq!(
                operands.len(),
                arity,
                "operation {op:?} requires exactly {arity} operands"
            );
        }
        Self {
            op,
            operands,
            result,
            line: None,
        }
    }

    pub fn copy(result: Variable, src: Operand) -> Self {
        Self::new(Op::Copy, vec![src], Some(result))
    }

    pub fn alu(result: Variable, op: AluOp, lhs: Operand, rhs: Operand) -> Self {
        Self::new(Op::Alu(op), vec![lhs, rhs], Some(result))
    }

    pub fn call(result: Variable, method: &str, receiver: Operand, args: Vec<Operand>) -> Self {
        let mut operands = vec![receiver];
        operands.extend(args);
        Self::new(
            Op::Call {
                method: method.to_string(),
            },
            operands,
            Some(result),
        )
    }

    pub fn receive_self(result: Variable) -> Self {
        Self::new(Op::ReceiveSelf, Vec::new(), Some(result))
    }

    pub fn receive_arg(result: Variable, index: usize) -> Self {
        Self::new(Op::ReceiveArg { index }, Vec::new(), Some(result))
    }

    pub fn build_closure(result: Variable, scope: ScopeIndex) -> Self {
        Self::new(Op::BuildClosure { scope }, Vec::new(), Some(result))
    }

    pub fn yield_to_block(result: Variable, args: Vec<Operand>) -> Self {
        Self::new(Op::Yield, args, Some(result))
    }

    pub fn mark(label: Label) -> Self {
        Self::new(Op::Mark(label), Vec::new(), None)
    }

    pub fn jump(target: Label) -> Self {
        Self::new(Op::Jump(target), Vec::new(), None)
    }

    pub fn branch_if(cond: Operand, target: Label) -> Self {
        Self::new(
            Op::Branch {
                target,
                when_true: true,
            },
            vec![cond],
            None,
        )
    }

    pub fn branch_unless(cond: Operand, target: Label) -> Self {
        Self::new(
            Op::Branch {
                target,
                when_true: false,
            },
            vec![cond],
            None,
        )
    }

    pub fn ret(value: Operand) -> Self {
        Self::new(Op::Return, vec![value], None)
    }

    pub fn box_value(result: Variable, value: Operand) -> Self {
        Self::new(Op::BoxValue, vec![value], Some(result))
    }

    pub fn unbox_value(result: Variable, value: Operand) -> Self {
        Self::new(Op::UnboxValue, vec![value], Some(result))
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn result(&self) -> Option<&Variable> {
        self.result.as_ref()
    }

    /// Replace the operand at `index`, keeping count and ordering intact.
    pub fn replace_operand(&mut self, index: usize, operand: Operand) {
        self.operands[index] = operand;
    }

    /// Clone this instruction for inlining, remapping every variable it
    /// touches through `renaming`. Variables absent from the map are kept.
    ///
    /// Panics for operation kinds that are tied to their original site and
    /// cannot be meaningfully duplicated.
    pub fn clone_for_inlining(&self, renaming: &HashMap<Variable, Variable>) -> Instruction {
        if !self.op.is_clonable() {
            panic!("instruction {:?} cannot be cloned for inlining", self.op);
        }

        let remap = |v: &Variable| renaming.get(v).cloned().unwrap_or_else(|| v.clone());
        let operands = self
            .operands
            .iter()
            .map(|operand| match operand {
                Operand::Var(v) => Operand::Var(remap(v)),
                Operand::Const(c) => Operand::Const(c.clone()),
            })
            .collect();

        Instruction {
            op: self.op.clone(),
            operands,
            result: self.result.as_ref().map(remap),
            line: self.line,
        }
    }

    /// Every variable this instruction reads.
    pub fn used_variables(&self) -> impl Iterator<Item = &Variable> {
        self.operands.iter().filter_map(Operand::as_variable)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn clone_remaps_operands_and_result() {
        let t0 = Variable::Temp(0);
        let t1 = Variable::Temp(1);
        let instr = Instruction::alu(
            t1.clone(),
            AluOp::Add,
            Operand::var(t0.clone()),
            Operand::int(3),
        );

        let mut renaming = HashMap::new();
        renaming.insert(t0.clone(), Variable::Temp(7));
        renaming.insert(t1.clone(), Variable::Temp(8));

        let cloned = instr.clone_for_inlining(&renaming);
        assert_eq!(cloned.operands()[0], Operand::Var(Variable::Temp(7)));
        assert_eq!(cloned.operands()[1], Operand::int(3));
        assert_eq!(cloned.result(), Some(&Variable::Temp(8)));
        // the original is untouched
        assert_eq!(instr.operands()[0], Operand::Var(t0));
    }

    #[test]
    fn clone_keeps_unmapped_variables() {
        let instr = Instruction::copy(Variable::Temp(2), Operand::local("x"));
        let cloned = instr.clone_for_inlining(&HashMap::new());
        assert_eq!(cloned, instr);
    }

    #[test]
    #[should_panic(expected = "cannot be cloned")]
    fn clone_of_unbox_marker_panics() {
        let instr = Instruction::unbox_value(Variable::Temp(0), Operand::local("x"));
        instr.clone_for_inlining(&HashMap::new());
    }

    #[test]
    #[should_panic(expected = "requires exactly")]
    fn wrong_arity_is_rejected() {
        Instruction::new(Op::Copy, vec![], Some(Variable::Temp(0)));
    }

    #[test]
    fn equality_ignores_line_metadata() {
        let a = Instruction::ret(Operand::int(1));
        let b = Instruction::ret(Operand::int(1)).with_line(12);
        assert_eq!(a, b);
    }
}
