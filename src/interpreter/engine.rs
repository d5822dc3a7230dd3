use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::interpreter::context::InterpreterContext;
use crate::interpreter::{Binding, ClosureValue, RuntimeError, Value};
use crate::ir::{AluOp, Instruction, IrUnit, Op, Operand, ScopeIndex, Variable};

/// The method-dispatch seam to the host object model. Every `call`
/// instruction is routed through it; the engine never resolves methods
/// itself.
pub trait MethodDispatch {
    fn call(
        &mut self,
        method: &str,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError>;
}

/// The empty object model: every dispatch fails. Enough for units that
/// never leave the IR primitives.
impl MethodDispatch for () {
    fn call(
        &mut self,
        method: &str,
        receiver: &Value,
        _args: &[Value],
    ) -> Result<Value, RuntimeError> {
        Err(RuntimeError::NoMethod {
            method: method.to_string(),
            receiver: receiver.type_name(),
        })
    }
}

/// One activation: the `self` value, positional arguments, the block if
/// one was passed, temp slots sized from the context, and the binding
/// locals are read and written through.
struct Frame {
    self_value: Value,
    args: Vec<Value>,
    block: Option<ClosureValue>,
    temps: Vec<Value>,
    binding: Rc<RefCell<Binding>>,
}

impl Frame {
    fn new(
        context: &InterpreterContext,
        self_value: Value,
        args: Vec<Value>,
        block: Option<ClosureValue>,
        binding: Rc<RefCell<Binding>>,
    ) -> Self {
        Self {
            self_value,
            args,
            block,
            temps: vec![Value::Nil; context.temp_count()],
            binding,
        }
    }
}

/// Executes a unit's scopes one instruction at a time, building and
/// caching the [`InterpreterContext`] of each scope on first entry.
pub struct Interpreter<'u, D> {
    unit: &'u IrUnit,
    dispatch: D,
    contexts: HashMap<ScopeIndex, Rc<InterpreterContext>>,
}

impl<'u, D: MethodDispatch> Interpreter<'u, D> {
    pub fn new(unit: &'u IrUnit, dispatch: D) -> Self {
        Self {
            unit,
            dispatch,
            contexts: HashMap::new(),
        }
    }

    /// Hand the object model back, typically to inspect it after a run.
    pub fn into_dispatch(self) -> D {
        self.dispatch
    }

    /// The cached execution view of `scope`, built on first use.
    pub fn context_for(&mut self, scope: ScopeIndex) -> Rc<InterpreterContext> {
        self.contexts
            .entry(scope)
            .or_insert_with(|| Rc::new(InterpreterContext::build(self.unit, scope)))
            .clone()
    }

    /// Execute a script or method scope against a fresh binding.
    ///
    /// Panics when `scope` is a closure: closures never allocate a
    /// binding and must be entered through [`Interpreter::call_closure`]
    /// with the one they captured.
    pub fn interpret(
        &mut self,
        scope: ScopeIndex,
        self_value: Value,
        args: &[Value],
        block: Option<ClosureValue>,
    ) -> Result<Value, RuntimeError> {
        let context = self.context_for(scope);
        let binding = context.new_binding();
        let mut frame = Frame::new(&context, self_value, args.to_vec(), block, binding);
        self.execute(&context, &mut frame)
    }

    /// Invoke a closure value. The frame reuses the binding captured when
    /// the closure was materialized, so writes to locals stay visible to
    /// the enclosing activation and to sibling closures.
    pub fn call_closure(
        &mut self,
        closure: &ClosureValue,
        self_value: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let context = self.context_for(closure.scope);
        let mut frame = Frame::new(
            &context,
            self_value,
            args.to_vec(),
            None,
            closure.binding.clone(),
        );
        self.execute(&context, &mut frame)
    }

    fn execute(
        &mut self,
        context: &InterpreterContext,
        frame: &mut Frame,
    ) -> Result<Value, RuntimeError> {
        let instructions = context.instructions();
        let mut ipc = 0;

        while ipc < instructions.len() {
            let instruction = &instructions[ipc];
            trace!("I: {instruction}");
            ipc += 1;

            match instruction.op() {
                // the engine keeps every value boxed, so the boxing
                // markers degenerate to copies; only the JIT backend
                // gives them distinct representations
                Op::Copy | Op::BoxValue | Op::UnboxValue => {
                    let value = read_operand(context, frame, &instruction.operands()[0])?;
                    write_result(frame, instruction, value);
                }
                Op::Alu(op) => {
                    let lhs = read_operand(context, frame, &instruction.operands()[0])?;
                    let rhs = read_operand(context, frame, &instruction.operands()[1])?;
                    write_result(frame, instruction, apply_alu(*op, &lhs, &rhs)?);
                }
                Op::Call { method } => {
                    let receiver = read_operand(context, frame, &instruction.operands()[0])?;
                    let mut args = Vec::with_capacity(instruction.operands().len() - 1);
                    for operand in &instruction.operands()[1..] {
                        args.push(read_operand(context, frame, operand)?);
                    }
                    let value = self.dispatch.call(method, &receiver, &args)?;
                    write_result(frame, instruction, value);
                }
                Op::ReceiveSelf => {
                    let value = frame.self_value.clone();
                    write_result(frame, instruction, value);
                }
                Op::ReceiveArg { index } => {
                    let value = frame.args.get(*index).cloned().unwrap_or(Value::Nil);
                    write_result(frame, instruction, value);
                }
                Op::BuildClosure { scope } => {
                    let closure = Value::Closure(ClosureValue {
                        scope: *scope,
                        binding: frame.binding.clone(),
                    });
                    write_result(frame, instruction, closure);
                }
                Op::Yield => {
                    let block = frame.block.clone().ok_or_else(|| RuntimeError::NoBlock {
                        scope: context.name().to_string(),
                    })?;
                    let mut args = Vec::with_capacity(instruction.operands().len());
                    for operand in instruction.operands() {
                        args.push(read_operand(context, frame, operand)?);
                    }
                    let self_value = frame.self_value.clone();
                    let value = self.call_closure(&block, self_value, &args)?;
                    write_result(frame, instruction, value);
                }
                // marks are stripped when the context is built
                Op::Mark(_) => {}
                Op::Jump(target) => ipc = context.target(*target),
                Op::Branch { target, when_true } => {
                    let cond = read_operand(context, frame, &instruction.operands()[0])?;
                    if cond.is_truthy() == *when_true {
                        ipc = context.target(*target);
                    }
                }
                Op::Return => {
                    return read_operand(context, frame, &instruction.operands()[0]);
                }
            }
        }

        Err(RuntimeError::MissingReturn {
            scope: context.name().to_string(),
        })
    }
}

fn read_operand(
    context: &InterpreterContext,
    frame: &Frame,
    operand: &Operand,
) -> Result<Value, RuntimeError> {
    match operand {
        Operand::Const(constant) => Ok(Value::from(constant)),
        Operand::Var(Variable::Temp(id)) => Ok(frame.temps[*id].clone()),
        Operand::Var(Variable::Local(name)) => {
            frame
                .binding
                .borrow()
                .get(name)
                .ok_or_else(|| RuntimeError::UndefinedLocal {
                    name: name.clone(),
                    scope: context.name().to_string(),
                })
        }
    }
}

fn write_result(frame: &mut Frame, instruction: &Instruction, value: Value) {
    match instruction.result() {
        Some(Variable::Temp(id)) => frame.temps[*id] = value,
        Some(Variable::Local(name)) => frame.binding.borrow_mut().set(name, value),
        None => {}
    }
}

fn apply_alu(op: AluOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    // equality compares any two values; the rest is numeric
    match op {
        AluOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        AluOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        _ => {}
    }

    let value = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            AluOp::Add => Value::Int(a.wrapping_add(*b)),
            AluOp::Sub => Value::Int(a.wrapping_sub(*b)),
            AluOp::Mul => Value::Int(a.wrapping_mul(*b)),
            AluOp::Div if *b == 0 => return Err(RuntimeError::DivisionByZero),
            AluOp::Div => Value::Int(a.wrapping_div(*b)),
            AluOp::Mod if *b == 0 => return Err(RuntimeError::DivisionByZero),
            AluOp::Mod => Value::Int(a.wrapping_rem(*b)),
            AluOp::Lt => Value::Bool(a < b),
            AluOp::Le => Value::Bool(a <= b),
            AluOp::Gt => Value::Bool(a > b),
            AluOp::Ge => Value::Bool(a >= b),
            AluOp::Eq | AluOp::Ne => unreachable!(),
        },
        (Value::Float(a), Value::Float(b)) => match op {
            AluOp::Add => Value::Float(a + b),
            AluOp::Sub => Value::Float(a - b),
            AluOp::Mul => Value::Float(a * b),
            AluOp::Div => Value::Float(a / b),
            AluOp::Mod => Value::Float(a % b),
            AluOp::Lt => Value::Bool(a < b),
            AluOp::Le => Value::Bool(a <= b),
            AluOp::Gt => Value::Bool(a > b),
            AluOp::Ge => Value::Bool(a >= b),
            AluOp::Eq | AluOp::Ne => unreachable!(),
        },
        _ => {
            return Err(RuntimeError::UnsupportedOperands {
                operation: op,
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            });
        }
    };
    Ok(value)
}
