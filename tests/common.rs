use resin::compile_unit_info::{CompileUnitInfo, OptLevel};
use resin::interpreter::{Interpreter, MethodDispatch, RuntimeError, Value};
use resin::ir::builder::ScopeBuilder;
use resin::ir::passes;
use resin::ir::{AluOp, IrUnit, Operand, ScopeIndex};

#[allow(unused)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Object model for the test programs: answers `log` and records every
/// dispatched call.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub calls: Vec<String>,
}

impl MethodDispatch for RecordingHost {
    fn call(
        &mut self,
        method: &str,
        receiver: &Value,
        _args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.calls.push(method.to_string());
        match method {
            "log" => Ok(Value::Nil),
            _ => Err(RuntimeError::NoMethod {
                method: method.to_string(),
                receiver: receiver.type_name(),
            }),
        }
    }
}

/// n! with a loop, taking n at argument position 0. The loop body also
/// computes a scratch value no path ever reads, so optimized and
/// unoptimized lists differ by exactly that instruction.
#[allow(unused)]
pub fn factorial_method(unit: &mut IrUnit) -> ScopeIndex {
    let script = unit.new_script("main");
    let method = unit.new_method(script, "factorial");
    let mut b = ScopeBuilder::new(unit, method);

    let n = b.receive_arg(0);
    b.store_local("n", Operand::var(n));
    b.store_local("acc", Operand::int(1));
    let head = b.label();
    let done = b.label();
    b.mark(head);
    let more = b.alu(AluOp::Gt, Operand::local("n"), Operand::int(1));
    b.branch_unless(Operand::var(more), done);
    let acc = b.alu(AluOp::Mul, Operand::local("acc"), Operand::local("n"));
    b.store_local("acc", Operand::var(acc));
    let next = b.alu(AluOp::Sub, Operand::local("n"), Operand::int(1));
    b.store_local("n", Operand::var(next));
    let _scratch = b.alu(AluOp::Add, Operand::local("acc"), Operand::int(0));
    b.jump(head);
    b.mark(done);
    b.ret(Operand::local("acc"));

    method
}

/// A method returning a closure over `count`; each invocation of the
/// closure bumps the shared local and returns it.
#[allow(unused)]
pub fn counter_method(unit: &mut IrUnit) -> ScopeIndex {
    let script = unit.new_script("main");
    let method = unit.new_method(script, "counter");
    let mut b = ScopeBuilder::new(unit, method);

    b.store_local("count", Operand::int(0));
    let (child, closure_var) = b.build_closure();
    let mut cb = b.nested(child);
    let bumped = cb.alu(AluOp::Add, Operand::local("count"), Operand::int(1));
    cb.store_local("count", Operand::var(bumped));
    cb.ret(Operand::local("count"));
    b.ret(Operand::var(closure_var));

    method
}

/// Logs through the object model, dropping the call's result.
#[allow(unused)]
pub fn logging_script(unit: &mut IrUnit) -> ScopeIndex {
    let script = unit.new_script("main");
    let mut b = ScopeBuilder::new(unit, script);
    let t0 = b.copy(Operand::int(1));
    let _ignored = b.call("log", Operand::var(t0), vec![]);
    b.ret(Operand::int(0));
    script
}

#[allow(unused)]
pub fn optimize(unit: &mut IrUnit, scope: ScopeIndex, optlevel: OptLevel) {
    let info = CompileUnitInfo {
        optlevel,
        dump_ir: false,
    };
    passes::optimize(unit, scope, &info).expect("pass pipeline failed");
}

#[allow(unused)]
#[track_caller]
pub fn run_with_args(unit: &IrUnit, scope: ScopeIndex, args: &[Value]) -> Value {
    Interpreter::new(unit, ())
        .interpret(scope, Value::Nil, args, None)
        .expect("failed to interpret")
}
