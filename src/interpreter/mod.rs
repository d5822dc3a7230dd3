//! Direct execution of the IR, used until the JIT backend has compiled a
//! scope natively.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ir::{AluOp, ConstValue, ScopeIndex};

pub mod context;
pub mod engine;

pub use context::InterpreterContext;
pub use engine::{Interpreter, MethodDispatch};

/// A runtime value flowing through the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Closure(ClosureValue),
}

impl Value {
    /// nil and false are falsy; every other value is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Closure(_) => "closure",
        }
    }
}

impl From<&ConstValue> for Value {
    fn from(constant: &ConstValue) -> Self {
        match constant {
            ConstValue::Nil => Value::Nil,
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Int(i) => Value::Int(*i),
            ConstValue::Float(x) => Value::Float(*x),
            ConstValue::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// A materialized closure: the nested scope to execute plus the binding
/// of the activation that materialized it. Invoking it later runs the
/// scope against that same binding.
#[derive(Debug, Clone)]
pub struct ClosureValue {
    pub scope: ScopeIndex,
    pub(crate) binding: Rc<RefCell<Binding>>,
}

impl PartialEq for ClosureValue {
    /// Two closure values are the same closure, not merely closures over
    /// the same scope.
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && Rc::ptr_eq(&self.binding, &other.binding)
    }
}

/// The local-variable frame of one activation, shared between a method
/// (or script) and every closure it materializes.
#[derive(Debug, Default)]
pub struct Binding {
    slots: HashMap<String, Value>,
}

impl Binding {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.slots.get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.slots.insert(name.to_string(), value);
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("undefined local variable `{name}` in {scope}")]
    UndefinedLocal { name: String, scope: String },
    #[error("undefined method `{method}` for {receiver}")]
    NoMethod { method: String, receiver: &'static str },
    #[error("no block given ({scope} yielded without one)")]
    NoBlock { scope: String },
    #[error("`{operation:?}` is not supported between {lhs} and {rhs}")]
    UnsupportedOperands {
        operation: AluOp,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("divided by 0")]
    DivisionByZero,
    #[error("control fell off the end of {scope} without a return")]
    MissingReturn { scope: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_nil_and_false() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn closure_equality_is_identity() {
        let mut unit = crate::ir::IrUnit::new();
        let script = unit.new_script("main");
        let scope = unit.new_closure(script);

        let binding = Rc::new(RefCell::new(Binding::default()));
        let a = ClosureValue {
            scope,
            binding: binding.clone(),
        };
        let b = ClosureValue {
            scope,
            binding: Rc::new(RefCell::new(Binding::default())),
        };
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
