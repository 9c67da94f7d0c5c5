//! Activation frames.

use std::sync::Arc;

use crate::compiler::bytecode::FunctionTemplate;
use crate::gc::{EnvRef, ObjectRef};
use crate::runtime::exception::{ErrorKind, Exception, JsResult, Thrown};
use crate::runtime::value::Value;

/// Contents of a frame register.
#[derive(Debug, Clone, Default)]
pub enum Register {
    /// Never written
    #[default]
    Empty,
    /// A value
    Value(Value),
    /// A saved environment record
    Env(EnvRef),
    /// An exception pending across a `finally` body
    Thrown(Thrown),
}

/// How a suspended coroutine is resumed.
#[derive(Debug, Clone)]
pub enum Resumption {
    /// `next(v)` or a fulfilled await
    Next(Value),
    /// `throw(v)` or a rejected await
    Throw(Value),
    /// `return(v)`
    Return(Value),
}

impl Resumption {
    /// The value carried by the resumption.
    pub fn into_value(self) -> Value {
        match self {
            Resumption::Next(v) | Resumption::Throw(v) | Resumption::Return(v) => v,
        }
    }
}

/// One activation of a compiled unit.
///
/// Generator and async frames are boxed into the heap between resumptions,
/// so everything a suspend point must preserve lives here.
#[derive(Debug)]
pub struct Frame {
    /// The code being run
    pub code: Arc<FunctionTemplate>,
    /// Next instruction
    pub ip: usize,
    /// Operand stack
    pub stack: Vec<Value>,
    /// Registers
    pub registers: Vec<Register>,
    /// Current environment record
    pub env: EnvRef,
    /// `this`
    pub this_value: Value,
    /// The function object, absent for scripts and modules
    pub callee: Option<ObjectRef>,
    /// Actual arguments
    pub arguments: Vec<Value>,
    /// Suspend state to resume at
    pub resume_state: u32,
    /// Pending resumption, consumed by the resume opcodes
    pub resumption: Option<Resumption>,
    /// Return addresses of out-of-line units
    pub unit_returns: Vec<usize>,
    /// Pre-resolved module imports
    pub imports: Vec<Value>,
}

impl Frame {
    /// Creates a frame positioned at the first instruction.
    pub fn new(
        code: Arc<FunctionTemplate>,
        env: EnvRef,
        this_value: Value,
        callee: Option<ObjectRef>,
        arguments: Vec<Value>,
    ) -> Self {
        let registers = vec![Register::Empty; code.bytecode.register_count as usize];
        Self {
            code,
            ip: 0,
            stack: Vec::new(),
            registers,
            env,
            this_value,
            callee,
            arguments,
            resume_state: 0,
            resumption: None,
            unit_returns: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Pops the operand stack.
    pub fn pop(&mut self) -> JsResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Exception::error(ErrorKind::InternalError, "operand stack underflow"))
    }

    /// Pushes onto the operand stack.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.stack.push(value.into());
    }

    /// Returns the top of the operand stack.
    pub fn peek(&self) -> JsResult<&Value> {
        self.stack
            .last()
            .ok_or_else(|| Exception::error(ErrorKind::InternalError, "operand stack underflow"))
    }

    /// Pops the top `n` values, in push order.
    pub fn pop_n(&mut self, n: usize) -> JsResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(Exception::error(
                ErrorKind::InternalError,
                "operand stack underflow",
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Returns a register slot.
    pub fn register(&mut self, index: u32) -> JsResult<&mut Register> {
        self.registers
            .get_mut(index as usize)
            .ok_or_else(|| Exception::error(ErrorKind::InternalError, "invalid register"))
    }

    /// Reads a register as a value.
    pub fn register_value(&self, index: u32) -> Value {
        match self.registers.get(index as usize) {
            Some(Register::Value(v)) => v.clone(),
            Some(Register::Thrown(t)) => t.value.clone(),
            _ => Value::Undefined,
        }
    }
}
