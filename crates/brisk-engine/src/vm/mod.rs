//! The reference stack VM.
//!
//! Executes the instructions the code generator emits. The VM exists so the
//! translation rules can be observed end to end; it favors directness over
//! speed.
//!
//! ## Structure
//!
//! - `frame` - activation frames and registers
//! - `interpreter` - the instruction loop and exception unwinding
//! - `generator` - generator objects and async function activations

pub mod frame;
pub mod generator;
mod interpreter;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::compiler::bytecode::{FunctionKind, FunctionTemplate};
use crate::config::VmOptions;
use crate::gc::{EnvRef, Heap, ObjectRef};
use crate::runtime::environment::Environment;
use crate::runtime::exception::{ErrorKind, Exception, JsResult, Thrown};
use crate::runtime::object::{Closure, Object, ObjectKind, Property};
use crate::runtime::promise::Job;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;
use frame::Frame;

/// How a frame stopped running.
#[derive(Debug)]
pub enum FrameExit {
    /// The unit returned
    Return(Value),
    /// The unit suspended, handing out a value
    Yield(Value),
    /// The unit ended with a call in tail position
    TailCall {
        /// Function to call
        callee: Value,
        /// Receiver
        this: Value,
        /// Arguments
        args: Vec<Value>,
    },
}

/// The virtual machine: heap, realm and job queue.
#[derive(Debug)]
pub struct Vm {
    /// Object and environment storage
    pub heap: Heap,
    /// Intrinsics
    pub realm: Realm,
    pub(crate) options: VmOptions,
    pub(crate) depth: usize,
    pub(crate) jobs: VecDeque<Job>,
    output: Vec<String>,
}

impl Vm {
    /// Creates a VM with a fresh realm.
    pub fn new(options: VmOptions) -> Self {
        let mut heap = Heap::new();
        let realm = Realm::new(&mut heap);
        Self {
            heap,
            realm,
            options,
            depth: 0,
            jobs: VecDeque::new(),
            output: Vec::new(),
        }
    }

    /// The interpreter limits.
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Records a line written by `print`.
    pub fn print_line(&mut self, line: String) {
        debug!(target: "brisk::print", "{line}");
        self.output.push(line);
    }

    /// Lines written by `print` so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Takes the lines written by `print`.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn enter(&mut self) -> JsResult<()> {
        if self.depth >= self.options.max_call_depth {
            return Err(Exception::StackOverflow);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Runs a compiled script in the global environment.
    pub fn run_script(&mut self, template: Arc<FunctionTemplate>) -> crate::Result<Value> {
        let this = Value::Object(self.realm.global_object);
        let frame = Frame::new(template, self.realm.global_env, this, None, Vec::new());
        self.run_top(frame)
    }

    /// Runs a compiled module body with its resolved imports.
    pub fn run_module(
        &mut self,
        template: Arc<FunctionTemplate>,
        imports: Vec<Value>,
    ) -> crate::Result<Value> {
        let env = self
            .heap
            .alloc_env(Environment::declarative(Some(self.realm.global_env)));
        let mut frame = Frame::new(template, env, Value::Undefined, None, Vec::new());
        frame.imports = imports;
        self.run_top(frame)
    }

    fn run_top(&mut self, mut frame: Frame) -> crate::Result<Value> {
        match self.run_frame(&mut frame) {
            Ok(FrameExit::Return(value)) => Ok(value),
            Ok(FrameExit::Yield(_) | FrameExit::TailCall { .. }) => Err(crate::Error::internal(
                "top-level code suspended or made a tail call",
            )),
            Err(exception) => Err(self.uncaught(exception)),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call(F, thisArgument, args).
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let Some(r) = callee.as_object() else {
            return Err(self.not_a_function(callee));
        };
        match &self.heap.object(r).kind {
            ObjectKind::Function(closure) => {
                let closure = closure.clone();
                self.call_closure(r, &closure, this.clone(), args.to_vec())
            }
            ObjectKind::Native { func, .. } => {
                let func = *func;
                self.enter()?;
                let result = func(self, this, args);
                self.leave();
                result
            }
            ObjectKind::ErrorConstructor(kind) => {
                let kind = *kind;
                self.error_constructor(kind, args)
            }
            _ => Err(self.not_a_function(callee)),
        }
    }

    fn not_a_function(&self, callee: &Value) -> Exception {
        Exception::type_error(format!("{} is not a function", self.describe(callee)))
    }

    fn call_closure(
        &mut self,
        callee: ObjectRef,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
    ) -> JsResult<Value> {
        match closure.template.kind {
            FunctionKind::Generator => {
                return generator::start_generator(self, callee, closure, this, args);
            }
            FunctionKind::Async | FunctionKind::AsyncArrow => {
                return generator::start_async(self, callee, closure, this, args);
            }
            _ => {}
        }
        self.enter()?;
        let result = self.run_closure(callee, closure, this, args);
        self.leave();
        result
    }

    /// Runs a closure to completion, replacing the frame on tail calls.
    fn run_closure(
        &mut self,
        callee: ObjectRef,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
    ) -> JsResult<Value> {
        let mut frame = self.new_frame(callee, closure, this, args);
        loop {
            match self.run_frame(&mut frame)? {
                FrameExit::Return(value) => return Ok(value),
                FrameExit::Yield(_) => {
                    return Err(Exception::error(
                        ErrorKind::InternalError,
                        "suspend outside a coroutine",
                    ));
                }
                FrameExit::TailCall { callee, this, args } => {
                    let target = callee.as_object().and_then(|r| match &self.heap.object(r).kind {
                        ObjectKind::Function(c) if !c.template.kind.is_resumable() => {
                            Some((r, c.clone()))
                        }
                        _ => None,
                    });
                    match target {
                        Some((r, closure)) => frame = self.new_frame(r, &closure, this, args),
                        None => return self.call(&callee, &this, &args),
                    }
                }
            }
        }
    }

    pub(crate) fn new_frame(
        &mut self,
        callee: ObjectRef,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
    ) -> Frame {
        let env = self
            .heap
            .alloc_env(Environment::declarative(Some(closure.env)));
        let template = &closure.template;
        let this_value = if template.kind.is_arrow() {
            closure.this.clone().unwrap_or_default()
        } else if !template.strict && this.is_nullish() {
            Value::Object(self.realm.global_object)
        } else {
            this
        };
        Frame::new(template.clone(), env, this_value, Some(callee), args)
    }

    /// Construct(F, args).
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> JsResult<Value> {
        let target = callee.as_object().map(|r| (r, &self.heap.object(r).kind));
        match target {
            Some((r, ObjectKind::Function(closure))) if closure.template.kind == FunctionKind::Normal => {
                let closure = closure.clone();
                let prototype = self
                    .heap
                    .get(r, &"prototype".into())
                    .and_then(|p| p.as_object())
                    .unwrap_or(self.realm.object_prototype);
                let object = self.heap.alloc(Object::ordinary(Some(prototype)));
                let result = self.call_closure(r, &closure, Value::Object(object), args.to_vec())?;
                Ok(if result.as_object().is_some() {
                    result
                } else {
                    Value::Object(object)
                })
            }
            Some((_, ObjectKind::ErrorConstructor(kind))) => {
                let kind = *kind;
                self.error_constructor(kind, args)
            }
            _ => Err(Exception::type_error(format!(
                "{} is not a constructor",
                self.describe(callee)
            ))),
        }
    }

    fn error_constructor(&mut self, kind: ErrorKind, args: &[Value]) -> JsResult<Value> {
        let error = self.new_error_object(kind);
        if let Some(message) = args.first().filter(|m| !m.is_undefined()) {
            let message = self.to_js_string(message)?;
            self.heap
                .define_hidden(error, "message", Value::String(message));
        }
        Ok(Value::Object(error))
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    /// Creates a function object over `template`.
    pub fn create_closure(
        &mut self,
        template: Arc<FunctionTemplate>,
        env: EnvRef,
        this: Option<Value>,
    ) -> ObjectRef {
        let kind = template.kind;
        let name = Value::String(template.name.clone());
        let length = Value::Number(f64::from(template.param_count));
        let function = self.heap.alloc(Object::new(
            Some(self.realm.function_prototype),
            ObjectKind::Function(Closure {
                template,
                env,
                this,
            }),
        ));
        self.heap.define_hidden(function, "name", name);
        self.heap.define_hidden(function, "length", length);

        let prototype_parent = match kind {
            FunctionKind::Normal => Some(self.realm.object_prototype),
            FunctionKind::Generator => Some(self.realm.generator_prototype),
            _ => None,
        };
        if let Some(parent) = prototype_parent {
            let prototype = self.heap.alloc(Object::ordinary(Some(parent)));
            if kind == FunctionKind::Normal {
                self.heap
                    .define_hidden(prototype, "constructor", Value::Object(function));
            }
            self.heap.define(
                function,
                "prototype".into(),
                Property {
                    configurable: false,
                    ..Property::hidden(Value::Object(prototype))
                },
            );
        }
        function
    }

    fn new_error_object(&mut self, kind: ErrorKind) -> ObjectRef {
        let prototype = self.realm.error_prototype(kind);
        self.heap.alloc(Object::new(
            Some(prototype),
            ObjectKind::Error {
                kind,
                suppressed: Vec::new(),
            },
        ))
    }

    /// Creates an error object of `kind` with `message`.
    pub fn create_error(&mut self, kind: ErrorKind, message: &str) -> ObjectRef {
        let error = self.new_error_object(kind);
        self.heap.define_hidden(error, "message", Value::from(message));
        error
    }

    /// Turns an exception into a thrown value, creating the error object of
    /// a native error.
    pub fn materialize(&mut self, exception: Exception) -> Thrown {
        match exception {
            Exception::Thrown(thrown) => thrown,
            Exception::Error { kind, message } => {
                Thrown::new(Value::Object(self.create_error(kind, &message)))
            }
            Exception::StackOverflow => {
                debug!("call depth limit converted to InternalError");
                let error = self.create_error(ErrorKind::InternalError, "too much recursion");
                Thrown::new(Value::Object(error))
            }
        }
    }

    /// Records `thrown.suppressed` on the error object it carries, so a
    /// catch clause can observe it as `e.suppressed`.
    pub(crate) fn attach_suppressed(&mut self, thrown: Thrown) -> Value {
        if thrown.suppressed.is_empty() {
            return thrown.value;
        }
        let Some(r) = thrown.value.as_object() else {
            return thrown.value;
        };
        let all = match &mut self.heap.object_mut(r).kind {
            ObjectKind::Error { suppressed, .. } => {
                suppressed.extend(thrown.suppressed);
                suppressed.clone()
            }
            _ => return thrown.value,
        };
        let list = self.heap.alloc(Object::new(
            Some(self.realm.array_prototype),
            ObjectKind::Array(all),
        ));
        self.heap
            .define_hidden(r, "suppressed", Value::Object(list));
        thrown.value
    }

    /// Converts an exception escaping an activation into an engine error.
    pub fn uncaught(&mut self, exception: Exception) -> crate::Error {
        if exception.is_stack_overflow() {
            return crate::Error::StackOverflow;
        }
        let thrown = self.materialize(exception);
        let mut suppressed = thrown.suppressed.clone();
        if let Some(r) = thrown.value.as_object() {
            if let ObjectKind::Error {
                suppressed: recorded,
                ..
            } = &self.heap.object(r).kind
            {
                suppressed.extend(recorded.iter().cloned());
            }
        }
        crate::Error::Uncaught {
            value: self.display(&thrown.value),
            suppressed: suppressed.iter().map(|v| self.display(v)).collect(),
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Renders a value without running user code.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Symbol(id) => format!("Symbol({})", self.heap.symbol_description(*id)),
            Value::Object(r) => match &self.heap.object(*r).kind {
                ObjectKind::Function(c) => format!("function {}", c.template.name),
                ObjectKind::Native { name, .. } => format!("function {name}"),
                ObjectKind::ErrorConstructor(kind) => format!("function {kind}"),
                ObjectKind::Array(_) => "[object Array]".to_string(),
                _ => "[object Object]".to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Renders a value the way `print` would, falling back to
    /// [`describe`](Self::describe) when conversion throws.
    pub fn display(&mut self, value: &Value) -> String {
        match self.to_js_string(value) {
            Ok(s) => s.to_string(),
            Err(_) => self.describe(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_non_callable_is_type_error() {
        let mut vm = Vm::new(VmOptions::default());
        let err = vm.call(&Value::Number(1.0), &Value::Undefined, &[]).unwrap_err();
        assert_eq!(err, Exception::type_error("1 is not a function"));
    }

    #[test]
    fn test_error_constructor_call_and_construct() {
        let mut vm = Vm::new(VmOptions::default());
        let ctor = vm
            .heap
            .get(vm.realm.global_object, &"TypeError".into())
            .unwrap();
        let error = vm.construct(&ctor, &[Value::from("bad")]).unwrap();
        assert_eq!(vm.display(&error), "TypeError: bad");
        let error = vm.call(&ctor, &Value::Undefined, &[]).unwrap();
        assert_eq!(vm.display(&error), "TypeError");
        assert!(vm.instance_of(&error, &ctor).unwrap());
    }

    #[test]
    fn test_stack_overflow_materializes_as_internal_error() {
        let mut vm = Vm::new(VmOptions::default());
        let thrown = vm.materialize(Exception::StackOverflow);
        assert_eq!(vm.display(&thrown.value), "InternalError: too much recursion");
        assert!(matches!(
            vm.uncaught(Exception::StackOverflow),
            crate::Error::StackOverflow
        ));
    }

    #[test]
    fn test_native_calls_count_towards_depth() {
        let mut vm = Vm::new(VmOptions {
            max_call_depth: 0,
            ..VmOptions::default()
        });
        let print = vm.heap.get(vm.realm.global_object, &"print".into()).unwrap();
        assert_eq!(
            vm.call(&print, &Value::Undefined, &[]),
            Err(Exception::StackOverflow)
        );
    }
}
