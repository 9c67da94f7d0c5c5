//! Generator objects and async function activations.
//!
//! Both run a resumable frame: the body starts with `ResumeDispatch`, and
//! every `Suspend` hands the frame back here. A generator keeps its frame in
//! the generator object; an async function keeps it in an activation object
//! that a promise reaction resumes.

use tracing::debug;

use super::frame::{Frame, Resumption};
use super::{FrameExit, Vm};
use crate::gc::ObjectRef;
use crate::runtime::exception::{ErrorKind, Exception, JsResult};
use crate::runtime::object::{
    AsyncActivation, Closure, GeneratorState, Object, ObjectKind, Reaction,
};
use crate::runtime::value::Value;

/// Calls a generator function: runs the prologue up to the initial suspend
/// and wraps the frame in a generator object.
pub(crate) fn start_generator(
    vm: &mut Vm,
    callee: ObjectRef,
    closure: &Closure,
    this: Value,
    args: Vec<Value>,
) -> JsResult<Value> {
    vm.enter()?;
    let mut frame = vm.new_frame(callee, closure, this, args);
    let result = vm.run_frame(&mut frame);
    vm.leave();
    if !matches!(result?, FrameExit::Yield(_)) {
        return Err(Exception::error(
            ErrorKind::InternalError,
            "generator prologue did not suspend",
        ));
    }

    let prototype = vm
        .heap
        .get(callee, &"prototype".into())
        .and_then(|p| p.as_object())
        .unwrap_or(vm.realm.generator_prototype);
    let generator = vm.heap.alloc(Object::new(
        Some(prototype),
        ObjectKind::Generator(GeneratorState::SuspendedStart(Box::new(frame))),
    ));
    Ok(Value::Object(generator))
}

fn set_state(vm: &mut Vm, generator: ObjectRef, state: GeneratorState) {
    if let ObjectKind::Generator(slot) = &mut vm.heap.object_mut(generator).kind {
        *slot = state;
    }
}

/// GeneratorResume and GeneratorResumeAbrupt.
pub fn resume_generator(vm: &mut Vm, this: &Value, resumption: Resumption) -> JsResult<Value> {
    let generator = this
        .as_object()
        .filter(|r| matches!(vm.heap.object(*r).kind, ObjectKind::Generator(_)))
        .ok_or_else(|| Exception::type_error("not a generator object"))?;
    vm.enter()?;
    let result = resume(vm, generator, resumption);
    vm.leave();
    result
}

fn resume(vm: &mut Vm, generator: ObjectRef, resumption: Resumption) -> JsResult<Value> {
    let state = match &mut vm.heap.object_mut(generator).kind {
        ObjectKind::Generator(state) => std::mem::replace(state, GeneratorState::Executing),
        _ => return Err(Exception::type_error("not a generator object")),
    };

    let mut frame = match state {
        GeneratorState::Executing => {
            return Err(Exception::type_error("Generator is already running"));
        }
        GeneratorState::SuspendedStart(_) if !matches!(resumption, Resumption::Next(_)) => {
            set_state(vm, generator, GeneratorState::Completed);
            return finish_completed(vm, resumption);
        }
        GeneratorState::Completed => {
            set_state(vm, generator, GeneratorState::Completed);
            return finish_completed(vm, resumption);
        }
        GeneratorState::SuspendedStart(frame) | GeneratorState::SuspendedYield(frame) => frame,
    };
    frame.resumption = Some(resumption);
    frame.ip = 0;

    debug!(state = frame.resume_state, "resuming generator");
    let outcome = vm.run_frame(&mut frame);
    let (state, result) = match outcome {
        Ok(FrameExit::Yield(v)) => (GeneratorState::SuspendedYield(frame), Ok(v)),
        Ok(FrameExit::Return(v)) => (
            GeneratorState::Completed,
            Ok(vm.create_iter_result(v, true)),
        ),
        Ok(FrameExit::TailCall { .. }) => (
            GeneratorState::Completed,
            Err(Exception::error(
                ErrorKind::InternalError,
                "tail call from a generator body",
            )),
        ),
        Err(exception) => (GeneratorState::Completed, Err(exception)),
    };
    set_state(vm, generator, state);
    result
}

fn finish_completed(vm: &mut Vm, resumption: Resumption) -> JsResult<Value> {
    match resumption {
        Resumption::Next(_) => Ok(vm.create_iter_result(Value::Undefined, true)),
        Resumption::Return(v) => Ok(vm.create_iter_result(v, true)),
        Resumption::Throw(v) => Err(Exception::throw(v)),
    }
}

fn arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

/// `Generator.prototype.next(v)`
pub fn generator_next(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    resume_generator(vm, this, Resumption::Next(arg(args)))
}

/// `Generator.prototype.throw(e)`
pub fn generator_throw(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    resume_generator(vm, this, Resumption::Throw(arg(args)))
}

/// `Generator.prototype.return(v)`
pub fn generator_return(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    resume_generator(vm, this, Resumption::Return(arg(args)))
}

/// Calls an async function: runs the body up to its first `await` and
/// returns the promise for its completion.
pub(crate) fn start_async(
    vm: &mut Vm,
    callee: ObjectRef,
    closure: &Closure,
    this: Value,
    args: Vec<Value>,
) -> JsResult<Value> {
    let promise = vm.new_promise();
    let frame = vm.new_frame(callee, closure, this, args);
    let activation = vm.heap.alloc(Object::new(
        None,
        ObjectKind::AsyncActivation(AsyncActivation {
            frame: Some(Box::new(frame)),
            promise,
        }),
    ));
    resume_async(vm, activation, None)?;
    Ok(Value::Object(promise))
}

/// Runs an async activation until it awaits again or settles its promise.
///
/// `resumption` is `None` for the first run and the settlement of the
/// awaited promise afterwards.
pub fn resume_async(
    vm: &mut Vm,
    activation: ObjectRef,
    resumption: Option<Resumption>,
) -> JsResult<()> {
    let (frame, promise) = match &mut vm.heap.object_mut(activation).kind {
        ObjectKind::AsyncActivation(state) => (state.frame.take(), state.promise),
        _ => {
            return Err(Exception::error(
                ErrorKind::InternalError,
                "resumed object is not an async activation",
            ));
        }
    };
    let Some(mut frame): Option<Box<Frame>> = frame else {
        return Err(Exception::error(
            ErrorKind::InternalError,
            "async activation resumed while running",
        ));
    };
    if let Some(resumption) = resumption {
        frame.resumption = Some(resumption);
        frame.ip = 0;
    }

    if let Err(exception) = vm.enter() {
        let thrown = vm.materialize(exception);
        vm.reject_promise(promise, thrown.value);
        return Ok(());
    }
    let outcome = vm.run_frame(&mut frame);
    vm.leave();

    match outcome {
        Ok(FrameExit::Yield(awaited)) => {
            if let ObjectKind::AsyncActivation(state) = &mut vm.heap.object_mut(activation).kind {
                state.frame = Some(frame);
            }
            let Some(awaited) = awaited.as_object() else {
                return Err(Exception::error(
                    ErrorKind::InternalError,
                    "await suspended without a promise",
                ));
            };
            vm.add_reaction(awaited, Reaction::Resume { activation });
        }
        Ok(FrameExit::Return(value)) => vm.resolve_promise(promise, value),
        Ok(FrameExit::TailCall { callee, this, args }) => {
            match vm.call(&callee, &this, &args) {
                Ok(value) => vm.resolve_promise(promise, value),
                Err(exception) => {
                    let thrown = vm.materialize(exception);
                    vm.reject_promise(promise, thrown.value);
                }
            }
        }
        Err(exception) => {
            debug!("async function rejected");
            let thrown = vm.materialize(exception);
            vm.reject_promise(promise, thrown.value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compiler::bytecode::{
        Bytecode, Constant, FunctionKind, FunctionTemplate, Instruction, OpCode, Operand,
    };
    use crate::config::VmOptions;
    use crate::runtime::object::PromiseState;

    fn closure(vm: &mut Vm, kind: FunctionKind, mut code: Bytecode) -> Value {
        code.resolve_labels().unwrap();
        let template = Arc::new(FunctionTemplate {
            name: Arc::from("g"),
            kind,
            param_count: 0,
            strict: true,
            bytecode: code,
        });
        let env = vm.realm.global_env;
        Value::Object(vm.create_closure(template, env, None))
    }

    fn suspend(code: &mut Bytecode) {
        let resume = code.new_label();
        let state = code.add_resume_point(resume);
        code.emit(Instruction::with_operand(OpCode::Suspend, Operand::State(state)));
        code.place_label(resume);
    }

    fn field(vm: &mut Vm, object: &Value, key: &str) -> Value {
        vm.get_property(object, &key.into()).unwrap()
    }

    /// `function* g() { const x = yield 1; return x; }`, hand assembled.
    fn echo_generator(vm: &mut Vm) -> Value {
        let mut code = Bytecode::new();
        code.emit(Instruction::simple(OpCode::ResumeDispatch));
        code.emit(Instruction::simple(OpCode::Undefined));
        suspend(&mut code);
        code.emit(Instruction::simple(OpCode::ResumeValue));
        code.emit(Instruction::simple(OpCode::Pop));
        let one = code.add_constant(Constant::Number(1.0));
        code.emit(Instruction::with_operand(OpCode::Const, Operand::Constant(one)));
        code.emit(Instruction::with_operand(OpCode::CreateIterResult, Operand::Flag(false)));
        suspend(&mut code);
        code.emit(Instruction::simple(OpCode::ThrowAfterResume));
        code.emit(Instruction::simple(OpCode::ResumeValue));
        code.emit(Instruction::simple(OpCode::Return));
        let g = closure(vm, FunctionKind::Generator, code);
        vm.call(&g, &Value::Undefined, &[]).unwrap()
    }

    #[test]
    fn test_generator_runs_to_completion() {
        let mut vm = Vm::new(VmOptions::default());
        let generator = echo_generator(&mut vm);

        let first = generator_next(&mut vm, &generator, &[]).unwrap();
        assert_eq!(field(&mut vm, &first, "value"), Value::Number(1.0));
        assert_eq!(field(&mut vm, &first, "done"), Value::Boolean(false));

        let second = generator_next(&mut vm, &generator, &[Value::from("sent")]).unwrap();
        assert_eq!(field(&mut vm, &second, "value"), Value::from("sent"));
        assert_eq!(field(&mut vm, &second, "done"), Value::Boolean(true));

        let after = generator_next(&mut vm, &generator, &[]).unwrap();
        assert_eq!(field(&mut vm, &after, "value"), Value::Undefined);
        assert_eq!(field(&mut vm, &after, "done"), Value::Boolean(true));
    }

    #[test]
    fn test_abrupt_resumption_before_start_completes() {
        let mut vm = Vm::new(VmOptions::default());
        let generator = echo_generator(&mut vm);
        let result = generator_return(&mut vm, &generator, &[Value::Number(9.0)]).unwrap();
        assert_eq!(field(&mut vm, &result, "value"), Value::Number(9.0));
        assert_eq!(field(&mut vm, &result, "done"), Value::Boolean(true));

        let generator = echo_generator(&mut vm);
        let err = generator_throw(&mut vm, &generator, &[Value::from("x")]).unwrap_err();
        assert_eq!(err, Exception::throw(Value::from("x")));
        let after = generator_next(&mut vm, &generator, &[]).unwrap();
        assert_eq!(field(&mut vm, &after, "done"), Value::Boolean(true));
    }

    #[test]
    fn test_throw_at_yield_propagates_and_completes() {
        let mut vm = Vm::new(VmOptions::default());
        let generator = echo_generator(&mut vm);
        generator_next(&mut vm, &generator, &[]).unwrap();
        let err = generator_throw(&mut vm, &generator, &[Value::Number(3.0)]).unwrap_err();
        assert_eq!(err, Exception::throw(Value::Number(3.0)));
        let after = generator_next(&mut vm, &generator, &[]).unwrap();
        assert_eq!(field(&mut vm, &after, "done"), Value::Boolean(true));
    }

    #[test]
    fn test_async_function_settles_after_jobs_run() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        code.emit(Instruction::simple(OpCode::ResumeDispatch));
        let five = code.add_constant(Constant::Number(5.0));
        code.emit(Instruction::with_operand(OpCode::Const, Operand::Constant(five)));
        code.emit(Instruction::simple(OpCode::Await));
        suspend(&mut code);
        code.emit(Instruction::simple(OpCode::ThrowAfterResume));
        code.emit(Instruction::simple(OpCode::ResumeValue));
        code.emit(Instruction::simple(OpCode::Return));
        let f = closure(&mut vm, FunctionKind::Async, code);

        let promise = vm.call(&f, &Value::Undefined, &[]).unwrap();
        assert!(matches!(vm.promise_state(&promise), Some(PromiseState::Pending(_))));
        vm.run_jobs().unwrap();
        assert!(matches!(
            vm.promise_state(&promise),
            Some(PromiseState::Fulfilled(Value::Number(n))) if *n == 5.0
        ));
    }
}
