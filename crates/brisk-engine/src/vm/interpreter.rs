//! The instruction loop.
//!
//! [`Vm::run_frame`] executes one activation until it returns, suspends or
//! makes a tail call. Exceptions raised by an instruction are routed through
//! the unit's handler table by [`Vm::unwind`]; handlers are listed innermost
//! first, so the first catching handler that covers the faulting instruction
//! wins, and the non-catching handlers before it run their side effects on
//! the way out.

use std::sync::Arc;

use tracing::trace;

use super::frame::{Frame, Register, Resumption};
use super::{FrameExit, Vm};
use crate::compiler::bytecode::{Constant, FunctionTemplate, HandlerKind, Instruction, OpCode, Operand};
use crate::runtime::abstract_ops::{PreferredType, to_int32, to_uint32};
use crate::runtime::environment::{Environment, ObjectEnv};
use crate::runtime::exception::{ErrorKind, Exception, JsResult};
use crate::runtime::object::{Object, ObjectKind, PropertyKey};
use crate::runtime::value::{Value, strict_equals};

fn bad_operand(instruction: &Instruction) -> Exception {
    Exception::error(
        ErrorKind::InternalError,
        format!("bad operand for {:?}", instruction.opcode),
    )
}

fn jump(instruction: &Instruction) -> JsResult<usize> {
    match instruction.operand {
        Some(Operand::Jump(target)) => Ok(target),
        _ => Err(bad_operand(instruction)),
    }
}

fn register(instruction: &Instruction) -> JsResult<u32> {
    match instruction.operand {
        Some(Operand::Register(r)) => Ok(r),
        _ => Err(bad_operand(instruction)),
    }
}

fn count(instruction: &Instruction) -> JsResult<usize> {
    match instruction.operand {
        Some(Operand::Count(n) | Operand::ArgCount(n)) => Ok(n as usize),
        _ => Err(bad_operand(instruction)),
    }
}

fn name<'a>(code: &'a FunctionTemplate, instruction: &Instruction) -> JsResult<&'a str> {
    match instruction.operand {
        Some(Operand::Name(n) | Operand::Binding { name: n, .. }) => Ok(code.bytecode.name(n)),
        _ => Err(bad_operand(instruction)),
    }
}

fn binding<'a>(code: &'a FunctionTemplate, instruction: &Instruction) -> JsResult<(&'a str, bool)> {
    match instruction.operand {
        Some(Operand::Binding { name, flag }) => Ok((code.bytecode.name(name), flag)),
        _ => Err(bad_operand(instruction)),
    }
}

fn slot(instruction: &Instruction) -> JsResult<(u32, u32)> {
    match instruction.operand {
        Some(Operand::Slot { hops, slot }) => Ok((hops, slot)),
        _ => Err(bad_operand(instruction)),
    }
}

/// `base ** exponent` with the IEEE corner cases `Math.pow` differs on.
fn exponentiate(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Native stack left before an activation spills onto a fresh segment.
const STACK_RED_ZONE: usize = 256 * 1024;

/// Size of each segment allocated once the red zone is reached.
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

impl Vm {
    /// Runs `frame` from its current instruction.
    ///
    /// Every nested activation passes through here; the native stack grows
    /// onto a heap segment once less than the red zone remains.
    pub(crate) fn run_frame(&mut self, frame: &mut Frame) -> JsResult<FrameExit> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.execute(frame))
    }

    fn execute(&mut self, frame: &mut Frame) -> JsResult<FrameExit> {
        let code = frame.code.clone();
        loop {
            let pc = frame.ip;
            let Some(instruction) = code.bytecode.instructions.get(pc) else {
                return Ok(FrameExit::Return(Value::Undefined));
            };
            frame.ip += 1;

            let result = if frame.stack.len() > self.options.max_stack_size {
                Err(Exception::error(
                    ErrorKind::RangeError,
                    "Maximum operand stack size exceeded",
                ))
            } else {
                self.step(frame, &code, instruction)
            };
            match result {
                Ok(None) => {}
                Ok(Some(exit)) => return Ok(exit),
                Err(exception) => self.unwind(frame, &code, pc, exception)?,
            }
        }
    }

    /// Routes an exception raised at `pc` through the handler table.
    ///
    /// Returns `Ok` when a catching handler took over, leaving the frame
    /// positioned at its entry point.
    fn unwind(
        &mut self,
        frame: &mut Frame,
        code: &FunctionTemplate,
        pc: usize,
        exception: Exception,
    ) -> JsResult<()> {
        let mut handlers = code.bytecode.handlers.iter().filter(|h| h.covers(pc)).peekable();
        if handlers.peek().is_none() {
            return Err(exception);
        }

        let mut thrown = self.materialize(exception);
        for handler in handlers {
            match handler.kind {
                HandlerKind::Catch => {
                    trace!(pc, target = handler.target, "exception caught");
                    frame.stack.clear();
                    let value = self.attach_suppressed(thrown);
                    frame.push(value);
                    frame.ip = handler.target;
                    return Ok(());
                }
                HandlerKind::Finally { register } => {
                    trace!(pc, target = handler.target, "exception pending across finally");
                    frame.stack.clear();
                    *frame.register(register)? = Register::Thrown(thrown);
                    frame.ip = handler.target;
                    return Ok(());
                }
                HandlerKind::Suppress { register } => {
                    if let Register::Thrown(pending) = std::mem::take(frame.register(register)?) {
                        if !strict_equals(&pending.value, &thrown.value) {
                            thrown.suppressed.push(pending.value);
                            thrown.suppressed.extend(pending.suppressed);
                        }
                    }
                }
                HandlerKind::IterClose { register } => {
                    let iterator = frame.register_value(register);
                    // The original exception wins over anything `return` throws.
                    let _ = self.iterator_close(&iterator);
                }
            }
        }
        Err(Exception::Thrown(thrown))
    }

    fn step(
        &mut self,
        frame: &mut Frame,
        code: &Arc<FunctionTemplate>,
        instruction: &Instruction,
    ) -> JsResult<Option<FrameExit>> {
        let strict = code.strict;
        match instruction.opcode {
            // Stack
            OpCode::Pop => {
                frame.pop()?;
            }
            OpCode::Dup => {
                let v = frame.peek()?.clone();
                frame.push(v);
            }
            OpCode::Dup2 => {
                let pair = frame.pop_n(2)?;
                frame.stack.extend(pair.iter().cloned());
                frame.stack.extend(pair);
            }
            OpCode::Swap => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b);
                frame.push(a);
            }
            OpCode::Rot3 => {
                let mut top = frame.pop_n(3)?;
                top.rotate_right(1);
                frame.stack.extend(top);
            }
            OpCode::Rot4 => {
                let mut top = frame.pop_n(4)?;
                top.rotate_right(1);
                frame.stack.extend(top);
            }
            OpCode::ClearStack => frame.stack.clear(),
            OpCode::Const => {
                let index = match instruction.operand {
                    Some(Operand::Constant(index)) => index as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                let value = match code.bytecode.constants.get(index) {
                    Some(Constant::Number(n)) => Value::Number(*n),
                    Some(Constant::String(s)) => Value::String(s.clone()),
                    None => return Err(bad_operand(instruction)),
                };
                frame.push(value);
            }
            OpCode::Undefined => frame.push(Value::Undefined),
            OpCode::Null => frame.push(Value::Null),
            OpCode::True => frame.push(true),
            OpCode::False => frame.push(false),
            OpCode::LoadReg => {
                let v = frame.register_value(register(instruction)?);
                frame.push(v);
            }
            OpCode::StoreReg => {
                let v = frame.pop()?;
                *frame.register(register(instruction)?)? = Register::Value(v);
            }

            // Environments
            OpCode::PushBlockEnv => {
                frame.env = self.heap.alloc_env(Environment::declarative(Some(frame.env)));
            }
            OpCode::PopEnv => {
                frame.env = self.heap.env(frame.env).parent().ok_or_else(|| {
                    Exception::error(ErrorKind::InternalError, "popped the outermost environment")
                })?;
            }
            OpCode::CopyEnv => frame.env = self.heap.copy_env(frame.env),
            OpCode::SaveEnv => {
                let env = frame.env;
                *frame.register(register(instruction)?)? = Register::Env(env);
            }
            OpCode::RestoreEnv => {
                let saved = match frame.register(register(instruction)?)? {
                    Register::Env(env) => *env,
                    _ => return Err(bad_operand(instruction)),
                };
                frame.env = saved;
            }
            OpCode::PushWithEnv => {
                let v = frame.pop()?;
                let object = self.to_object(&v)?;
                frame.env = self.heap.alloc_env(Environment::Object(ObjectEnv {
                    parent: Some(frame.env),
                    object,
                }));
            }
            OpCode::CreateMutableBinding => {
                let (name, deletable) = binding(code, instruction)?;
                self.heap.create_mutable_binding(frame.env, name, deletable);
            }
            OpCode::CreateImmutableBinding => {
                let (name, strict) = binding(code, instruction)?;
                self.heap.create_immutable_binding(frame.env, name, strict);
            }
            OpCode::InitializeBinding => {
                let (hops, slot) = slot(instruction)?;
                let v = frame.pop()?;
                self.heap.initialize_slot(frame.env, hops, slot, v)?;
            }

            // Variables
            OpCode::GetSlot => {
                let (hops, slot) = slot(instruction)?;
                let v = self.heap.get_slot_unchecked(frame.env, hops, slot)?;
                frame.push(v);
            }
            OpCode::GetSlotChecked => {
                let (hops, slot) = slot(instruction)?;
                let v = self.heap.get_slot(frame.env, hops, slot)?;
                frame.push(v);
            }
            OpCode::SetSlot => {
                let (hops, slot) = slot(instruction)?;
                let v = frame.pop()?;
                self.heap.set_slot(frame.env, hops, slot, v, strict)?;
            }
            OpCode::GetName => {
                let name = name(code, instruction)?;
                let env = self
                    .heap
                    .resolve_binding(frame.env, name)
                    .ok_or_else(|| Exception::not_defined(name))?;
                let v = self.heap.get_binding_value(env, name, true)?;
                frame.push(v);
            }
            OpCode::GetNameWithThis => {
                let name = name(code, instruction)?;
                let env = self
                    .heap
                    .resolve_binding(frame.env, name)
                    .ok_or_else(|| Exception::not_defined(name))?;
                let f = self.heap.get_binding_value(env, name, true)?;
                let this = self
                    .heap
                    .with_base_object(env)
                    .map_or(Value::Undefined, Value::Object);
                frame.push(f);
                frame.push(this);
            }
            OpCode::SetName => {
                let (name, strict) = binding(code, instruction)?;
                let v = frame.pop()?;
                match self.heap.resolve_binding(frame.env, name) {
                    Some(env) => self.heap.set_mutable_binding(env, name, v, strict)?,
                    None if strict => return Err(Exception::not_defined(name)),
                    None => {
                        let global = self.realm.global_env;
                        self.heap.set_mutable_binding(global, name, v, false)?;
                    }
                }
            }
            OpCode::DeleteName => {
                let name = name(code, instruction)?;
                let deleted = match self.heap.resolve_binding(frame.env, name) {
                    Some(env) => self.heap.delete_binding(env, name),
                    None => true,
                };
                frame.push(deleted);
            }
            OpCode::TypeofName => {
                let name = name(code, instruction)?;
                let tag = match self.heap.resolve_binding(frame.env, name) {
                    Some(env) => {
                        let v = self.heap.get_binding_value(env, name, true)?;
                        self.type_of(&v)
                    }
                    None => "undefined",
                };
                frame.push(tag);
            }
            OpCode::GetGlobal => {
                let name = name(code, instruction)?;
                let v = self
                    .heap
                    .get_binding_value(self.realm.global_env, name, true)?;
                frame.push(v);
            }
            OpCode::SetGlobal => {
                let (name, strict) = binding(code, instruction)?;
                let v = frame.pop()?;
                let global = self.realm.global_env;
                self.heap.set_mutable_binding(global, name, v, strict)?;
            }
            OpCode::InitGlobal => {
                let name = name(code, instruction)?;
                let v = frame.pop()?;
                let global = self.realm.global_env;
                self.heap.initialize_binding(global, name, v)?;
            }
            OpCode::TypeofGlobal => {
                let name = name(code, instruction)?;
                let global = self.realm.global_env;
                let tag = if self.heap.has_binding(global, name) {
                    let v = self.heap.get_binding_value(global, name, true)?;
                    self.type_of(&v)
                } else {
                    "undefined"
                };
                frame.push(tag);
            }

            // Global declaration instantiation
            OpCode::CheckGlobalLexical => {
                let name = name(code, instruction)?;
                let global = self.realm.global_env;
                if self.heap.has_var_declaration(global, name)?
                    || self.heap.has_lexical_declaration(global, name)?
                    || self.heap.has_restricted_global_property(global, name)?
                {
                    return Err(already_declared(name));
                }
            }
            OpCode::CheckGlobalVar => {
                let name = name(code, instruction)?;
                if self.heap.has_lexical_declaration(self.realm.global_env, name)? {
                    return Err(already_declared(name));
                }
            }
            OpCode::CheckGlobalFunction => {
                let name = name(code, instruction)?;
                if !self.heap.can_declare_global_function(self.realm.global_env, name)? {
                    return Err(Exception::type_error(format!(
                        "Cannot declare global function '{name}'"
                    )));
                }
            }
            OpCode::CheckGlobalVarDeclarable => {
                let name = name(code, instruction)?;
                if !self.heap.can_declare_global_var(self.realm.global_env, name)? {
                    return Err(Exception::type_error(format!(
                        "Cannot declare global variable '{name}'"
                    )));
                }
            }
            OpCode::CreateGlobalFunction => {
                let (name, deletable) = binding(code, instruction)?;
                let f = frame.pop()?;
                let global = self.realm.global_env;
                self.heap
                    .create_global_function_binding(global, name, f, deletable)?;
            }
            OpCode::CreateGlobalVar => {
                let (name, deletable) = binding(code, instruction)?;
                let global = self.realm.global_env;
                self.heap.create_global_var_binding(global, name, deletable)?;
            }
            OpCode::CreateGlobalLexical => {
                let (name, is_const) = binding(code, instruction)?;
                let global = self.realm.global_env;
                if is_const {
                    self.heap.create_immutable_binding(global, name, true);
                } else {
                    self.heap.create_mutable_binding(global, name, false);
                }
            }

            // Functions
            OpCode::LoadImport => {
                let v = frame.imports.get(count(instruction)?).cloned().unwrap_or_default();
                frame.push(v);
            }
            OpCode::CallUnit => {
                let unit = match instruction.operand {
                    Some(Operand::Unit(unit)) => unit as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                let entry = *code
                    .bytecode
                    .units
                    .get(unit)
                    .ok_or_else(|| bad_operand(instruction))?;
                frame.unit_returns.push(frame.ip);
                frame.ip = entry;
            }
            OpCode::ReturnUnit => {
                frame.ip = frame.unit_returns.pop().ok_or_else(|| {
                    Exception::error(ErrorKind::InternalError, "unit return without a call")
                })?;
            }
            OpCode::Closure => {
                let index = match instruction.operand {
                    Some(Operand::Function(index)) => index as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                let template = code
                    .bytecode
                    .functions
                    .get(index)
                    .cloned()
                    .ok_or_else(|| bad_operand(instruction))?;
                let this = template
                    .kind
                    .is_arrow()
                    .then(|| frame.this_value.clone());
                let closure = self.create_closure(template, frame.env, this);
                frame.push(closure);
            }
            OpCode::LoadArg => {
                let v = frame.arguments.get(count(instruction)?).cloned().unwrap_or_default();
                frame.push(v);
            }
            OpCode::LoadCallee => {
                let callee = frame.callee.map_or(Value::Undefined, Value::Object);
                frame.push(callee);
            }
            OpCode::CreateArguments => {
                let arguments = self.heap.alloc(Object::new(
                    Some(self.realm.object_prototype),
                    ObjectKind::Array(frame.arguments.clone()),
                ));
                let values = Value::Object(self.realm.array_values);
                self.heap
                    .define_hidden(arguments, self.realm.iterator_symbol, values);
                frame.push(arguments);
            }
            OpCode::This => {
                let this = frame.this_value.clone();
                frame.push(this);
            }
            OpCode::Call => {
                let args = frame.pop_n(count(instruction)?)?;
                let this = frame.pop()?;
                let f = frame.pop()?;
                let result = self.call(&f, &this, &args)?;
                frame.push(result);
            }
            OpCode::TailCall => {
                let args = frame.pop_n(count(instruction)?)?;
                let this = frame.pop()?;
                let callee = frame.pop()?;
                return Ok(Some(FrameExit::TailCall { callee, this, args }));
            }
            OpCode::New => {
                let args = frame.pop_n(count(instruction)?)?;
                let f = frame.pop()?;
                let result = self.construct(&f, &args)?;
                frame.push(result);
            }
            OpCode::Return => {
                let v = frame.stack.pop().unwrap_or_default();
                return Ok(Some(FrameExit::Return(v)));
            }

            // Properties
            OpCode::GetProp => {
                let key = PropertyKey::from(name(code, instruction)?);
                let object = frame.pop()?;
                let v = self.get_property(&object, &key)?;
                frame.push(v);
            }
            OpCode::GetElem => {
                let key = frame.pop()?;
                let object = frame.pop()?;
                let key = self.element_key(&object, &key, "read")?;
                let v = self.get_property(&object, &key)?;
                frame.push(v);
            }
            OpCode::SetProp => {
                let key = PropertyKey::from(name(code, instruction)?);
                let v = frame.pop()?;
                let object = frame.pop()?;
                self.put_property(&object, key, v.clone(), strict)?;
                frame.push(v);
            }
            OpCode::SetElem => {
                let v = frame.pop()?;
                let key = frame.pop()?;
                let object = frame.pop()?;
                let key = self.element_key(&object, &key, "set")?;
                self.put_property(&object, key, v.clone(), strict)?;
                frame.push(v);
            }
            OpCode::DeleteProp => {
                let key = PropertyKey::from(name(code, instruction)?);
                let object = frame.pop()?;
                let deleted = self.delete_property(&object, &key, strict)?;
                frame.push(deleted);
            }
            OpCode::DeleteElem => {
                let key = frame.pop()?;
                let object = frame.pop()?;
                let key = self.element_key(&object, &key, "delete")?;
                let deleted = self.delete_property(&object, &key, strict)?;
                frame.push(deleted);
            }
            OpCode::NewObject => {
                let object = self
                    .heap
                    .alloc(Object::ordinary(Some(self.realm.object_prototype)));
                frame.push(object);
            }
            OpCode::DefineField => {
                let key = PropertyKey::from(name(code, instruction)?);
                let v = frame.pop()?;
                let object = self.target_object(frame.peek()?)?;
                self.define_property_or_throw(object, key, v)?;
            }
            OpCode::DefineComputed => {
                let v = frame.pop()?;
                let key = frame.pop()?;
                let key = self.to_property_key(&key)?;
                let object = self.target_object(frame.peek()?)?;
                self.define_property_or_throw(object, key, v)?;
            }
            OpCode::NewArray => {
                let elements = frame.pop_n(count(instruction)?)?;
                let array = self.heap.alloc(Object::new(
                    Some(self.realm.array_prototype),
                    ObjectKind::Array(elements),
                ));
                frame.push(array);
            }

            // Operators
            OpCode::Add => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let a = self.to_primitive(&a, PreferredType::Default)?;
                let b = self.to_primitive(&b, PreferredType::Default)?;
                let v = if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                    let a = self.to_js_string(&a)?;
                    let b = self.to_js_string(&b)?;
                    Value::from(format!("{a}{b}"))
                } else {
                    Value::Number(self.to_number(&a)? + self.to_number(&b)?)
                };
                frame.push(v);
            }
            OpCode::Concat => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let a = self.to_js_string(&a)?;
                let b = self.to_js_string(&b)?;
                frame.push(format!("{a}{b}"));
            }
            OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Exp
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::UShr => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let a = self.to_number(&a)?;
                let b = self.to_number(&b)?;
                frame.push(numeric(instruction.opcode, a, b));
            }
            OpCode::Neg => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(-n);
            }
            OpCode::BitNot => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(f64::from(!to_int32(n)));
            }
            OpCode::Not => {
                let v = frame.pop()?;
                frame.push(!v.to_boolean());
            }
            OpCode::Inc | OpCode::Dec => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(if instruction.opcode == OpCode::Inc { n + 1.0 } else { n - 1.0 });
            }
            OpCode::Lt => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let r = self.less_than(&a, &b, true)?;
                frame.push(r == Some(true));
            }
            OpCode::Gt => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let r = self.less_than(&b, &a, false)?;
                frame.push(r == Some(true));
            }
            OpCode::Le => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let r = self.less_than(&b, &a, false)?;
                frame.push(r == Some(false));
            }
            OpCode::Ge => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let r = self.less_than(&a, &b, true)?;
                frame.push(r == Some(false));
            }
            OpCode::Eq | OpCode::Ne => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let equal = self.loose_equals(&a, &b)?;
                frame.push(equal == (instruction.opcode == OpCode::Eq));
            }
            OpCode::StrictEq | OpCode::StrictNe => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let equal = strict_equals(&a, &b);
                frame.push(equal == (instruction.opcode == OpCode::StrictEq));
            }
            OpCode::InstanceOf => {
                let target = frame.pop()?;
                let v = frame.pop()?;
                let r = self.instance_of(&v, &target)?;
                frame.push(r);
            }
            OpCode::In => {
                let object = frame.pop()?;
                let key = frame.pop()?;
                let r = self.has_property_value(&object, &key)?;
                frame.push(r);
            }
            OpCode::Typeof => {
                let v = frame.pop()?;
                frame.push(self.type_of(&v));
            }
            OpCode::IsNullish => {
                let v = frame.pop()?;
                frame.push(v.is_nullish());
            }

            // Coercions
            OpCode::ToBoolean => {
                let v = frame.pop()?;
                frame.push(v.to_boolean());
            }
            OpCode::ToNumber => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(n);
            }
            OpCode::ToInt32 => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(f64::from(to_int32(n)));
            }
            OpCode::ToUint32 => {
                let v = frame.pop()?;
                let n = self.to_number(&v)?;
                frame.push(f64::from(to_uint32(n)));
            }
            OpCode::ToString => {
                let v = frame.pop()?;
                let s = self.to_js_string(&v)?;
                frame.push(Value::String(s));
            }
            OpCode::ToObject => {
                let v = frame.pop()?;
                let object = self.to_object(&v)?;
                frame.push(object);
            }
            OpCode::ToPropertyKey => {
                let v = frame.pop()?;
                let key = match self.to_property_key(&v)? {
                    PropertyKey::String(s) => Value::String(s),
                    PropertyKey::Symbol(id) => Value::Symbol(id),
                };
                frame.push(key);
            }
            OpCode::ToPrimitive => {
                let v = frame.pop()?;
                let p = self.to_primitive(&v, PreferredType::Default)?;
                frame.push(p);
            }

            // Control flow
            OpCode::Jump => frame.ip = jump(instruction)?,
            OpCode::JumpIfTrue => {
                let target = jump(instruction)?;
                if frame.pop()?.to_boolean() {
                    frame.ip = target;
                }
            }
            OpCode::JumpIfFalse => {
                let target = jump(instruction)?;
                if !frame.pop()?.to_boolean() {
                    frame.ip = target;
                }
            }
            OpCode::SwitchTable => {
                let table = match instruction.operand {
                    Some(Operand::Table(t)) => code.bytecode.switch_tables.get(t as usize),
                    _ => None,
                }
                .ok_or_else(|| bad_operand(instruction))?;
                frame.ip = match frame.pop()? {
                    Value::Number(n) => table.number_target(n),
                    Value::String(s) => table.string_target(&s),
                    _ => table.default,
                };
            }
            OpCode::Throw => return Err(Exception::throw(frame.pop()?)),
            OpCode::ThrowError => {
                return match instruction.operand {
                    Some(Operand::Error { kind, message }) => {
                        Err(Exception::error(kind, code.bytecode.name(message)))
                    }
                    _ => Err(bad_operand(instruction)),
                };
            }
            OpCode::Rethrow => {
                return match std::mem::take(frame.register(register(instruction)?)?) {
                    Register::Thrown(thrown) => Err(Exception::Thrown(thrown)),
                    Register::Value(v) => Err(Exception::throw(v)),
                    _ => Err(bad_operand(instruction)),
                };
            }

            // Coroutines
            OpCode::ResumeDispatch => {
                if frame.resumption.is_some() {
                    frame.ip = *code
                        .bytecode
                        .resume_table
                        .get(frame.resume_state as usize)
                        .ok_or_else(|| {
                            Exception::error(ErrorKind::InternalError, "unknown resume state")
                        })?;
                }
            }
            OpCode::Suspend => {
                let state = match instruction.operand {
                    Some(Operand::State(state)) => state,
                    _ => return Err(bad_operand(instruction)),
                };
                let v = frame.pop()?;
                frame.resume_state = state;
                return Ok(Some(FrameExit::Yield(v)));
            }
            OpCode::ThrowAfterResume => {
                if let Some(Resumption::Throw(_)) = frame.resumption {
                    if let Some(resumption) = frame.resumption.take() {
                        return Err(Exception::throw(resumption.into_value()));
                    }
                }
            }
            OpCode::ReturnAfterResume => {
                let target = jump(instruction)?;
                if let Some(Resumption::Return(_)) = frame.resumption {
                    let v = frame.resumption.take().map(Resumption::into_value);
                    frame.push(v.unwrap_or_default());
                    frame.ip = target;
                }
            }
            OpCode::JumpIfResumeThrow => {
                let target = jump(instruction)?;
                if matches!(frame.resumption, Some(Resumption::Throw(_))) {
                    frame.ip = target;
                }
            }
            OpCode::JumpIfResumeReturn => {
                let target = jump(instruction)?;
                if matches!(frame.resumption, Some(Resumption::Return(_))) {
                    frame.ip = target;
                }
            }
            OpCode::ResumeValue => {
                let v = frame.resumption.take().map(Resumption::into_value);
                frame.push(v.unwrap_or_default());
            }
            OpCode::Await => {
                let v = frame.pop()?;
                let promise = self.promise_resolve(v);
                frame.push(promise);
            }
            OpCode::CreateIterResult => {
                let done = matches!(instruction.operand, Some(Operand::Flag(true)));
                let v = frame.pop()?;
                let result = self.create_iter_result(v, done);
                frame.push(result);
            }

            // Iteration
            OpCode::GetIterator => {
                let v = frame.pop()?;
                let iterator = self.get_iterator(&v)?;
                frame.push(iterator);
            }
            OpCode::IteratorNext => {
                let v = frame.pop()?;
                let iterator = frame.pop()?;
                let result = self.iterator_next(&iterator, Some(v))?;
                frame.push(result);
            }
            OpCode::IteratorComplete => {
                let result = frame.pop()?;
                let done = self.iterator_complete(&result)?;
                frame.push(done);
            }
            OpCode::IteratorValue => {
                let result = frame.pop()?;
                let v = self.iterator_value(&result)?;
                frame.push(v);
            }
            OpCode::IteratorClose => {
                let iterator = frame.pop()?;
                self.iterator_close(&iterator)?;
            }
            OpCode::GetMethod => {
                let key = PropertyKey::from(name(code, instruction)?);
                let object = frame.pop()?;
                let method = self.get_method(&object, &key)?;
                frame.push(method);
            }
            OpCode::RequireObject => {
                let v = frame.pop()?;
                let v = self.require_object(v)?;
                frame.push(v);
            }
            OpCode::EnumerateKeys => {
                let v = frame.pop()?;
                let values = if v.is_nullish() {
                    Vec::new()
                } else {
                    let object = self.to_object(&v)?;
                    self.heap.enumerable_keys(object)
                };
                let iterator = self.heap.alloc(Object::new(
                    Some(self.realm.array_iterator_prototype),
                    ObjectKind::ListIterator { values, index: 0 },
                ));
                frame.push(iterator);
            }

            OpCode::Nop => {}
        }
        Ok(None)
    }

    /// Converts an element key after checking the base, in evaluation order.
    fn element_key(&mut self, base: &Value, key: &Value, action: &str) -> JsResult<PropertyKey> {
        if base.is_nullish() {
            return Err(Exception::type_error(format!(
                "Cannot {action} properties of {base} (key '{}')",
                self.describe(key)
            )));
        }
        self.to_property_key(key)
    }

    fn target_object(&self, value: &Value) -> JsResult<crate::gc::ObjectRef> {
        value.as_object().ok_or_else(|| {
            Exception::error(ErrorKind::InternalError, "property definition on a primitive")
        })
    }
}

fn already_declared(name: &str) -> Exception {
    Exception::syntax_error(format!("Identifier '{name}' has already been declared"))
}

fn numeric(opcode: OpCode, a: f64, b: f64) -> Value {
    let shift = || to_uint32(b) & 31;
    Value::Number(match opcode {
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Mod => a % b,
        OpCode::Exp => exponentiate(a, b),
        OpCode::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        OpCode::BitOr => f64::from(to_int32(a) | to_int32(b)),
        OpCode::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        OpCode::Shl => f64::from(to_int32(a).wrapping_shl(shift())),
        OpCode::Shr => f64::from(to_int32(a) >> shift()),
        OpCode::UShr => f64::from(to_uint32(a) >> shift()),
        _ => f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::{Bytecode, FunctionKind, SwitchKey};
    use crate::config::VmOptions;

    fn template(code: Bytecode) -> Arc<FunctionTemplate> {
        Arc::new(FunctionTemplate {
            name: Arc::from(""),
            kind: FunctionKind::Script,
            param_count: 0,
            strict: false,
            bytecode: code,
        })
    }

    fn run(vm: &mut Vm, mut code: Bytecode) -> JsResult<Value> {
        code.resolve_labels()
            .map_err(|e| Exception::error(ErrorKind::InternalError, e.to_string()))?;
        let this = Value::Object(vm.realm.global_object);
        let mut frame = Frame::new(template(code), vm.realm.global_env, this, None, Vec::new());
        match vm.run_frame(&mut frame)? {
            FrameExit::Return(v) => Ok(v),
            other => panic!("unexpected exit {other:?}"),
        }
    }

    fn op(code: &mut Bytecode, opcode: OpCode) {
        code.emit(Instruction::simple(opcode));
    }

    fn op_with(code: &mut Bytecode, opcode: OpCode, operand: Operand) {
        code.emit(Instruction::with_operand(opcode, operand));
    }

    fn constant(code: &mut Bytecode, n: f64) {
        let index = code.add_constant(Constant::Number(n));
        op_with(code, OpCode::Const, Operand::Constant(index));
    }

    #[test]
    fn test_arithmetic_and_stack_shuffles() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        constant(&mut code, 1.0);
        constant(&mut code, 2.0);
        constant(&mut code, 3.0);
        // [1, 2, 3] -> [3, 1, 2]
        op(&mut code, OpCode::Rot3);
        op(&mut code, OpCode::Sub);
        op(&mut code, OpCode::Mul);
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::Number(-3.0));
    }

    #[test]
    fn test_shift_counts_are_masked() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        constant(&mut code, 1.0);
        constant(&mut code, 33.0);
        op(&mut code, OpCode::Shl);
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::Number(2.0));
        assert!(exponentiate(1.0, f64::INFINITY).is_nan());
        assert_eq!(exponentiate(2.0, 10.0), 1024.0);
    }

    #[test]
    fn test_add_concatenates_strings() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        let s = code.add_name("n=");
        op_with(&mut code, OpCode::Const, Operand::Constant(s));
        constant(&mut code, 4.0);
        op(&mut code, OpCode::Add);
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::from("n=4"));
    }

    #[test]
    fn test_catch_handler_receives_error_object() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        let catch = code.new_label();
        let message = code.add_name("boom");
        op_with(
            &mut code,
            OpCode::ThrowError,
            Operand::Error {
                kind: ErrorKind::RangeError,
                message,
            },
        );
        code.add_handler(0, 1, catch, HandlerKind::Catch);
        code.place_label(catch);
        op(&mut code, OpCode::Return);
        let error = run(&mut vm, code).unwrap();
        assert_eq!(vm.display(&error), "RangeError: boom");
    }

    #[test]
    fn test_uncovered_exception_propagates() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        constant(&mut code, 7.0);
        op(&mut code, OpCode::Throw);
        assert_eq!(run(&mut vm, code), Err(Exception::throw(Value::Number(7.0))));
    }

    #[test]
    fn test_exception_from_finally_records_suppressed() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        code.register_count = 1;
        let finally = code.new_label();
        let catch = code.new_label();
        let first = code.add_name("first");
        let second = code.add_name("second");
        op_with(
            &mut code,
            OpCode::ThrowError,
            Operand::Error {
                kind: ErrorKind::TypeError,
                message: first,
            },
        );
        code.add_handler(0, 1, finally, HandlerKind::Finally { register: 0 });
        code.place_label(finally);
        op_with(
            &mut code,
            OpCode::ThrowError,
            Operand::Error {
                kind: ErrorKind::RangeError,
                message: second,
            },
        );
        code.add_handler(1, 2, catch, HandlerKind::Suppress { register: 0 });
        code.add_handler(0, 2, catch, HandlerKind::Catch);
        code.place_label(catch);
        let suppressed = code.add_name("suppressed");
        let length = code.add_name("length");
        op_with(&mut code, OpCode::GetProp, Operand::Name(suppressed));
        op_with(&mut code, OpCode::GetProp, Operand::Name(length));
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_rethrow_of_same_value_is_not_suppressed() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        code.register_count = 1;
        let finally = code.new_label();
        constant(&mut code, 1.0);
        op(&mut code, OpCode::Throw);
        code.add_handler(0, 2, finally, HandlerKind::Finally { register: 0 });
        code.place_label(finally);
        op_with(&mut code, OpCode::Rethrow, Operand::Register(0));
        code.add_handler(2, 3, finally, HandlerKind::Suppress { register: 0 });
        let Err(Exception::Thrown(thrown)) = run(&mut vm, code) else {
            panic!("expected a thrown value");
        };
        assert_eq!(thrown.value, Value::Number(1.0));
        assert!(thrown.suppressed.is_empty());
    }

    #[test]
    fn test_integer_switch_table() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        let one = code.new_label();
        let other = code.new_label();
        let table = code.add_switch_table(vec![(SwitchKey::Int(1), one)], other);
        constant(&mut code, 1.0);
        op_with(&mut code, OpCode::SwitchTable, Operand::Table(table));
        code.place_label(other);
        op(&mut code, OpCode::False);
        op(&mut code, OpCode::Return);
        code.place_label(one);
        op(&mut code, OpCode::True);
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_operand_stack_limit() {
        let mut vm = Vm::new(VmOptions {
            max_stack_size: 4,
            ..VmOptions::default()
        });
        let mut code = Bytecode::new();
        let top = code.new_label();
        code.place_label(top);
        op(&mut code, OpCode::Undefined);
        op_with(&mut code, OpCode::Jump, Operand::Label(top));
        let err = run(&mut vm, code).unwrap_err();
        assert_eq!(
            err,
            Exception::error(ErrorKind::RangeError, "Maximum operand stack size exceeded")
        );
    }

    #[test]
    fn test_unresolvable_names() {
        let mut vm = Vm::new(VmOptions::default());
        let mut code = Bytecode::new();
        let name = code.add_name("nowhere");
        op_with(&mut code, OpCode::TypeofName, Operand::Name(name));
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code).unwrap(), Value::from("undefined"));

        let mut code = Bytecode::new();
        let name = code.add_name("nowhere");
        op_with(&mut code, OpCode::GetName, Operand::Name(name));
        op(&mut code, OpCode::Return);
        assert_eq!(run(&mut vm, code), Err(Exception::not_defined("nowhere")));
    }
}
