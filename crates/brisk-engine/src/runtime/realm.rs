//! The realm: global object, global environment and the builtins generated
//! code relies on.
//!
//! Only what the translation rules need to be observable is provided:
//! `Object.prototype`, arrays and their iterators, the `Error` family,
//! `Symbol.iterator`, generator objects, promise plumbing and `print`.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::environment::{Environment, GlobalEnv};
use super::exception::{ErrorKind, Exception, JsResult};
use super::object::{NativeFn, Object, ObjectKind, Property, PropertyKey};
use super::promise::{promise_reject_native, promise_resolve_native, promise_then};
use super::value::{SymbolId, Value};
use crate::gc::{EnvRef, Heap, ObjectRef};
use crate::vm::Vm;
use crate::vm::generator::{generator_next, generator_return, generator_throw};

/// Intrinsic objects of one realm.
#[derive(Debug, Clone)]
pub struct Realm {
    /// The global object
    pub global_object: ObjectRef,
    /// The global environment record
    pub global_env: EnvRef,
    /// `Object.prototype`
    pub object_prototype: ObjectRef,
    /// `Function.prototype`
    pub function_prototype: ObjectRef,
    /// `Array.prototype`
    pub array_prototype: ObjectRef,
    /// `%ArrayIteratorPrototype%`, shared with for-in key iterators
    pub array_iterator_prototype: ObjectRef,
    /// `%GeneratorPrototype%`
    pub generator_prototype: ObjectRef,
    /// `Promise.prototype`
    pub promise_prototype: ObjectRef,
    /// `Array.prototype.values`, installed on arguments objects
    pub array_values: ObjectRef,
    /// `Symbol.iterator`
    pub iterator_symbol: SymbolId,
    error_prototypes: FxHashMap<ErrorKind, ObjectRef>,
}

impl Realm {
    /// Creates the intrinsics and the global environment in `heap`.
    pub fn new(heap: &mut Heap) -> Self {
        let object_prototype = heap.alloc(Object::ordinary(None));
        let function_prototype = heap.alloc(Object::ordinary(Some(object_prototype)));
        let global_object = heap.alloc(Object::ordinary(Some(object_prototype)));
        let global_env = heap.alloc_env(Environment::Global(GlobalEnv {
            object: global_object,
            lexical: FxHashMap::default(),
            var_names: FxHashSet::default(),
        }));
        let iterator_symbol = heap.new_symbol("Symbol.iterator");

        let mut builder = Builder {
            heap,
            function_prototype,
        };

        // Object.prototype
        builder.method(object_prototype, "toString", object_to_string);
        builder.method(object_prototype, "valueOf", object_value_of);

        // Iterators
        let iterator_prototype = builder.heap.alloc(Object::ordinary(Some(object_prototype)));
        builder.symbol_method(iterator_prototype, iterator_symbol, "[Symbol.iterator]", iterator_self);
        let array_iterator_prototype = builder
            .heap
            .alloc(Object::ordinary(Some(iterator_prototype)));
        builder.method(array_iterator_prototype, "next", array_iterator_next);

        // Arrays
        let array_prototype = builder.heap.alloc(Object::new(
            Some(object_prototype),
            ObjectKind::Array(Vec::new()),
        ));
        builder.method(array_prototype, "push", array_push);
        builder.method(array_prototype, "join", array_join);
        builder.method(array_prototype, "toString", array_to_string);
        let array_values = builder.native("values", array_values_native);
        builder.heap.define_hidden(array_prototype, "values", Value::Object(array_values));
        builder
            .heap
            .define_hidden(array_prototype, iterator_symbol, Value::Object(array_values));

        // Generators
        let generator_prototype = builder
            .heap
            .alloc(Object::ordinary(Some(iterator_prototype)));
        builder.method(generator_prototype, "next", generator_next);
        builder.method(generator_prototype, "throw", generator_throw);
        builder.method(generator_prototype, "return", generator_return);

        // Promises
        let promise_prototype = builder.heap.alloc(Object::ordinary(Some(object_prototype)));
        builder.method(promise_prototype, "then", promise_then);
        let promise = builder.heap.alloc(Object::ordinary(Some(object_prototype)));
        builder.method(promise, "resolve", promise_resolve_native);
        builder.method(promise, "reject", promise_reject_native);
        builder
            .heap
            .define_hidden(promise, "prototype", Value::Object(promise_prototype));
        builder.heap.define_hidden(global_object, "Promise", Value::Object(promise));

        // Errors
        let mut error_prototypes = FxHashMap::default();
        let mut base_error_prototype = object_prototype;
        for kind in ErrorKind::ALL {
            let prototype = builder.heap.alloc(Object::ordinary(Some(base_error_prototype)));
            if kind == ErrorKind::Error {
                base_error_prototype = prototype;
                builder.method(prototype, "toString", error_to_string);
                builder.heap.define_hidden(prototype, "message", Value::from(""));
            }
            builder.heap.define_hidden(prototype, "name", Value::from(kind.name()));

            let constructor = builder.heap.alloc(Object::new(
                Some(function_prototype),
                ObjectKind::ErrorConstructor(kind),
            ));
            builder
                .heap
                .define(constructor, "prototype".into(), Property::frozen(Value::Object(prototype)));
            builder.heap.define_hidden(constructor, "name", Value::from(kind.name()));
            builder
                .heap
                .define_hidden(prototype, "constructor", Value::Object(constructor));
            builder
                .heap
                .define_hidden(global_object, kind.name(), Value::Object(constructor));
            error_prototypes.insert(kind, prototype);
        }

        // Symbol
        let symbol = builder.heap.alloc(Object::ordinary(Some(object_prototype)));
        builder.heap.define(
            symbol,
            "iterator".into(),
            Property::frozen(Value::Symbol(iterator_symbol)),
        );
        builder.heap.define_hidden(global_object, "Symbol", Value::Object(symbol));

        // Globals
        let print = builder.native("print", print);
        builder.heap.define_hidden(global_object, "print", Value::Object(print));
        builder
            .heap
            .define_hidden(global_object, "globalThis", Value::Object(global_object));
        for (name, value) in [
            ("undefined", Value::Undefined),
            ("NaN", Value::Number(f64::NAN)),
            ("Infinity", Value::Number(f64::INFINITY)),
        ] {
            builder
                .heap
                .define(global_object, name.into(), Property::frozen(value));
        }

        Self {
            global_object,
            global_env,
            object_prototype,
            function_prototype,
            array_prototype,
            array_iterator_prototype,
            generator_prototype,
            promise_prototype,
            array_values,
            iterator_symbol,
            error_prototypes,
        }
    }

    /// The prototype of errors of `kind`.
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectRef {
        self.error_prototypes
            .get(&kind)
            .copied()
            .unwrap_or(self.object_prototype)
    }
}

struct Builder<'a> {
    heap: &'a mut Heap,
    function_prototype: ObjectRef,
}

impl Builder<'_> {
    fn native(&mut self, name: &str, func: NativeFn) -> ObjectRef {
        let function = self.heap.alloc(Object::new(
            Some(self.function_prototype),
            ObjectKind::Native {
                name: Arc::from(name),
                func,
            },
        ));
        self.heap.define_hidden(function, "name", Value::from(name));
        function
    }

    fn method(&mut self, target: ObjectRef, name: &str, func: NativeFn) {
        let function = self.native(name, func);
        self.heap.define_hidden(target, name, Value::Object(function));
    }

    fn symbol_method(&mut self, target: ObjectRef, symbol: SymbolId, name: &str, func: NativeFn) {
        let function = self.native(name, func);
        self.heap
            .define_hidden(target, PropertyKey::Symbol(symbol), Value::Object(function));
    }
}

// ============================================================================
// Natives
// ============================================================================

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn print(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
        parts.push(vm.to_js_string(value)?);
    }
    vm.print_line(parts.join(" "));
    Ok(Value::Undefined)
}

fn object_to_string(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Object(r) => match &vm.heap.object(*r).kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) | ObjectKind::Native { .. } | ObjectKind::ErrorConstructor(_) => {
                "Function"
            }
            ObjectKind::Error { .. } => "Error",
            ObjectKind::Generator(_) => "Generator",
            ObjectKind::Promise(_) => "Promise",
            _ => "Object",
        },
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Symbol(_) => "Symbol",
    };
    Ok(Value::from(format!("[object {tag}]")))
}

fn object_value_of(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::Object(vm.to_object(this)?))
}

fn iterator_self(_vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(this.clone())
}

fn this_array(vm: &Vm, this: &Value) -> JsResult<ObjectRef> {
    match this.as_object() {
        Some(r) if matches!(vm.heap.object(r).kind, ObjectKind::Array(_)) => Ok(r),
        _ => Err(Exception::type_error("receiver is not an array")),
    }
}

fn array_push(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    let r = this_array(vm, this)?;
    let ObjectKind::Array(elements) = &mut vm.heap.object_mut(r).kind else {
        return Err(Exception::type_error("receiver is not an array"));
    };
    elements.extend(args.iter().cloned());
    Ok(Value::Number(elements.len() as f64))
}

fn array_join(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    let r = this_array(vm, this)?;
    let separator = match arg(args, 0) {
        Value::Undefined => Arc::from(","),
        other => vm.to_js_string(&other)?,
    };
    let elements = match &vm.heap.object(r).kind {
        ObjectKind::Array(elements) => elements.clone(),
        _ => Vec::new(),
    };
    let mut parts = Vec::with_capacity(elements.len());
    for element in &elements {
        parts.push(if element.is_nullish() {
            Arc::from("")
        } else {
            vm.to_js_string(element)?
        });
    }
    Ok(Value::from(parts.join(&*separator)))
}

fn array_to_string(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    array_join(vm, this, &[])
}

fn array_values_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let array = vm.to_object(this)?;
    let iterator = vm.heap.alloc(Object::new(
        Some(vm.realm.array_iterator_prototype),
        ObjectKind::ArrayIterator { array, index: 0 },
    ));
    Ok(Value::Object(iterator))
}

fn array_iterator_next(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let Some(r) = this.as_object() else {
        return Err(Exception::type_error("next called on a non-iterator"));
    };
    let next = match &mut vm.heap.object_mut(r).kind {
        ObjectKind::ArrayIterator { array, index } => {
            let position = *index;
            *index += 1;
            Some((Some(*array), position, None))
        }
        ObjectKind::ListIterator { values, index } => {
            let value = values.get(*index).cloned();
            *index += 1;
            Some((None, 0, value))
        }
        _ => None,
    };
    let value = match next {
        Some((Some(array), position, _)) => {
            let length = vm
                .heap
                .get_own(array, &"length".into())
                .and_then(|v| v.as_number())
                .unwrap_or(0.0) as usize;
            if position < length {
                Some(
                    vm.heap
                        .get(array, &PropertyKey::from(position.to_string().as_str()))
                        .unwrap_or_default(),
                )
            } else {
                None
            }
        }
        Some((None, _, value)) => value,
        None => return Err(Exception::type_error("next called on a non-iterator")),
    };
    let done = value.is_none();
    Ok(vm.create_iter_result(value.unwrap_or_default(), done))
}

fn error_to_string(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let Some(r) = this.as_object() else {
        return Err(Exception::type_error("Error.prototype.toString called on a non-object"));
    };
    let name = match vm.heap.get(r, &"name".into()) {
        None | Some(Value::Undefined) => Arc::from("Error"),
        Some(v) => vm.to_js_string(&v)?,
    };
    let message = match vm.heap.get(r, &"message".into()) {
        None | Some(Value::Undefined) => Arc::from(""),
        Some(v) => vm.to_js_string(&v)?,
    };
    Ok(Value::from(match (name.is_empty(), message.is_empty()) {
        (_, true) => name.to_string(),
        (true, false) => message.to_string(),
        (false, false) => format!("{name}: {message}"),
    }))
}
