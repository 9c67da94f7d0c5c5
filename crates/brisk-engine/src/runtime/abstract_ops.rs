//! Abstract operations used by generated code.
//!
//! Type conversions, property access on arbitrary values, comparisons and
//! the iterator protocol. Everything that can run user code (a `valueOf`, an
//! iterator's `next`) is a method on [`Vm`].

use std::sync::Arc;

use super::exception::{Exception, JsResult};
use super::object::{Object, ObjectKind, Property, PropertyKey};
use super::value::{number_to_string, string_to_number, strict_equals, Value};
use crate::gc::ObjectRef;
use crate::vm::Vm;

/// Hint passed to ToPrimitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No hint (`+`, `==`)
    Default,
    /// Number hint
    Number,
    /// String hint
    String,
}

/// ToInt32.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ToUint32.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let int = n.trunc();
    int.rem_euclid(4_294_967_296.0) as u32
}

impl Vm {
    // ========================================================================
    // Conversions
    // ========================================================================

    /// ToPrimitive.
    pub fn to_primitive(&mut self, value: &Value, hint: PreferredType) -> JsResult<Value> {
        let Value::Object(object) = value else {
            return Ok(value.clone());
        };
        let order = match hint {
            PreferredType::String => ["toString", "valueOf"],
            PreferredType::Default | PreferredType::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get_property(value, &PropertyKey::from(name))?;
            if self.heap.is_callable_value(&method) {
                let result = self.call(&method, &Value::Object(*object), &[])?;
                if result.as_object().is_none() {
                    return Ok(result);
                }
            }
        }
        Err(Exception::type_error("Cannot convert object to primitive value"))
    }

    /// ToNumber.
    pub fn to_number(&mut self, value: &Value) -> JsResult<f64> {
        Ok(match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Symbol(_) => {
                return Err(Exception::type_error(
                    "Cannot convert a Symbol value to a number",
                ));
            }
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::Number)?;
                return self.to_number(&primitive);
            }
        })
    }

    /// ToString.
    pub fn to_js_string(&mut self, value: &Value) -> JsResult<Arc<str>> {
        Ok(match value {
            Value::String(s) => s.clone(),
            Value::Undefined => Arc::from("undefined"),
            Value::Null => Arc::from("null"),
            Value::Boolean(b) => Arc::from(if *b { "true" } else { "false" }),
            Value::Number(n) => Arc::from(number_to_string(*n)),
            Value::Symbol(_) => {
                return Err(Exception::type_error(
                    "Cannot convert a Symbol value to a string",
                ));
            }
            Value::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::String)?;
                return self.to_js_string(&primitive);
            }
        })
    }

    /// ToObject. Primitives are wrapped in plain objects; there are no
    /// wrapper prototypes.
    pub fn to_object(&mut self, value: &Value) -> JsResult<ObjectRef> {
        match value {
            Value::Object(r) => Ok(*r),
            Value::Undefined | Value::Null => Err(Exception::type_error(
                "Cannot convert undefined or null to object",
            )),
            Value::String(s) => {
                let chars = s
                    .encode_utf16()
                    .map(|unit| Value::from(String::from_utf16_lossy(&[unit])))
                    .collect();
                let prototype = self.realm.object_prototype;
                Ok(self.heap.alloc(Object::new(Some(prototype), ObjectKind::Array(chars))))
            }
            Value::Boolean(_) | Value::Number(_) | Value::Symbol(_) => {
                let prototype = self.realm.object_prototype;
                Ok(self.heap.alloc(Object::ordinary(Some(prototype))))
            }
        }
    }

    /// ToPropertyKey.
    pub fn to_property_key(&mut self, value: &Value) -> JsResult<PropertyKey> {
        let primitive = self.to_primitive(value, PreferredType::String)?;
        match primitive {
            Value::Symbol(id) => Ok(PropertyKey::Symbol(id)),
            Value::Number(n) => Ok(PropertyKey::String(Arc::from(number_to_string(n)))),
            other => Ok(PropertyKey::String(self.to_js_string(&other)?)),
        }
    }

    /// The text of a property key for messages.
    pub fn key_text(&self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::String(s) => s.to_string(),
            PropertyKey::Symbol(id) => format!("Symbol({})", self.heap.symbol_description(*id)),
        }
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// IsLooselyEqual (`==`).
    pub fn loose_equals(&mut self, a: &Value, b: &Value) -> JsResult<bool> {
        Ok(match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(x), Value::String(s)) => *x == string_to_number(s),
            (Value::String(s), Value::Number(y)) => string_to_number(s) == *y,
            (Value::Boolean(x), other) => {
                return self.loose_equals(&Value::Number(f64::from(u8::from(*x))), other);
            }
            (other, Value::Boolean(y)) => {
                return self.loose_equals(other, &Value::Number(f64::from(u8::from(*y))));
            }
            (Value::Object(_), Value::Object(_)) => strict_equals(a, b),
            (Value::Object(_), _) => {
                let primitive = self.to_primitive(a, PreferredType::Default)?;
                return self.loose_equals(&primitive, b);
            }
            (_, Value::Object(_)) => {
                let primitive = self.to_primitive(b, PreferredType::Default)?;
                return self.loose_equals(a, &primitive);
            }
            _ => strict_equals(a, b),
        })
    }

    /// IsLessThan. `None` stands for undefined (a NaN was involved).
    pub fn less_than(&mut self, x: &Value, y: &Value, left_first: bool) -> JsResult<Option<bool>> {
        let (px, py) = if left_first {
            let px = self.to_primitive(x, PreferredType::Number)?;
            let py = self.to_primitive(y, PreferredType::Number)?;
            (px, py)
        } else {
            let py = self.to_primitive(y, PreferredType::Number)?;
            let px = self.to_primitive(x, PreferredType::Number)?;
            (px, py)
        };
        if let (Value::String(a), Value::String(b)) = (&px, &py) {
            return Ok(Some(a.encode_utf16().lt(b.encode_utf16())));
        }
        let nx = self.to_number(&px)?;
        let ny = self.to_number(&py)?;
        if nx.is_nan() || ny.is_nan() {
            return Ok(None);
        }
        Ok(Some(nx < ny))
    }

    /// The `typeof` operator.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(r) if self.heap.is_callable(*r) => "function",
            Value::Object(_) => "object",
        }
    }

    /// InstanceofOperator without `Symbol.hasInstance`.
    pub fn instance_of(&mut self, value: &Value, target: &Value) -> JsResult<bool> {
        if !self.heap.is_callable_value(target) {
            return Err(Exception::type_error(
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        let Some(object) = value.as_object() else {
            return Ok(false);
        };
        let prototype = self.get_property(target, &PropertyKey::from("prototype"))?;
        let Some(prototype) = prototype.as_object() else {
            return Err(Exception::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        let mut current = self.heap.object(object).prototype;
        while let Some(p) = current {
            if p == prototype {
                return Ok(true);
            }
            current = self.heap.object(p).prototype;
        }
        Ok(false)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// GetV: property lookup on any value.
    pub fn get_property(&mut self, base: &Value, key: &PropertyKey) -> JsResult<Value> {
        match base {
            Value::Object(r) => Ok(self.heap.get(*r, key).unwrap_or_default()),
            Value::Undefined | Value::Null => Err(Exception::type_error(format!(
                "Cannot read properties of {base} (reading '{}')",
                self.key_text(key)
            ))),
            Value::String(s) => {
                if key.as_str() == Some("length") {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(i) = key.array_index() {
                    return Ok(s
                        .encode_utf16()
                        .nth(i)
                        .map(|unit| Value::from(String::from_utf16_lossy(&[unit])))
                        .unwrap_or_default());
                }
                Ok(self.heap.get(self.realm.object_prototype, key).unwrap_or_default())
            }
            Value::Boolean(_) | Value::Number(_) | Value::Symbol(_) => {
                Ok(self.heap.get(self.realm.object_prototype, key).unwrap_or_default())
            }
        }
    }

    /// PutValue on a property reference.
    pub fn put_property(
        &mut self,
        base: &Value,
        key: PropertyKey,
        value: Value,
        strict: bool,
    ) -> JsResult<()> {
        match base {
            Value::Object(r) => {
                if !self.heap.set(*r, key.clone(), value) && strict {
                    return Err(Exception::type_error(format!(
                        "Cannot assign to read only property '{}' of object",
                        self.key_text(&key)
                    )));
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(Exception::type_error(format!(
                "Cannot set properties of {base} (setting '{}')",
                self.key_text(&key)
            ))),
            _ if strict => Err(Exception::type_error(format!(
                "Cannot create property '{}' on {} '{}'",
                self.key_text(&key),
                self.type_of(base),
                self.describe(base)
            ))),
            _ => Ok(()),
        }
    }

    /// HasProperty for the `in` operator.
    pub fn has_property_value(&mut self, object: &Value, key: &Value) -> JsResult<bool> {
        let Some(r) = object.as_object() else {
            return Err(Exception::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                self.describe(key),
                self.describe(object)
            )));
        };
        let key = self.to_property_key(key)?;
        Ok(self.heap.has_property(r, &key))
    }

    /// CreateDataPropertyOrThrow.
    pub fn define_property_or_throw(
        &mut self,
        object: ObjectRef,
        key: PropertyKey,
        value: Value,
    ) -> JsResult<()> {
        if !self.heap.define(object, key.clone(), Property::data(value)) {
            return Err(Exception::type_error(format!(
                "Cannot redefine property: {}",
                self.key_text(&key)
            )));
        }
        Ok(())
    }

    /// The `delete` operator on a property reference.
    pub fn delete_property(&mut self, base: &Value, key: &PropertyKey, strict: bool) -> JsResult<bool> {
        let object = self.to_object(base)?;
        let deleted = self.heap.delete(object, key);
        if !deleted && strict {
            return Err(Exception::type_error(format!(
                "Cannot delete property '{}'",
                self.key_text(key)
            )));
        }
        Ok(deleted)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// GetMethod: undefined when absent, TypeError when not callable.
    pub fn get_method(&mut self, value: &Value, key: &PropertyKey) -> JsResult<Value> {
        let method = self.get_property(value, key)?;
        if method.is_nullish() {
            return Ok(Value::Undefined);
        }
        if !self.heap.is_callable_value(&method) {
            return Err(Exception::type_error(format!(
                "{} is not a function",
                self.key_text(key)
            )));
        }
        Ok(method)
    }

    /// GetIterator through `Symbol.iterator`.
    pub fn get_iterator(&mut self, value: &Value) -> JsResult<Value> {
        let key = PropertyKey::Symbol(self.realm.iterator_symbol);
        let method = self.get_method(value, &key)?;
        if method.is_undefined() {
            return Err(Exception::type_error(format!(
                "{} is not iterable",
                self.describe(value)
            )));
        }
        let iterator = self.call(&method, value, &[])?;
        if iterator.as_object().is_none() {
            return Err(Exception::type_error(
                "Result of the Symbol.iterator method is not an object",
            ));
        }
        Ok(iterator)
    }

    /// IteratorNext.
    pub fn iterator_next(&mut self, iterator: &Value, value: Option<Value>) -> JsResult<Value> {
        let next = self.get_property(iterator, &PropertyKey::from("next"))?;
        let result = match value {
            Some(value) => self.call(&next, iterator, &[value])?,
            None => self.call(&next, iterator, &[])?,
        };
        self.require_object(result)
    }

    /// Throws unless `value` is an object.
    pub fn require_object(&mut self, value: Value) -> JsResult<Value> {
        if value.as_object().is_none() {
            return Err(Exception::type_error(format!(
                "Iterator result {} is not an object",
                self.describe(&value)
            )));
        }
        Ok(value)
    }

    /// IteratorComplete.
    pub fn iterator_complete(&mut self, result: &Value) -> JsResult<bool> {
        Ok(self
            .get_property(result, &PropertyKey::from("done"))?
            .to_boolean())
    }

    /// IteratorValue.
    pub fn iterator_value(&mut self, result: &Value) -> JsResult<Value> {
        self.get_property(result, &PropertyKey::from("value"))
    }

    /// IteratorClose for a normal or break completion.
    pub fn iterator_close(&mut self, iterator: &Value) -> JsResult<()> {
        let method = self.get_method(iterator, &PropertyKey::from("return"))?;
        if method.is_undefined() {
            return Ok(());
        }
        let result = self.call(&method, iterator, &[])?;
        if result.as_object().is_none() {
            return Err(Exception::type_error(
                "iterator.return() did not return an object",
            ));
        }
        Ok(())
    }

    /// CreateIterResultObject.
    pub fn create_iter_result(&mut self, value: Value, done: bool) -> Value {
        let result = self
            .heap
            .alloc(Object::ordinary(Some(self.realm.object_prototype)));
        self.heap.set(result, "value".into(), value);
        self.heap.set(result, "done".into(), Value::Boolean(done));
        Value::Object(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmOptions;

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_uint32(-1.0), u32::MAX);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_uint32(f64::INFINITY), 0);
    }

    #[test]
    fn test_coercion_round_trip_is_falsy() {
        let mut vm = Vm::new(VmOptions::default());
        let empty = Value::Object(vm.heap.alloc(Object::ordinary(Some(vm.realm.object_prototype))));
        let inputs = [
            Value::Number(0.0),
            Value::Number(-0.0),
            Value::Number(f64::NAN),
            Value::from(""),
            Value::from("0"),
            Value::Undefined,
            Value::Null,
            empty,
        ];
        for input in inputs {
            let s = vm.to_js_string(&input).unwrap();
            let n = vm.to_number(&Value::String(s)).unwrap();
            assert!(!Value::Number(n).to_boolean(), "{input:?}");
        }
    }

    #[test]
    fn test_loose_equality() {
        let mut vm = Vm::new(VmOptions::default());
        assert!(vm.loose_equals(&Value::Null, &Value::Undefined).unwrap());
        assert!(vm.loose_equals(&Value::from("1"), &Value::Number(1.0)).unwrap());
        assert!(vm.loose_equals(&Value::Boolean(true), &Value::from("1")).unwrap());
        assert!(!vm.loose_equals(&Value::Null, &Value::Number(0.0)).unwrap());
        assert!(!vm
            .loose_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN))
            .unwrap());
    }

    #[test]
    fn test_less_than_strings_and_nan() {
        let mut vm = Vm::new(VmOptions::default());
        assert_eq!(
            vm.less_than(&Value::from("a"), &Value::from("b"), true).unwrap(),
            Some(true)
        );
        assert_eq!(
            vm.less_than(&Value::from("10"), &Value::from("9"), true).unwrap(),
            Some(true)
        );
        assert_eq!(
            vm.less_than(&Value::Number(f64::NAN), &Value::Number(1.0), true)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_property_access_on_primitives() {
        let mut vm = Vm::new(VmOptions::default());
        let s = Value::from("héllo");
        assert_eq!(
            vm.get_property(&s, &"length".into()).unwrap(),
            Value::Number(5.0)
        );
        assert_eq!(vm.get_property(&s, &"1".into()).unwrap(), Value::from("é"));
        let err = vm.get_property(&Value::Undefined, &"x".into()).unwrap_err();
        assert_eq!(
            err,
            Exception::type_error("Cannot read properties of undefined (reading 'x')")
        );
        assert!(vm
            .put_property(&Value::Number(1.0), "x".into(), Value::Null, true)
            .is_err());
        assert!(vm
            .put_property(&Value::Number(1.0), "x".into(), Value::Null, false)
            .is_ok());
    }

    #[test]
    fn test_array_iteration_protocol() {
        let mut vm = Vm::new(VmOptions::default());
        let array = vm.heap.alloc(Object::new(
            Some(vm.realm.array_prototype),
            ObjectKind::Array(vec![Value::Number(1.0), Value::Number(2.0)]),
        ));
        let iterator = vm.get_iterator(&Value::Object(array)).unwrap();
        let mut seen = Vec::new();
        loop {
            let result = vm.iterator_next(&iterator, None).unwrap();
            if vm.iterator_complete(&result).unwrap() {
                break;
            }
            seen.push(vm.iterator_value(&result).unwrap());
        }
        assert_eq!(seen, vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(vm.get_iterator(&Value::Number(1.0)).is_err());
    }
}
