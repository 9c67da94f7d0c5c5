//! The object and environment arena.

use std::sync::Arc;

use super::{EnvRef, ObjectRef};
use crate::runtime::environment::Environment;
use crate::runtime::object::{Object, ObjectKind, Property, PropertyKey};
use crate::runtime::value::{SymbolId, Value};

/// Arena of objects, environment records and symbols.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
    envs: Vec<Environment>,
    symbols: Vec<Arc<str>>,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an object.
    pub fn alloc(&mut self, object: Object) -> ObjectRef {
        let r = ObjectRef::new(self.objects.len() as u32);
        self.objects.push(object);
        r
    }

    /// Returns an object.
    pub fn object(&self, r: ObjectRef) -> &Object {
        &self.objects[r.index()]
    }

    /// Returns an object mutably.
    pub fn object_mut(&mut self, r: ObjectRef) -> &mut Object {
        &mut self.objects[r.index()]
    }

    /// Allocates an environment record.
    pub fn alloc_env(&mut self, env: Environment) -> EnvRef {
        let r = EnvRef::new(self.envs.len() as u32);
        self.envs.push(env);
        r
    }

    /// Returns an environment record.
    pub fn env(&self, r: EnvRef) -> &Environment {
        &self.envs[r.index()]
    }

    /// Returns an environment record mutably.
    pub fn env_mut(&mut self, r: EnvRef) -> &mut Environment {
        &mut self.envs[r.index()]
    }

    /// Creates a new symbol.
    pub fn new_symbol(&mut self, description: &str) -> SymbolId {
        self.symbols.push(Arc::from(description));
        SymbolId((self.symbols.len() - 1) as u32)
    }

    /// Returns a symbol's description.
    pub fn symbol_description(&self, id: SymbolId) -> &str {
        self.symbols.get(id.0 as usize).map_or("", |s| s)
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Returns an own property value, including array elements and `length`.
    pub fn get_own(&self, r: ObjectRef, key: &PropertyKey) -> Option<Value> {
        let object = self.object(r);
        if let ObjectKind::Array(elements) = &object.kind {
            if let Some(i) = key.array_index() {
                return elements.get(i).cloned();
            }
            if key.as_str() == Some("length") {
                return Some(Value::Number(elements.len() as f64));
            }
        }
        object.properties.get(key).map(|p| p.value.clone())
    }

    /// Returns true when `r` has an own property `key`.
    pub fn has_own(&self, r: ObjectRef, key: &PropertyKey) -> bool {
        self.get_own(r, key).is_some()
    }

    /// `[[Get]]` along the prototype chain.
    pub fn get(&self, r: ObjectRef, key: &PropertyKey) -> Option<Value> {
        let mut current = Some(r);
        while let Some(obj) = current {
            if let Some(value) = self.get_own(obj, key) {
                return Some(value);
            }
            current = self.object(obj).prototype;
        }
        None
    }

    /// HasProperty along the prototype chain.
    pub fn has_property(&self, r: ObjectRef, key: &PropertyKey) -> bool {
        self.get(r, key).is_some()
    }

    /// `[[Set]]` on the receiver itself. Returns false when the property is
    /// read-only or the object is not extensible.
    pub fn set(&mut self, r: ObjectRef, key: PropertyKey, value: Value) -> bool {
        let object = self.object_mut(r);
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Some(i) = key.array_index() {
                if i >= elements.len() {
                    elements.resize(i + 1, Value::Undefined);
                }
                elements[i] = value;
                return true;
            }
            if key.as_str() == Some("length") {
                if let Value::Number(n) = value {
                    if n >= 0.0 && n.fract() == 0.0 {
                        elements.resize(n as usize, Value::Undefined);
                        return true;
                    }
                }
                return false;
            }
        }
        match object.properties.get_mut(&key) {
            Some(property) if property.writable => {
                property.value = value;
                true
            }
            Some(_) => false,
            None if object.extensible => {
                object.properties.insert(key, Property::data(value));
                true
            }
            None => false,
        }
    }

    /// DefinePropertyOrThrow with a complete descriptor. Returns false when
    /// an existing non-configurable property is in the way.
    pub fn define(&mut self, r: ObjectRef, key: PropertyKey, property: Property) -> bool {
        let is_element =
            matches!(self.object(r).kind, ObjectKind::Array(_)) && key.array_index().is_some();
        if is_element {
            return self.set(r, key, property.value);
        }
        let object = self.object_mut(r);
        match object.properties.get(&key) {
            Some(existing) if !existing.configurable => false,
            _ => {
                object.properties.insert(key, property);
                true
            }
        }
    }

    /// Defines a non-enumerable method or value on a builtin.
    pub fn define_hidden(&mut self, r: ObjectRef, key: impl Into<PropertyKey>, value: Value) {
        self.define(r, key.into(), Property::hidden(value));
    }

    /// `[[Delete]]`. Returns false for non-configurable properties.
    pub fn delete(&mut self, r: ObjectRef, key: &PropertyKey) -> bool {
        let object = self.object_mut(r);
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Some(i) = key.array_index() {
                if i < elements.len() {
                    elements[i] = Value::Undefined;
                }
                return true;
            }
            if key.as_str() == Some("length") {
                return false;
            }
        }
        match object.properties.get(key) {
            Some(property) if !property.configurable => false,
            Some(_) => {
                object.properties.remove(key);
                true
            }
            None => true,
        }
    }

    /// Returns the own property descriptor for `key`, ignoring array elements.
    pub fn own_property(&self, r: ObjectRef, key: &PropertyKey) -> Option<&Property> {
        self.object(r).properties.get(key)
    }

    /// Enumerable string keys along the prototype chain, own keys first,
    /// shadowed keys reported once.
    pub fn enumerable_keys(&self, r: ObjectRef) -> Vec<Value> {
        let mut seen: Vec<Arc<str>> = Vec::new();
        let mut keys = Vec::new();
        let mut current = Some(r);
        while let Some(obj) = current {
            let object = self.object(obj);
            if let ObjectKind::Array(elements) = &object.kind {
                for i in 0..elements.len() {
                    let key: Arc<str> = Arc::from(i.to_string());
                    if !seen.contains(&key) {
                        seen.push(key.clone());
                        keys.push(Value::String(key));
                    }
                }
            }
            for (key, property) in object.properties.iter() {
                if let PropertyKey::String(s) = key {
                    if seen.contains(s) {
                        continue;
                    }
                    seen.push(s.clone());
                    if property.enumerable {
                        keys.push(Value::String(s.clone()));
                    }
                }
            }
            current = object.prototype;
        }
        keys
    }

    /// Returns true when `r` has a `[[Call]]` internal method.
    pub fn is_callable(&self, r: ObjectRef) -> bool {
        self.object(r).kind.is_callable()
    }

    /// Returns true when `value` is a callable object.
    pub fn is_callable_value(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|r| self.is_callable(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_prototypes() {
        let mut heap = Heap::new();
        let proto = heap.alloc(Object::ordinary(None));
        let obj = heap.alloc(Object::ordinary(Some(proto)));
        heap.set(proto, "x".into(), Value::Number(1.0));
        assert_eq!(heap.get(obj, &"x".into()), Some(Value::Number(1.0)));
        assert!(!heap.has_own(obj, &"x".into()));
        assert!(heap.has_property(obj, &"x".into()));
    }

    #[test]
    fn test_array_elements_and_length() {
        let mut heap = Heap::new();
        let arr = heap.alloc(Object::new(None, ObjectKind::Array(vec![Value::Null])));
        heap.set(arr, "3".into(), Value::Boolean(true));
        assert_eq!(heap.get_own(arr, &"length".into()), Some(Value::Number(4.0)));
        assert_eq!(heap.get_own(arr, &"1".into()), Some(Value::Undefined));
        assert!(heap.set(arr, "length".into(), Value::Number(1.0)));
        assert_eq!(heap.get_own(arr, &"3".into()), None);
    }

    #[test]
    fn test_frozen_property_resists_writes_and_deletes() {
        let mut heap = Heap::new();
        let obj = heap.alloc(Object::ordinary(None));
        heap.define(obj, "k".into(), Property::frozen(Value::Number(1.0)));
        assert!(!heap.set(obj, "k".into(), Value::Number(2.0)));
        assert!(!heap.delete(obj, &"k".into()));
        assert!(!heap.define(obj, "k".into(), Property::data(Value::Null)));
        assert_eq!(heap.get(obj, &"k".into()), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_enumerable_keys_skip_shadowed_and_hidden() {
        let mut heap = Heap::new();
        let proto = heap.alloc(Object::ordinary(None));
        heap.set(proto, "a".into(), Value::Null);
        heap.set(proto, "b".into(), Value::Null);
        heap.define_hidden(proto, "hidden", Value::Null);
        let obj = heap.alloc(Object::ordinary(Some(proto)));
        heap.set(obj, "b".into(), Value::Null);
        heap.set(obj, "c".into(), Value::Null);

        let keys: Vec<String> = heap
            .enumerable_keys(obj)
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }
}
