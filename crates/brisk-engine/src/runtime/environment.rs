//! Environment records.
//!
//! Records live in the [`Heap`] and point only at their parent. Declarative
//! records are addressed by slot from statically resolved code and by name
//! from dynamic lookups; both views stay consistent because bindings are
//! created in slot order.
//!
//! The Environment Record contract (`has_binding`, `create_mutable_binding`,
//! ...) is implemented on [`Heap`] so a record can be used without holding a
//! borrow of the arena.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::exception::{Exception, JsResult};
use super::object::{Property, PropertyKey};
use super::value::Value;
use crate::gc::{EnvRef, Heap, ObjectRef};

/// A binding in a declarative record.
#[derive(Debug, Clone)]
pub struct BindingCell {
    /// Bound name
    pub name: Arc<str>,
    /// Value, `None` until initialized
    pub value: Option<Value>,
    /// Assignable
    pub mutable: bool,
    /// Assignments to an immutable binding throw even in sloppy code
    pub strict: bool,
    /// Can be removed with `delete`
    pub deletable: bool,
}

impl BindingCell {
    fn new(name: &str, mutable: bool, strict: bool, deletable: bool) -> Self {
        Self {
            name: Arc::from(name),
            value: None,
            mutable,
            strict,
            deletable,
        }
    }

    fn read(&self) -> JsResult<Value> {
        self.value
            .clone()
            .ok_or_else(|| Exception::uninitialized(&self.name))
    }

    fn write(&mut self, value: Value, strict: bool) -> JsResult<()> {
        if self.value.is_none() {
            return Err(Exception::uninitialized(&self.name));
        }
        if self.mutable {
            self.value = Some(value);
            Ok(())
        } else if strict || self.strict {
            Err(Exception::const_assignment())
        } else {
            Ok(())
        }
    }
}

/// Bindings of a block, function or module activation.
#[derive(Debug, Clone, Default)]
pub struct DeclarativeEnv {
    /// Outer record
    pub parent: Option<EnvRef>,
    /// Bindings in slot order
    pub bindings: Vec<BindingCell>,
}

impl DeclarativeEnv {
    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().rposition(|b| &*b.name == name)
    }
}

/// Bindings of a `with` object.
#[derive(Debug, Clone)]
pub struct ObjectEnv {
    /// Outer record
    pub parent: Option<EnvRef>,
    /// The binding object
    pub object: ObjectRef,
}

/// The global record: an object record for var and function declarations
/// plus a declarative part for let and const.
#[derive(Debug, Clone)]
pub struct GlobalEnv {
    /// The global object
    pub object: ObjectRef,
    /// Global let/const bindings
    pub lexical: FxHashMap<Arc<str>, BindingCell>,
    /// Names created by var and function declarations
    pub var_names: FxHashSet<Arc<str>>,
}

/// An environment record.
#[derive(Debug, Clone)]
pub enum Environment {
    /// Declarative record
    Declarative(DeclarativeEnv),
    /// Object record
    Object(ObjectEnv),
    /// Global record
    Global(GlobalEnv),
}

impl Environment {
    /// A new empty declarative record.
    pub fn declarative(parent: Option<EnvRef>) -> Self {
        Environment::Declarative(DeclarativeEnv {
            parent,
            bindings: Vec::new(),
        })
    }

    /// The outer record.
    pub fn parent(&self) -> Option<EnvRef> {
        match self {
            Environment::Declarative(env) => env.parent,
            Environment::Object(env) => env.parent,
            Environment::Global(_) => None,
        }
    }
}

impl Heap {
    fn key(name: &str) -> PropertyKey {
        PropertyKey::from(name)
    }

    fn global_env(&self, env: EnvRef) -> JsResult<&GlobalEnv> {
        match self.env(env) {
            Environment::Global(global) => Ok(global),
            _ => Err(Exception::type_error("not a global environment")),
        }
    }

    fn global_env_mut(&mut self, env: EnvRef) -> JsResult<&mut GlobalEnv> {
        match self.env_mut(env) {
            Environment::Global(global) => Ok(global),
            _ => Err(Exception::type_error("not a global environment")),
        }
    }

    // ========================================================================
    // Slot access
    // ========================================================================

    /// Walks `hops` records outward.
    pub fn env_at(&self, mut env: EnvRef, hops: u32) -> EnvRef {
        for _ in 0..hops {
            match self.env(env).parent() {
                Some(parent) => env = parent,
                None => break,
            }
        }
        env
    }

    fn cell(&self, env: EnvRef, hops: u32, slot: u32) -> JsResult<&BindingCell> {
        match self.env(self.env_at(env, hops)) {
            Environment::Declarative(decl) => decl.bindings.get(slot as usize),
            _ => None,
        }
        .ok_or_else(|| Exception::reference_error(format!("invalid slot {hops}:{slot}")))
    }

    fn cell_mut(&mut self, env: EnvRef, hops: u32, slot: u32) -> JsResult<&mut BindingCell> {
        let target = self.env_at(env, hops);
        match self.env_mut(target) {
            Environment::Declarative(decl) => decl.bindings.get_mut(slot as usize),
            _ => None,
        }
        .ok_or_else(|| Exception::reference_error(format!("invalid slot {hops}:{slot}")))
    }

    /// Reads a slot, throwing in its temporal dead zone.
    pub fn get_slot(&self, env: EnvRef, hops: u32, slot: u32) -> JsResult<Value> {
        self.cell(env, hops, slot)?.read()
    }

    /// Reads a slot that is initialized before any use, such as a parameter.
    pub fn get_slot_unchecked(&self, env: EnvRef, hops: u32, slot: u32) -> JsResult<Value> {
        Ok(self.cell(env, hops, slot)?.value.clone().unwrap_or_default())
    }

    /// Assigns a slot.
    pub fn set_slot(
        &mut self,
        env: EnvRef,
        hops: u32,
        slot: u32,
        value: Value,
        strict: bool,
    ) -> JsResult<()> {
        self.cell_mut(env, hops, slot)?.write(value, strict)
    }

    /// Initializes a slot.
    pub fn initialize_slot(&mut self, env: EnvRef, hops: u32, slot: u32, value: Value) -> JsResult<()> {
        self.cell_mut(env, hops, slot)?.value = Some(value);
        Ok(())
    }

    /// A fresh declarative record with the same parent and bindings.
    pub fn copy_env(&mut self, env: EnvRef) -> EnvRef {
        let copy = self.env(env).clone();
        self.alloc_env(copy)
    }

    // ========================================================================
    // Environment Record contract
    // ========================================================================

    /// HasBinding.
    pub fn has_binding(&self, env: EnvRef, name: &str) -> bool {
        match self.env(env) {
            Environment::Declarative(decl) => decl.position(name).is_some(),
            Environment::Object(obj) => self.has_property(obj.object, &Self::key(name)),
            Environment::Global(global) => {
                global.lexical.contains_key(name) || self.has_property(global.object, &Self::key(name))
            }
        }
    }

    /// CreateMutableBinding.
    pub fn create_mutable_binding(&mut self, env: EnvRef, name: &str, deletable: bool) {
        match self.env_mut(env) {
            Environment::Declarative(decl) => {
                decl.bindings.push(BindingCell::new(name, true, false, deletable));
            }
            Environment::Object(obj) => {
                let object = obj.object;
                self.set(object, Self::key(name), Value::Undefined);
            }
            Environment::Global(global) => {
                global
                    .lexical
                    .insert(Arc::from(name), BindingCell::new(name, true, false, deletable));
            }
        }
    }

    /// CreateImmutableBinding.
    pub fn create_immutable_binding(&mut self, env: EnvRef, name: &str, strict: bool) {
        let cell = BindingCell::new(name, false, strict, false);
        match self.env_mut(env) {
            Environment::Declarative(decl) => decl.bindings.push(cell),
            Environment::Global(global) => {
                global.lexical.insert(Arc::from(name), cell);
            }
            // Object records never hold immutable bindings.
            Environment::Object(_) => {}
        }
    }

    /// InitializeBinding.
    pub fn initialize_binding(&mut self, env: EnvRef, name: &str, value: Value) -> JsResult<()> {
        match self.env_mut(env) {
            Environment::Declarative(decl) => match decl.position(name) {
                Some(i) => {
                    decl.bindings[i].value = Some(value);
                    Ok(())
                }
                None => Err(Exception::not_defined(name)),
            },
            Environment::Object(obj) => {
                let object = obj.object;
                self.set(object, Self::key(name), value);
                Ok(())
            }
            Environment::Global(global) => match global.lexical.get_mut(name) {
                Some(cell) => {
                    cell.value = Some(value);
                    Ok(())
                }
                None => {
                    let object = global.object;
                    self.set(object, Self::key(name), value);
                    Ok(())
                }
            },
        }
    }

    /// GetBindingValue.
    pub fn get_binding_value(&self, env: EnvRef, name: &str, strict: bool) -> JsResult<Value> {
        match self.env(env) {
            Environment::Declarative(decl) => match decl.position(name) {
                Some(i) => decl.bindings[i].read(),
                None => Err(Exception::not_defined(name)),
            },
            Environment::Object(obj) => match self.get(obj.object, &Self::key(name)) {
                Some(value) => Ok(value),
                None if strict => Err(Exception::not_defined(name)),
                None => Ok(Value::Undefined),
            },
            Environment::Global(global) => match global.lexical.get(name) {
                Some(cell) => cell.read(),
                None => match self.get(global.object, &Self::key(name)) {
                    Some(value) => Ok(value),
                    None if strict => Err(Exception::not_defined(name)),
                    None => Ok(Value::Undefined),
                },
            },
        }
    }

    /// SetMutableBinding.
    pub fn set_mutable_binding(
        &mut self,
        env: EnvRef,
        name: &str,
        value: Value,
        strict: bool,
    ) -> JsResult<()> {
        match self.env_mut(env) {
            Environment::Declarative(decl) => match decl.position(name) {
                Some(i) => decl.bindings[i].write(value, strict),
                None => Err(Exception::not_defined(name)),
            },
            Environment::Object(obj) => {
                let object = obj.object;
                self.put(object, name, value, strict)
            }
            Environment::Global(global) => {
                if let Some(cell) = global.lexical.get_mut(name) {
                    return cell.write(value, strict);
                }
                let object = global.object;
                if strict && !self.has_property(object, &Self::key(name)) {
                    return Err(Exception::not_defined(name));
                }
                self.put(object, name, value, strict)
            }
        }
    }

    fn put(&mut self, object: ObjectRef, name: &str, value: Value, strict: bool) -> JsResult<()> {
        if !self.set(object, Self::key(name), value) && strict {
            return Err(Exception::type_error(format!(
                "Cannot assign to read only property '{name}'"
            )));
        }
        Ok(())
    }

    /// DeleteBinding.
    pub fn delete_binding(&mut self, env: EnvRef, name: &str) -> bool {
        match self.env_mut(env) {
            Environment::Declarative(decl) => match decl.position(name) {
                Some(i) if decl.bindings[i].deletable => {
                    let cell = &mut decl.bindings[i];
                    cell.name = Arc::from("");
                    cell.value = None;
                    true
                }
                Some(_) => false,
                None => true,
            },
            Environment::Object(obj) => {
                let object = obj.object;
                self.delete(object, &Self::key(name))
            }
            Environment::Global(global) => {
                if global.lexical.contains_key(name) {
                    return false;
                }
                let object = global.object;
                let deleted = self.delete(object, &Self::key(name));
                if deleted {
                    if let Environment::Global(global) = self.env_mut(env) {
                        global.var_names.remove(name);
                    }
                }
                deleted
            }
        }
    }

    /// Finds the innermost record on the chain that binds `name`.
    pub fn resolve_binding(&self, mut env: EnvRef, name: &str) -> Option<EnvRef> {
        loop {
            if self.has_binding(env, name) {
                return Some(env);
            }
            env = self.env(env).parent()?;
        }
    }

    /// Returns the `with` object of an object record.
    pub fn with_base_object(&self, env: EnvRef) -> Option<ObjectRef> {
        match self.env(env) {
            Environment::Object(obj) => Some(obj.object),
            _ => None,
        }
    }

    // ========================================================================
    // Global record
    // ========================================================================

    /// HasVarDeclaration.
    pub fn has_var_declaration(&self, env: EnvRef, name: &str) -> JsResult<bool> {
        Ok(self.global_env(env)?.var_names.contains(name))
    }

    /// HasLexicalDeclaration.
    pub fn has_lexical_declaration(&self, env: EnvRef, name: &str) -> JsResult<bool> {
        Ok(self.global_env(env)?.lexical.contains_key(name))
    }

    /// HasRestrictedGlobalProperty: an own non-configurable property.
    pub fn has_restricted_global_property(&self, env: EnvRef, name: &str) -> JsResult<bool> {
        let object = self.global_env(env)?.object;
        Ok(self
            .own_property(object, &Self::key(name))
            .is_some_and(|p| !p.configurable))
    }

    /// CanDeclareGlobalVar.
    pub fn can_declare_global_var(&self, env: EnvRef, name: &str) -> JsResult<bool> {
        let object = self.global_env(env)?.object;
        Ok(self.has_own(object, &Self::key(name)) || self.object(object).extensible)
    }

    /// CanDeclareGlobalFunction.
    pub fn can_declare_global_function(&self, env: EnvRef, name: &str) -> JsResult<bool> {
        let object = self.global_env(env)?.object;
        Ok(match self.own_property(object, &Self::key(name)) {
            None => self.object(object).extensible,
            Some(p) if p.configurable => true,
            Some(p) => p.writable && p.enumerable,
        })
    }

    /// CreateGlobalVarBinding.
    pub fn create_global_var_binding(&mut self, env: EnvRef, name: &str, deletable: bool) -> JsResult<()> {
        let object = self.global_env(env)?.object;
        if !self.has_own(object, &Self::key(name)) && self.object(object).extensible {
            let property = Property {
                configurable: deletable,
                ..Property::data(Value::Undefined)
            };
            self.define(object, Self::key(name), property);
        }
        self.global_env_mut(env)?.var_names.insert(Arc::from(name));
        Ok(())
    }

    /// CreateGlobalFunctionBinding.
    pub fn create_global_function_binding(
        &mut self,
        env: EnvRef,
        name: &str,
        value: Value,
        deletable: bool,
    ) -> JsResult<()> {
        let object = self.global_env(env)?.object;
        let key = Self::key(name);
        let property = match self.own_property(object, &key) {
            Some(existing) if !existing.configurable => Property {
                value,
                ..existing.clone()
            },
            _ => Property {
                configurable: deletable,
                ..Property::data(value)
            },
        };
        self.define(object, key.clone(), property.clone());
        // Non-configurable properties cannot be redefined; assign instead.
        if !property.configurable {
            self.set(object, key, property.value);
        }
        self.global_env_mut(env)?.var_names.insert(Arc::from(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::exception::ErrorKind;
    use crate::runtime::object::Object;

    fn global(heap: &mut Heap) -> EnvRef {
        let object = heap.alloc(Object::ordinary(None));
        heap.alloc_env(Environment::Global(GlobalEnv {
            object,
            lexical: FxHashMap::default(),
            var_names: FxHashSet::default(),
        }))
    }

    fn is_reference_error(result: JsResult<Value>) -> bool {
        matches!(
            result,
            Err(Exception::Error {
                kind: ErrorKind::ReferenceError,
                ..
            })
        )
    }

    #[test]
    fn test_binding_exists_before_initialization() {
        let mut heap = Heap::new();
        let env = heap.alloc_env(Environment::declarative(None));
        heap.create_mutable_binding(env, "x", false);
        assert!(heap.has_binding(env, "x"));
        assert!(is_reference_error(heap.get_binding_value(env, "x", true)));
        assert!(heap.set_mutable_binding(env, "x", Value::Null, false).is_err());

        heap.initialize_binding(env, "x", Value::Number(1.0)).unwrap();
        assert_eq!(heap.get_slot(env, 0, 0).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_immutable_binding_assignment() {
        let mut heap = Heap::new();
        let env = heap.alloc_env(Environment::declarative(None));
        heap.create_immutable_binding(env, "c", true);
        heap.create_immutable_binding(env, "callee", false);
        heap.initialize_slot(env, 0, 0, Value::Number(1.0)).unwrap();
        heap.initialize_slot(env, 0, 1, Value::Number(2.0)).unwrap();

        assert_eq!(
            heap.set_slot(env, 0, 0, Value::Null, false),
            Err(Exception::const_assignment())
        );
        // Sloppy assignment to a non-strict immutable binding is ignored.
        assert!(heap.set_slot(env, 0, 1, Value::Null, false).is_ok());
        assert_eq!(heap.get_slot(env, 0, 1).unwrap(), Value::Number(2.0));
        assert!(heap.set_slot(env, 0, 1, Value::Null, true).is_err());
    }

    #[test]
    fn test_slots_follow_parent_links() {
        let mut heap = Heap::new();
        let outer = heap.alloc_env(Environment::declarative(None));
        heap.create_mutable_binding(outer, "a", false);
        heap.initialize_slot(outer, 0, 0, Value::from("outer")).unwrap();
        let inner = heap.alloc_env(Environment::declarative(Some(outer)));
        assert_eq!(heap.get_slot(inner, 1, 0).unwrap(), Value::from("outer"));
        assert_eq!(heap.resolve_binding(inner, "a"), Some(outer));
        assert_eq!(heap.resolve_binding(inner, "b"), None);
    }

    #[test]
    fn test_copy_env_detaches_values() {
        let mut heap = Heap::new();
        let env = heap.alloc_env(Environment::declarative(None));
        heap.create_mutable_binding(env, "i", false);
        heap.initialize_slot(env, 0, 0, Value::Number(0.0)).unwrap();
        let copy = heap.copy_env(env);
        heap.set_slot(copy, 0, 0, Value::Number(1.0), true).unwrap();
        assert_eq!(heap.get_slot(env, 0, 0).unwrap(), Value::Number(0.0));
        assert_eq!(heap.get_slot(copy, 0, 0).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_global_declaration_checks() {
        let mut heap = Heap::new();
        let env = global(&mut heap);
        let object = heap.global_env(env).unwrap().object;
        heap.define(object, "undefined".into(), Property::frozen(Value::Undefined));

        assert!(heap.has_restricted_global_property(env, "undefined").unwrap());
        assert!(!heap.can_declare_global_function(env, "undefined").unwrap());
        assert!(heap.can_declare_global_function(env, "f").unwrap());

        heap.create_global_var_binding(env, "v", false).unwrap();
        assert!(heap.has_var_declaration(env, "v").unwrap());
        assert!(!heap.delete_binding(env, "v"));

        heap.create_mutable_binding(env, "l", false);
        assert!(heap.has_lexical_declaration(env, "l").unwrap());
        assert!(is_reference_error(heap.get_binding_value(env, "l", true)));
    }

    #[test]
    fn test_global_strict_assignment_to_missing_name() {
        let mut heap = Heap::new();
        let env = global(&mut heap);
        assert!(heap.set_mutable_binding(env, "x", Value::Null, true).is_err());
        heap.set_mutable_binding(env, "y", Value::Null, false).unwrap();
        assert!(heap.has_binding(env, "y"));
        assert!(heap.delete_binding(env, "y"));
    }
}
