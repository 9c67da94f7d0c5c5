//! Object representation.
//!
//! Objects carry ordered data properties and a [`ObjectKind`] payload for
//! exotic behavior (arrays, functions, generators, promises). There are no
//! accessor properties.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::exception::{ErrorKind, JsResult};
use super::value::{SymbolId, Value};
use crate::compiler::bytecode::FunctionTemplate;
use crate::gc::{EnvRef, ObjectRef};
use crate::vm::frame::Frame;
use crate::vm::Vm;

/// A property key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key
    String(Arc<str>),
    /// Symbol key
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Returns the array index this key denotes, if any.
    pub fn array_index(&self) -> Option<usize> {
        match self {
            PropertyKey::String(s) => {
                if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
                    return None;
                }
                s.parse::<u32>().ok().map(|i| i as usize)
            }
            PropertyKey::Symbol(_) => None,
        }
    }

    /// Returns the key text of a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(Arc::from(s))
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        PropertyKey::Symbol(id)
    }
}

/// A data property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// The value
    pub value: Value,
    /// Can be assigned
    pub writable: bool,
    /// Shows up in for-in
    pub enumerable: bool,
    /// Can be deleted or redefined
    pub configurable: bool,
}

impl Property {
    /// A writable, enumerable, configurable property.
    pub fn data(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// A writable, configurable, non-enumerable property.
    pub fn hidden(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }

    /// A read-only, permanent, non-enumerable property.
    pub fn frozen(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// Properties in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(PropertyKey, Property)>,
    index: FxHashMap<PropertyKey, usize>,
}

impl PropertyMap {
    /// Returns the property for `key`.
    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Returns the property for `key` mutably.
    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut Property> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Inserts or replaces a property.
    pub fn insert(&mut self, key: PropertyKey, property: Property) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = property,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, property));
            }
        }
    }

    /// Removes a property.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<Property> {
        let i = self.index.remove(key)?;
        let (_, property) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(property)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &Property)> {
        self.entries.iter().map(|(k, p)| (k, p))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when there are no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A native function body.
pub type NativeFn = fn(&mut Vm, &Value, &[Value]) -> JsResult<Value>;

/// A closure over compiled code.
#[derive(Debug, Clone)]
pub struct Closure {
    /// The compiled body
    pub template: Arc<FunctionTemplate>,
    /// The captured record
    pub env: EnvRef,
    /// Captured `this` of arrow functions
    pub this: Option<Value>,
}

/// Resumption state of a generator object.
#[derive(Debug)]
pub enum GeneratorState {
    /// Created, body not entered past its prologue
    SuspendedStart(Box<Frame>),
    /// Suspended at a `yield`
    SuspendedYield(Box<Frame>),
    /// Running; the frame is owned by the Rust stack
    Executing,
    /// Returned or threw
    Completed,
}

/// What happens when a promise settles.
#[derive(Debug, Clone)]
pub enum Reaction {
    /// Resume a suspended async activation
    Resume {
        /// The activation object
        activation: ObjectRef,
    },
    /// A `then` callback pair and the promise it returned
    Then {
        /// Fulfillment callback or undefined
        on_fulfilled: Value,
        /// Rejection callback or undefined
        on_rejected: Value,
        /// Promise settled with the callback's outcome
        derived: ObjectRef,
    },
    /// Settle another promise the same way
    Forward {
        /// The promise to settle
        target: ObjectRef,
    },
}

/// Settlement state of a promise.
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Not settled yet
    Pending(Vec<Reaction>),
    /// Fulfilled with a value
    Fulfilled(Value),
    /// Rejected with a reason
    Rejected(Value),
}

/// A suspended async function activation.
#[derive(Debug)]
pub struct AsyncActivation {
    /// The frame, absent while running
    pub frame: Option<Box<Frame>>,
    /// The promise the call returned
    pub promise: ObjectRef,
}

/// Exotic payload of an object.
#[derive(Debug)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array or arguments object; elements are stored densely
    Array(Vec<Value>),
    /// Compiled function
    Function(Closure),
    /// Native function
    Native {
        /// Function name
        name: Arc<str>,
        /// Body
        func: NativeFn,
    },
    /// Native error constructor
    ErrorConstructor(ErrorKind),
    /// Error instance
    Error {
        /// Constructor that made it
        kind: ErrorKind,
        /// Exceptions it superseded while unwinding
        suppressed: Vec<Value>,
    },
    /// Generator object
    Generator(GeneratorState),
    /// Promise
    Promise(PromiseState),
    /// Async function activation
    AsyncActivation(AsyncActivation),
    /// Iterator over an array's elements
    ArrayIterator {
        /// The array
        array: ObjectRef,
        /// Next index
        index: usize,
    },
    /// Iterator over a snapshot of keys (for-in)
    ListIterator {
        /// The values to produce
        values: Vec<Value>,
        /// Next index
        index: usize,
    },
}

impl ObjectKind {
    /// Returns true for objects with a `[[Call]]` internal method.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            ObjectKind::Function(_) | ObjectKind::Native { .. } | ObjectKind::ErrorConstructor(_)
        )
    }
}

/// A heap object.
#[derive(Debug)]
pub struct Object {
    /// `[[Prototype]]`
    pub prototype: Option<ObjectRef>,
    /// Own properties
    pub properties: PropertyMap,
    /// Exotic payload
    pub kind: ObjectKind,
    /// New properties may be added
    pub extensible: bool,
}

impl Object {
    /// Creates an object with the given prototype and payload.
    pub fn new(prototype: Option<ObjectRef>, kind: ObjectKind) -> Self {
        Self {
            prototype,
            properties: PropertyMap::default(),
            kind,
            extensible: true,
        }
    }

    /// Creates a plain object.
    pub fn ordinary(prototype: Option<ObjectRef>) -> Self {
        Self::new(prototype, ObjectKind::Ordinary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_map_keeps_insertion_order() {
        let mut map = PropertyMap::default();
        map.insert("b".into(), Property::data(Value::Number(1.0)));
        map.insert("a".into(), Property::data(Value::Number(2.0)));
        map.insert("b".into(), Property::data(Value::Number(3.0)));
        let keys: Vec<_> = map.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(map.get(&"b".into()).map(|p| p.value.clone()), Some(Value::Number(3.0)));

        map.remove(&"b".into());
        assert_eq!(map.len(), 1);
        assert!(map.get(&"a".into()).is_some());
    }

    #[test]
    fn test_array_index_keys() {
        assert_eq!(PropertyKey::from("0").array_index(), Some(0));
        assert_eq!(PropertyKey::from("12").array_index(), Some(12));
        assert_eq!(PropertyKey::from("01").array_index(), None);
        assert_eq!(PropertyKey::from("-1").array_index(), None);
        assert_eq!(PropertyKey::from("length").array_index(), None);
    }
}
