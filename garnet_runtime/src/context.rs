//! The runtime handle and per-thread execution context.
//!
//! [`Runtime`] owns every table the dispatch engine consults: the class
//! registry, the object heap, the global-variable table, the checkpoint
//! invalidator, and the known string encodings. A [`Context`] is the
//! per-thread view handed to every call as its first argument.

use crate::class::{ClassDef, ClassId};
use crate::globals::GlobalTable;
use crate::method::Method;
use crate::object::{ObjectHeap, Payload};
use crate::opto::Invalidator;
use garnet_core::{Symbol, Value};
use parking_lot::RwLock;
use std::sync::Arc;

// =============================================================================
// Encodings
// =============================================================================

/// A string encoding the runtime knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    /// Canonical name.
    pub name: &'static str,
    /// Accepted aliases.
    pub aliases: &'static [&'static str],
}

static ENCODINGS: &[Encoding] = &[
    Encoding {
        name: "UTF-8",
        aliases: &["CP65001"],
    },
    Encoding {
        name: "US-ASCII",
        aliases: &["ASCII", "ANSI_X3.4-1968"],
    },
    Encoding {
        name: "ASCII-8BIT",
        aliases: &["BINARY"],
    },
];

// =============================================================================
// Runtime
// =============================================================================

/// Registry ids of the built-in classes.
#[derive(Debug, Clone, Copy)]
struct CoreClasses {
    object: ClassId,
    nil_class: ClassId,
    true_class: ClassId,
    false_class: ClassId,
    integer: ClassId,
    float: ClassId,
    string: ClassId,
    array: ClassId,
    hash: ClassId,
}

/// The process-wide runtime.
#[derive(Debug)]
pub struct Runtime {
    classes: RwLock<Vec<Arc<ClassDef>>>,
    heap: ObjectHeap,
    globals: GlobalTable,
    checkpoint: Arc<Invalidator>,
    core: CoreClasses,
    handle: Value,
}

impl Runtime {
    /// Boot a runtime with its built-in classes and handle object.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let classes = RwLock::new(Vec::new());
        let register = |name: &str, superclass: Option<ClassId>| {
            let mut table = classes.write();
            let id = ClassId(table.len() as u32);
            let class = Arc::new(ClassDef::new(id, Symbol::intern(name), superclass, vec![]));
            table.push(class);
            id
        };

        let object = register("Object", None);
        let core = CoreClasses {
            object,
            nil_class: register("NilClass", Some(object)),
            true_class: register("TrueClass", Some(object)),
            false_class: register("FalseClass", Some(object)),
            integer: register("Integer", Some(object)),
            float: register("Float", Some(object)),
            string: register("String", Some(object)),
            array: register("Array", Some(object)),
            hash: register("Hash", Some(object)),
        };

        let heap = ObjectHeap::new();
        let handle = {
            let table = classes.read();
            heap.alloc(&table[object.0 as usize])
        };

        Arc::new(Self {
            classes,
            heap,
            globals: GlobalTable::new(),
            checkpoint: Arc::new(Invalidator::new()),
            core,
            handle,
        })
    }

    /// Define a class with optional superclass and fixed inline fields.
    pub fn define_class(
        &self,
        name: &str,
        superclass: Option<ClassId>,
        fixed_fields: &[&str],
    ) -> Arc<ClassDef> {
        let mut table = self.classes.write();
        let id = ClassId(table.len() as u32);
        let class = Arc::new(ClassDef::new(
            id,
            Symbol::intern(name),
            superclass.or(Some(self.core.object)),
            fixed_fields.iter().map(|f| Symbol::intern(f)).collect(),
        ));
        table.push(Arc::clone(&class));
        class
    }

    /// The class behind a registry id.
    #[must_use]
    pub fn class(&self, id: ClassId) -> Arc<ClassDef> {
        Arc::clone(&self.classes.read()[id.0 as usize])
    }

    /// The concrete class of any value.
    #[must_use]
    pub fn class_of(&self, value: Value) -> ClassId {
        if value.is_nil() {
            self.core.nil_class
        } else if let Some(b) = value.as_bool() {
            if b {
                self.core.true_class
            } else {
                self.core.false_class
            }
        } else if value.is_fixnum() {
            self.core.integer
        } else if value.is_str() {
            self.core.string
        } else if let Some(index) = value.as_object() {
            self.heap.class_of(index).unwrap_or(self.core.object)
        } else {
            self.core.float
        }
    }

    /// Method lookup: walk the superclass chain starting at `start`.
    #[must_use]
    pub fn lookup_method(&self, start: ClassId, name: Symbol) -> Option<Arc<Method>> {
        let mut current = Some(start);
        while let Some(id) = current {
            let class = self.class(id);
            if let Some(method) = class.local_lookup(name) {
                return Some(method);
            }
            current = class.superclass();
        }
        None
    }

    /// The object heap.
    #[inline]
    #[must_use]
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// The global-variable table.
    #[inline]
    #[must_use]
    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    /// The checkpoint invalidator fired at cooperative interrupt points.
    #[inline]
    #[must_use]
    pub fn checkpoint(&self) -> &Arc<Invalidator> {
        &self.checkpoint
    }

    /// The base `Object` class.
    #[inline]
    #[must_use]
    pub fn object_class(&self) -> ClassId {
        self.core.object
    }

    /// The `Integer` class.
    #[inline]
    #[must_use]
    pub fn integer_class(&self) -> ClassId {
        self.core.integer
    }

    /// The runtime-handle singleton value.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Value {
        self.handle
    }

    /// Allocate an array object from its elements.
    #[must_use]
    pub fn new_array(&self, elements: Vec<Value>) -> Value {
        let class = self.class(self.core.array);
        self.heap
            .alloc_with_payload(&class, Payload::Elements(elements))
    }

    /// Allocate a hash object from ordered key/value pairs.
    #[must_use]
    pub fn new_hash(&self, pairs: Vec<(Value, Value)>) -> Value {
        let class = self.class(self.core.hash);
        self.heap.alloc_with_payload(&class, Payload::Pairs(pairs))
    }

    /// Allocate a fresh mutable string object.
    #[must_use]
    pub fn new_string(&self, bytes: Vec<u8>, encoding: &'static str) -> Value {
        let class = self.class(self.core.string);
        self.heap
            .alloc_with_payload(&class, Payload::Text { bytes, encoding })
    }

    /// Resolve an encoding by canonical name or alias.
    #[must_use]
    pub fn find_encoding(name: &str) -> Option<&'static Encoding> {
        ENCODINGS
            .iter()
            .find(|e| e.name == name || e.aliases.contains(&name))
    }

    /// A per-thread execution context.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> Context {
        Context {
            runtime: Arc::clone(self),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// The per-thread view of the runtime, passed as the first argument of
/// every call.
#[derive(Debug, Clone)]
pub struct Context {
    runtime: Arc<Runtime>,
}

impl Context {
    /// The runtime behind this context.
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The nil singleton.
    #[inline]
    #[must_use]
    pub fn nil(&self) -> Value {
        Value::nil()
    }

    /// The true singleton.
    #[inline]
    #[must_use]
    pub fn tru(&self) -> Value {
        Value::bool(true)
    }

    /// The false singleton.
    #[inline]
    #[must_use]
    pub fn fals(&self) -> Value {
        Value::bool(false)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_registers_core_classes() {
        let runtime = Runtime::new();
        let object = runtime.class(runtime.object_class());
        assert_eq!(object.name().resolve(), "Object");
        assert!(object.superclass().is_none());
    }

    #[test]
    fn test_class_of_tagged_values() {
        let runtime = Runtime::new();
        let name = |v: Value| runtime.class(runtime.class_of(v)).name().resolve().to_string();

        assert_eq!(name(Value::nil()), "NilClass");
        assert_eq!(name(Value::bool(true)), "TrueClass");
        assert_eq!(name(Value::bool(false)), "FalseClass");
        assert_eq!(name(Value::fixnum(3).unwrap()), "Integer");
        assert_eq!(name(Value::float(1.5)), "Float");
        assert_eq!(name(Value::str(Symbol::intern("s"))), "String");
    }

    #[test]
    fn test_class_of_heap_object() {
        let runtime = Runtime::new();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);
        assert_eq!(runtime.class_of(obj), class.id());
    }

    #[test]
    fn test_lookup_walks_superclass_chain() {
        let runtime = Runtime::new();
        let parent = runtime.define_class("Parent", None, &[]);
        let child = runtime.define_class("Child", Some(parent.id()), &[]);

        let name = Symbol::intern("inherited");
        parent.define_method(
            name,
            Method::new(
                name,
                parent.id(),
                crate::method::MethodKind::Generic(Arc::new(|_, _, _, _, _, _| {
                    Ok(Value::bool(true))
                })),
            ),
        );

        let found = runtime.lookup_method(child.id(), name).unwrap();
        assert_eq!(found.owner(), parent.id());
        assert!(runtime
            .lookup_method(child.id(), Symbol::intern("missing"))
            .is_none());
    }

    #[test]
    fn test_handle_is_an_object() {
        let runtime = Runtime::new();
        assert!(runtime.handle().is_object());
        assert_eq!(runtime.class_of(runtime.handle()), runtime.object_class());
    }

    #[test]
    fn test_find_encoding() {
        assert_eq!(Runtime::find_encoding("UTF-8").unwrap().name, "UTF-8");
        assert_eq!(Runtime::find_encoding("BINARY").unwrap().name, "ASCII-8BIT");
        assert!(Runtime::find_encoding("KOI8-R").is_none());
    }
}
