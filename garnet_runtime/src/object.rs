//! Object heap and per-instance field storage.
//!
//! Instances carry two field regions matching their class's
//! [`FieldLayout`](crate::class::FieldLayout): a fixed inline region sized
//! at allocation and a dynamic region grown on demand. Reads of slots that
//! were never written surface as `None`; nil-coalescing is the accessor
//! layer's job, not the heap's.

use crate::class::{AccessorDescriptor, AccessorKind, ClassDef, ClassId};
use garnet_core::Value;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

// =============================================================================
// Instance
// =============================================================================

#[derive(Debug)]
struct InstanceFields {
    inline: Vec<Option<Value>>,
    dynamic: Vec<Option<Value>>,
}

/// Built-in data carried by container and string instances.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A plain object with named fields only.
    Empty,
    /// Array elements.
    Elements(Vec<Value>),
    /// Hash key/value pairs, in insertion order.
    Pairs(Vec<(Value, Value)>),
    /// String content with its encoding's canonical name.
    Text {
        /// Raw byte content.
        bytes: Vec<u8>,
        /// Canonical encoding name.
        encoding: &'static str,
    },
}

/// One heap object.
#[derive(Debug)]
pub struct Instance {
    class: ClassId,
    fields: Mutex<InstanceFields>,
    payload: Mutex<Payload>,
}

impl Instance {
    fn new(class: ClassId, inline_len: usize, payload: Payload) -> Self {
        Self {
            class,
            fields: Mutex::new(InstanceFields {
                inline: vec![None; inline_len],
                dynamic: Vec::new(),
            }),
            payload: Mutex::new(payload),
        }
    }

    /// Inspect the built-in payload.
    pub fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> R) -> R {
        f(&self.payload.lock())
    }

    /// The instance's class.
    #[inline]
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Read the field the accessor points at. `None` if never written.
    #[must_use]
    pub fn read(&self, accessor: &AccessorDescriptor) -> Option<Value> {
        let fields = self.fields.lock();
        match accessor.kind {
            AccessorKind::InlineField(offset) => {
                fields.inline.get(offset as usize).copied().flatten()
            }
            AccessorKind::IndexedSlot(index) => {
                fields.dynamic.get(index as usize).copied().flatten()
            }
        }
    }

    /// Store into the field the accessor points at, growing the dynamic
    /// region when needed.
    pub fn write(&self, accessor: &AccessorDescriptor, value: Value) {
        let mut fields = self.fields.lock();
        match accessor.kind {
            AccessorKind::InlineField(offset) => {
                let offset = offset as usize;
                if offset < fields.inline.len() {
                    fields.inline[offset] = Some(value);
                }
            }
            AccessorKind::IndexedSlot(index) => {
                let index = index as usize;
                if index >= fields.dynamic.len() {
                    fields.dynamic.resize(index + 1, None);
                }
                fields.dynamic[index] = Some(value);
            }
        }
    }
}

// =============================================================================
// Heap
// =============================================================================

/// The process-lifetime object table.
///
/// Indices are stable; nothing is ever collected.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    objects: RwLock<Vec<Arc<Instance>>>,
}

impl ObjectHeap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an instance of `class`, returning its tagged value.
    #[must_use]
    pub fn alloc(&self, class: &ClassDef) -> Value {
        self.alloc_with_payload(class, Payload::Empty)
    }

    /// Allocate an instance carrying a built-in payload.
    #[must_use]
    pub fn alloc_with_payload(&self, class: &ClassDef, payload: Payload) -> Value {
        let instance = Arc::new(Instance::new(
            class.id(),
            class.layout().inline_len(),
            payload,
        ));
        let mut objects = self.objects.write();
        let index = objects.len() as u64;
        objects.push(instance);
        Value::object(index)
    }

    /// The instance behind a heap index.
    #[must_use]
    pub fn instance(&self, index: u64) -> Option<Arc<Instance>> {
        self.objects.read().get(index as usize).cloned()
    }

    /// The class of the object at `index`.
    #[must_use]
    pub fn class_of(&self, index: u64) -> Option<ClassId> {
        self.objects.read().get(index as usize).map(|i| i.class())
    }

    /// Read a field through its accessor. `None` for unknown objects and
    /// never-written slots.
    #[must_use]
    pub fn read(&self, index: u64, accessor: &AccessorDescriptor) -> Option<Value> {
        self.instance(index).and_then(|i| i.read(accessor))
    }

    /// Write a field through its accessor. Writes to unknown objects are
    /// dropped.
    pub fn write(&self, index: u64, accessor: &AccessorDescriptor, value: Value) {
        if let Some(instance) = self.instance(index) {
            instance.write(accessor, value);
        }
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
