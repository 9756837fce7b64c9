//! Classes, method tables, and field layouts.
//!
//! A [`ClassDef`] owns the two mutable facts dispatch caches specialize
//! against: its method table (guarded by the class's [`Invalidator`],
//! fired after every table mutation is published) and its [`FieldLayout`]
//! (append-only; accessor bindings are immutable once allocated).

use crate::method::Method;
use crate::opto::Invalidator;
use garnet_core::Symbol;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Class identity
// =============================================================================

/// Index of a class in the runtime's class registry.
///
/// Identity comparisons on receivers reduce to comparing these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

// =============================================================================
// Field layout
// =============================================================================

/// Where a named per-object field lives for one concrete layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// A fixed in-object slot, present in every instance.
    InlineField(u16),
    /// A lazily-allocated slot in the instance's dynamic table.
    IndexedSlot(u32),
}

/// An immutable binding from a field name to its storage location.
///
/// Valid only for the layout that allocated it; identically-named fields
/// on other layouts get their own descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorDescriptor {
    /// The field name.
    pub name: Symbol,
    /// The storage location.
    pub kind: AccessorKind,
}

/// Per-class field storage map.
///
/// Fixed inline slots are declared at class creation; any other field name
/// gets an indexed dynamic slot allocated on first write. Allocation is
/// allocate-or-fetch: two threads racing to create the same named accessor
/// observe the same slot.
#[derive(Debug)]
pub struct FieldLayout {
    fixed: Vec<Symbol>,
    dynamic: RwLock<FxHashMap<Symbol, u32>>,
}

impl FieldLayout {
    /// Create a layout with the given fixed inline fields.
    #[must_use]
    pub fn new(fixed: Vec<Symbol>) -> Self {
        Self {
            fixed,
            dynamic: RwLock::new(FxHashMap::default()),
        }
    }

    /// Number of fixed inline slots.
    #[must_use]
    pub fn inline_len(&self) -> usize {
        self.fixed.len()
    }

    /// The accessor for `name`, if the field has ever been bound.
    ///
    /// Never allocates; a name that was never written resolves to `None`.
    #[must_use]
    pub fn accessor_for_read(&self, name: Symbol) -> Option<AccessorDescriptor> {
        if let Some(offset) = self.fixed.iter().position(|&f| f == name) {
            return Some(AccessorDescriptor {
                name,
                kind: AccessorKind::InlineField(offset as u16),
            });
        }
        self.dynamic
            .read()
            .get(&name)
            .map(|&index| AccessorDescriptor {
                name,
                kind: AccessorKind::IndexedSlot(index),
            })
    }

    /// The accessor for `name`, allocating a dynamic slot if needed.
    ///
    /// Idempotent under races; the binding is immutable once made.
    #[must_use]
    pub fn accessor_for_write(&self, name: Symbol) -> AccessorDescriptor {
        if let Some(existing) = self.accessor_for_read(name) {
            return existing;
        }
        let mut dynamic = self.dynamic.write();
        // Re-check: a racing writer may have allocated between the locks.
        let next = dynamic.len() as u32;
        let index = *dynamic.entry(name).or_insert(next);
        AccessorDescriptor {
            name,
            kind: AccessorKind::IndexedSlot(index),
        }
    }
}

// =============================================================================
// Class definition
// =============================================================================

/// One class: a name, a superclass link, a method table, its invalidation
/// token, and the field layout its instances share.
#[derive(Debug)]
pub struct ClassDef {
    id: ClassId,
    name: Symbol,
    superclass: Option<ClassId>,
    methods: RwLock<FxHashMap<Symbol, Arc<Method>>>,
    invalidator: Arc<Invalidator>,
    layout: FieldLayout,
}

impl ClassDef {
    /// Create a class definition. Normally reached through
    /// `Runtime::define_class`.
    #[must_use]
    pub fn new(
        id: ClassId,
        name: Symbol,
        superclass: Option<ClassId>,
        fixed_fields: Vec<Symbol>,
    ) -> Self {
        Self {
            id,
            name,
            superclass,
            methods: RwLock::new(FxHashMap::default()),
            invalidator: Arc::new(Invalidator::new()),
            layout: FieldLayout::new(fixed_fields),
        }
    }

    /// The class's registry id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// The class's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// The superclass, if any.
    #[inline]
    #[must_use]
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    /// The method-table invalidation token holder. Every call site bound
    /// against this class guards on its current token.
    #[inline]
    #[must_use]
    pub fn invalidator(&self) -> &Arc<Invalidator> {
        &self.invalidator
    }

    /// The instance field layout.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Define or redefine a method.
    ///
    /// The table update is published before the invalidator fires, so a
    /// degraded cache re-resolves against the new table.
    pub fn define_method(&self, name: Symbol, method: Arc<Method>) {
        self.methods.write().insert(name, method);
        self.invalidator.fire();
    }

    /// Remove a method. Fires the invalidator if anything was removed.
    pub fn remove_method(&self, name: Symbol) -> bool {
        let removed = self.methods.write().remove(&name).is_some();
        if removed {
            self.invalidator.fire();
        }
        removed
    }

    /// Look up a method in this class only (no superclass walk).
    #[must_use]
    pub fn local_lookup(&self, name: Symbol) -> Option<Arc<Method>> {
        self.methods.read().get(&name).cloned()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{GenericEntry, Method, MethodKind};
    use garnet_core::Value;

    fn stub_method(name: &str, owner: ClassId) -> Arc<Method> {
        let entry: GenericEntry = Arc::new(|_, _, _, _, _, _| Ok(Value::nil()));
        Method::new(Symbol::intern(name), owner, MethodKind::Generic(entry))
    }

    // -------------------------------------------------------------------------
    // FieldLayout Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_layout_fixed_field_resolves_inline() {
        let name = Symbol::intern("@width");
        let layout = FieldLayout::new(vec![name]);

        let acc = layout.accessor_for_read(name).unwrap();
        assert_eq!(acc.kind, AccessorKind::InlineField(0));
        // Write resolution agrees.
        assert_eq!(layout.accessor_for_write(name), acc);
    }

    #[test]
    fn test_layout_unknown_name_reads_none() {
        let layout = FieldLayout::new(vec![]);
        assert!(layout.accessor_for_read(Symbol::intern("@missing")).is_none());
    }

    #[test]
    fn test_layout_dynamic_allocation_is_stable() {
        let layout = FieldLayout::new(vec![]);
        let a = Symbol::intern("@a");
        let b = Symbol::intern("@b");

        let acc_a = layout.accessor_for_write(a);
        let acc_b = layout.accessor_for_write(b);
        assert_eq!(acc_a.kind, AccessorKind::IndexedSlot(0));
        assert_eq!(acc_b.kind, AccessorKind::IndexedSlot(1));

        // Repeated requests return the same binding.
        assert_eq!(layout.accessor_for_write(a), acc_a);
        assert_eq!(layout.accessor_for_read(a), Some(acc_a));
    }

    #[test]
    fn test_layout_not_shared_across_classes() {
        let name = Symbol::intern("@shared_name");
        let layout1 = FieldLayout::new(vec![name]);
        let layout2 = FieldLayout::new(vec![]);

        let acc1 = layout1.accessor_for_write(name);
        let acc2 = layout2.accessor_for_write(name);
        assert_eq!(acc1.kind, AccessorKind::InlineField(0));
        assert_eq!(acc2.kind, AccessorKind::IndexedSlot(0));
    }

    #[test]
    fn test_layout_concurrent_allocation_idempotent() {
        use std::thread;

        let layout = Arc::new(FieldLayout::new(vec![]));
        let name = Symbol::intern("@raced");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let layout = Arc::clone(&layout);
                thread::spawn(move || layout.accessor_for_write(name))
            })
            .collect();

        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(descriptors.windows(2).all(|w| w[0] == w[1]));
    }

    // -------------------------------------------------------------------------
    // ClassDef Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_define_method_fires_invalidator() {
        let class = ClassDef::new(ClassId(1), Symbol::intern("Widget"), None, vec![]);
        let token = class.invalidator().current();

        class.define_method(Symbol::intern("poke"), stub_method("poke", ClassId(1)));

        assert!(!token.is_valid());
        assert!(class.invalidator().current().is_valid());
        assert!(class.local_lookup(Symbol::intern("poke")).is_some());
    }

    #[test]
    fn test_remove_method_fires_only_when_present() {
        let class = ClassDef::new(ClassId(1), Symbol::intern("Widget"), None, vec![]);
        class.define_method(Symbol::intern("poke"), stub_method("poke", ClassId(1)));

        let token = class.invalidator().current();
        assert!(!class.remove_method(Symbol::intern("absent")));
        assert!(token.is_valid());

        assert!(class.remove_method(Symbol::intern("poke")));
        assert!(!token.is_valid());
    }

    #[test]
    fn test_redefinition_replaces_and_fires() {
        let class = ClassDef::new(ClassId(1), Symbol::intern("Widget"), None, vec![]);
        let name = Symbol::intern("poke");

        class.define_method(name, stub_method("poke", ClassId(1)));
        let first = class.local_lookup(name).unwrap();
        let token = class.invalidator().current();

        class.define_method(name, stub_method("poke", ClassId(1)));
        let second = class.local_lookup(name).unwrap();

        assert!(!token.is_valid());
        assert_ne!(first.serial(), second.serial());
    }
}
