//! Global-variable storage.
//!
//! Each global carries its own [`Invalidator`] so read sites can
//! constant-fold the current value; every write goes through
//! [`GlobalVariable::set`], which stores, runs trace observers, then fires
//! the invalidator so all cached readers re-fetch on their next read.

use crate::opto::Invalidator;
use garnet_core::{Symbol, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Observer invoked after each write to a traced global.
pub type TraceFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Visibility scope of a global variable.
///
/// Only process-global variables may be constant-folded by read sites;
/// narrower scopes always use direct lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalScope {
    /// One value for the whole process.
    Global,
    /// Value depends on the executing thread.
    ThreadLocal,
    /// Value depends on the current frame.
    FrameLocal,
}

// =============================================================================
// Global variable
// =============================================================================

/// One named global: storage, scope, invalidation token, and observers.
pub struct GlobalVariable {
    name: Symbol,
    value: RwLock<Value>,
    scope: GlobalScope,
    uncacheable: bool,
    invalidator: Arc<Invalidator>,
    traces: RwLock<Vec<TraceFn>>,
}

impl GlobalVariable {
    /// Create a global with an initial value.
    #[must_use]
    pub fn new(name: Symbol, initial: Value, scope: GlobalScope, uncacheable: bool) -> Self {
        Self {
            name,
            value: RwLock::new(initial),
            scope,
            uncacheable,
            invalidator: Arc::new(Invalidator::new()),
            traces: RwLock::new(Vec::new()),
        }
    }

    /// The variable's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// The variable's scope.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> GlobalScope {
        self.scope
    }

    /// Whether read sites are forbidden from caching this variable.
    #[inline]
    #[must_use]
    pub fn is_uncacheable(&self) -> bool {
        self.uncacheable
    }

    /// The invalidation token holder read sites guard against.
    #[inline]
    #[must_use]
    pub fn invalidator(&self) -> &Arc<Invalidator> {
        &self.invalidator
    }

    /// Direct storage read.
    #[must_use]
    pub fn get(&self) -> Value {
        *self.value.read()
    }

    /// Direct storage write: store, trace, then invalidate cached readers.
    pub fn set(&self, value: Value) {
        *self.value.write() = value;
        for trace in self.traces.read().iter() {
            trace(value);
        }
        self.invalidator.fire();
    }

    /// Register a trace observer, run on every subsequent write.
    pub fn trace(&self, f: TraceFn) {
        self.traces.write().push(f);
    }
}

impl fmt::Debug for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalVariable")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("uncacheable", &self.uncacheable)
            .field("value", &self.get())
            .finish()
    }
}

// =============================================================================
// Global table
// =============================================================================

/// The runtime's global-variable table.
///
/// Lookups auto-vivify: reading an undefined global defines it as nil, so
/// sites always have a variable (and its invalidator) to work against.
#[derive(Debug, Default)]
pub struct GlobalTable {
    vars: RwLock<FxHashMap<Symbol, Arc<GlobalVariable>>>,
}

impl GlobalTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a global with explicit scope and cacheability, replacing any
    /// auto-vivified placeholder.
    pub fn define(
        &self,
        name: Symbol,
        initial: Value,
        scope: GlobalScope,
        uncacheable: bool,
    ) -> Arc<GlobalVariable> {
        let var = Arc::new(GlobalVariable::new(name, initial, scope, uncacheable));
        self.vars.write().insert(name, Arc::clone(&var));
        var
    }

    /// The variable for `name`, defining a nil-valued process-global one if
    /// absent.
    pub fn variable(&self, name: Symbol) -> Arc<GlobalVariable> {
        if let Some(var) = self.vars.read().get(&name) {
            return Arc::clone(var);
        }
        let mut vars = self.vars.write();
        Arc::clone(vars.entry(name).or_insert_with(|| {
            Arc::new(GlobalVariable::new(
                name,
                Value::nil(),
                GlobalScope::Global,
                false,
            ))
        }))
    }

    /// Number of defined globals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
