//! Attribute access: bound handlers and per-site caches.
//!
//! Two consumers share this module. The resolver binds attribute *methods*
//! (pure field readers/writers) straight to storage accessors, bypassing
//! all dispatch machinery. The `get:@x` / `set:@x` bootstraps produce
//! [`VariableSite`]s: per-site caches mapping a receiver's concrete class
//! to the field's storage location, guarded by type identity and bounded
//! by a shape budget beyond which the site goes permanently uncached.

use crate::config::options;
use garnet_core::{GarnetError, Symbol, Value};
use garnet_runtime::class::{AccessorDescriptor, ClassDef, ClassId};
use garnet_runtime::method::{CallResult, DynCall};
use garnet_runtime::Context;
use log::debug;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Bound attribute handlers
// =============================================================================

/// Bind a field reader straight to its storage accessor.
///
/// The accessor is materialized eagerly (through the write-side lookup) so
/// an uninitialized placeholder is never cached. Reads of unset fields
/// nil-coalesce.
#[must_use]
pub fn attribute_reader_handler(class: &ClassDef, variable: Symbol) -> DynCall {
    let accessor = class.layout().accessor_for_write(variable);
    Arc::new(move |ctx, recv, _args, _block| Ok(read_through(ctx, recv, &accessor)))
}

/// Bind a field writer straight to its storage accessor.
///
/// The stored value is discarded; a write always yields nil.
#[must_use]
pub fn attribute_writer_handler(class: &ClassDef, variable: Symbol) -> DynCall {
    let accessor = class.layout().accessor_for_write(variable);
    Arc::new(move |ctx, recv, args, _block| {
        let &[value] = args else {
            return Err(GarnetError::Argument {
                given: args.len(),
                expected: "1".to_string(),
            });
        };
        write_through(ctx, recv, &accessor, value)
    })
}

fn read_through(ctx: &Context, recv: Value, accessor: &AccessorDescriptor) -> Value {
    match recv.as_object() {
        Some(index) => ctx
            .runtime()
            .heap()
            .read(index, accessor)
            .unwrap_or_else(Value::nil),
        None => Value::nil(),
    }
}

fn write_through(
    ctx: &Context,
    recv: Value,
    accessor: &AccessorDescriptor,
    value: Value,
) -> CallResult {
    match recv.as_object() {
        Some(index) => {
            ctx.runtime().heap().write(index, accessor, value);
            Ok(Value::nil())
        }
        None => {
            let class = ctx.runtime().class(ctx.runtime().class_of(recv));
            Err(GarnetError::Frozen {
                kind: class.name().resolve().to_string(),
            })
        }
    }
}

// =============================================================================
// Variable site
// =============================================================================

/// Whether a variable site reads or writes its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOp {
    /// `get:@x`
    Get,
    /// `set:@x`
    Set,
}

/// A per-object field access site.
///
/// Caches `(class, accessor)` pairs up to a bounded chain depth; each
/// entry is valid only for its exact class. Past the budget the site
/// stops caching permanently and performs direct layout lookups.
#[derive(Debug)]
pub struct VariableSite {
    name: Symbol,
    op: VariableOp,
    chain: RwLock<SmallVec<[(ClassId, AccessorDescriptor); 4]>>,
    uncached: AtomicBool,
    max_depth: usize,
}

impl VariableSite {
    /// Create a site for `name` with the configured shape budget.
    #[must_use]
    pub fn new(name: Symbol, op: VariableOp) -> Arc<Self> {
        Self::with_depth(name, op, options().attribute_chain_depth)
    }

    /// Create a site with an explicit shape budget.
    #[must_use]
    pub fn with_depth(name: Symbol, op: VariableOp, max_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            op,
            chain: RwLock::new(SmallVec::new()),
            uncached: AtomicBool::new(false),
            max_depth,
        })
    }

    /// The field name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Read or write.
    #[inline]
    #[must_use]
    pub fn op(&self) -> VariableOp {
        self.op
    }

    /// Whether the site has permanently stopped caching.
    #[inline]
    #[must_use]
    pub fn is_uncached(&self) -> bool {
        self.uncached.load(Ordering::Acquire)
    }

    /// Number of class shapes currently cached.
    #[must_use]
    pub fn cached_shapes(&self) -> usize {
        self.chain.read().len()
    }

    /// Read the field from `recv`. Unset fields and field-less receivers
    /// read as nil.
    pub fn get(&self, ctx: &Context, recv: Value) -> Value {
        if recv.as_object().is_none() {
            return Value::nil();
        }

        if self.is_uncached() {
            let class = ctx.runtime().class(ctx.runtime().class_of(recv));
            return match class.layout().accessor_for_read(self.name) {
                Some(accessor) => read_through(ctx, recv, &accessor),
                None => Value::nil(),
            };
        }

        let accessor = self.accessor_for(ctx, recv);
        read_through(ctx, recv, &accessor)
    }

    /// Store into the field on `recv`, yielding nil.
    pub fn set(&self, ctx: &Context, recv: Value, value: Value) -> CallResult {
        if recv.as_object().is_none() {
            let class = ctx.runtime().class(ctx.runtime().class_of(recv));
            return Err(GarnetError::Frozen {
                kind: class.name().resolve().to_string(),
            });
        }

        if self.is_uncached() {
            let class = ctx.runtime().class(ctx.runtime().class_of(recv));
            let accessor = class.layout().accessor_for_write(self.name);
            return write_through(ctx, recv, &accessor, value);
        }

        let accessor = self.accessor_for(ctx, recv);
        write_through(ctx, recv, &accessor, value)
    }

    /// The cached accessor for the receiver's class, extending the chain
    /// (or degrading the site) on a miss.
    fn accessor_for(&self, ctx: &Context, recv: Value) -> AccessorDescriptor {
        let class_id = ctx.runtime().class_of(recv);

        if let Some(hit) = self
            .chain
            .read()
            .iter()
            .find(|(id, _)| *id == class_id)
            .map(|(_, acc)| *acc)
        {
            return hit;
        }

        // Materialize eagerly so the chain never caches a placeholder.
        let class = ctx.runtime().class(class_id);
        let accessor = class.layout().accessor_for_write(self.name);

        let mut chain = self.chain.write();
        if let Some(hit) = chain.iter().find(|(id, _)| *id == class_id) {
            return hit.1;
        }
        if chain.len() >= self.max_depth {
            self.uncached.store(true, Ordering::Release);
            if options().log_binding {
                debug!(
                    "variable {} saw more than {} shapes, reverting to direct lookup",
                    self.name, self.max_depth
                );
            }
        } else {
            chain.push((class_id, accessor));
        }
        accessor
    }
}

// =============================================================================
// Tests
// =============================================================================
