//! Call sites.
//!
//! An [`InvokeSite`] is the mutable dispatch cell embedded in generated
//! code. It starts uninitialized; the first traversal resolves the target
//! method, asks the resolver for the cheapest compatible handler, and
//! installs it behind a guard (receiver class identity plus the
//! method-table tokens of every class walked during lookup). A failed
//! guard re-enters the fallback, which re-resolves and re-installs; past
//! the re-link budget the site permanently reverts to generic dispatch.
//!
//! ```text
//! Uninitialized ──► Specialized ◄──► Generic ──► Megamorphic (terminal)
//! ```
//!
//! Handler installation is a reference swap under an uncontended lock;
//! racing resolvers both produce valid handlers and the losing result is
//! simply discarded.

use crate::config::options;
use crate::resolver;
use garnet_core::{GarnetError, SiteArity, Symbol, Value};
use garnet_runtime::class::ClassId;
use garnet_runtime::method::{CallResult, DynCall};
use garnet_runtime::opto::SwitchPoint;
use garnet_runtime::{Block, Context, Runtime};
use log::debug;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

// =============================================================================
// Site state
// =============================================================================

/// The state of a call-site cache cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SiteState {
    /// No handler installed; next traversal bootstraps.
    Uninitialized = 0,
    /// A guarded specialized handler is installed.
    Specialized = 1,
    /// A guarded generic handler is installed (specialization did not
    /// apply to the resolved method).
    Generic = 2,
    /// Re-link budget exhausted; permanently unguarded generic dispatch.
    Megamorphic = 3,
}

impl SiteState {
    /// Convert from the raw atomic value.
    #[inline]
    #[must_use]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Specialized,
            2 => Self::Generic,
            _ => Self::Megamorphic,
        }
    }

    /// Whether this site may still install specialized handlers.
    #[inline]
    #[must_use]
    pub const fn can_specialize(self) -> bool {
        !matches!(self, Self::Megamorphic)
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// The immutable identity of a call site: its method name and declared
/// arity (with block bit). Produced once by the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSiteDescriptor {
    name: Symbol,
    arity: SiteArity,
}

impl CallSiteDescriptor {
    /// Build a descriptor.
    #[must_use]
    pub const fn new(name: Symbol, arity: SiteArity) -> Self {
        Self { name, arity }
    }

    /// The method name dispatched by the site.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> Symbol {
        self.name
    }

    /// The declared site arity.
    #[inline]
    #[must_use]
    pub const fn arity(&self) -> SiteArity {
        self.arity
    }
}

/// How the site resolves its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Resolve from the receiver's class.
    Normal,
    /// Resolve from the superclass of a fixed owning class.
    Super {
        /// The class lexically containing the super call.
        owner: ClassId,
    },
}

// =============================================================================
// Invoke site
// =============================================================================

/// One inline-cache dispatch cell.
pub struct InvokeSite {
    descriptor: CallSiteDescriptor,
    mode: LookupMode,
    state: AtomicU8,
    relinks: AtomicU32,
    max_relinks: u32,
    target: RwLock<Option<DynCall>>,
    // Installed guards point back here to re-enter the fallback.
    self_ref: Weak<InvokeSite>,
}

impl std::fmt::Debug for InvokeSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeSite")
            .field("descriptor", &self.descriptor)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("relinks", &self.relinks)
            .field("max_relinks", &self.max_relinks)
            .field("target_installed", &self.target.read().is_some())
            .finish()
    }
}

impl InvokeSite {
    /// A plain dispatch site with the configured re-link budget.
    #[must_use]
    pub fn new(name: Symbol, arity: SiteArity) -> Arc<Self> {
        Self::with_mode(
            CallSiteDescriptor::new(name, arity),
            LookupMode::Normal,
            options().site_max_failures,
        )
    }

    /// A super-call dispatch site.
    #[must_use]
    pub fn new_super(name: Symbol, arity: SiteArity, owner: ClassId) -> Arc<Self> {
        Self::with_mode(
            CallSiteDescriptor::new(name, arity),
            LookupMode::Super { owner },
            options().site_max_failures,
        )
    }

    /// Full-control constructor.
    #[must_use]
    pub fn with_mode(
        descriptor: CallSiteDescriptor,
        mode: LookupMode,
        max_relinks: u32,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            descriptor,
            mode,
            state: AtomicU8::new(SiteState::Uninitialized as u8),
            relinks: AtomicU32::new(0),
            max_relinks,
            target: RwLock::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// The site's descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &CallSiteDescriptor {
        &self.descriptor
    }

    /// Current cache state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SiteState {
        SiteState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// How many times the site has entered its fallback.
    #[inline]
    #[must_use]
    pub fn relinks(&self) -> u32 {
        self.relinks.load(Ordering::Acquire)
    }

    /// Dispatch through the cache cell.
    pub fn invoke(
        &self,
        ctx: &Context,
        recv: Value,
        args: &[Value],
        block: &Block,
    ) -> CallResult {
        let target = self.target.read().clone();
        match target {
            Some(handler) => handler(ctx, recv, args, block),
            None => self.fallback(ctx, recv, args, block),
        }
    }

    /// Re-resolve and re-install; the bootstrap target of every cell.
    fn fallback(
        &self,
        ctx: &Context,
        recv: Value,
        args: &[Value],
        block: &Block,
    ) -> CallResult {
        let name = self.descriptor.name();
        let mode = self.mode;

        let relinks = self.relinks.fetch_add(1, Ordering::AcqRel) + 1;
        if relinks > self.max_relinks {
            let slow: DynCall = Arc::new(move |ctx, recv, args, block| {
                slow_dispatch(ctx, name, mode, recv, args, block)
            });
            self.install(Arc::clone(&slow), SiteState::Megamorphic);
            if options().log_binding {
                debug!("{name}\texceeded re-link budget, reverting to generic dispatch");
            }
            return slow(ctx, recv, args, block);
        }

        let runtime = ctx.runtime();
        let recv_class = runtime.class_of(recv);
        let (start, guard_class) = match mode {
            LookupMode::Normal => (recv_class, Some(recv_class)),
            LookupMode::Super { owner } => {
                let Some(superclass) = runtime.class(owner).superclass() else {
                    return Err(no_method(ctx, name, recv));
                };
                (superclass, None)
            }
        };
        let Some(method) = runtime.lookup_method(start, name) else {
            return Err(no_method(ctx, name, recv));
        };

        let (inner, state) = match resolver::bind(ctx, &self.descriptor, &method, start) {
            Some(handler) => (handler, SiteState::Specialized),
            None => (
                resolver::generic_binding(&self.descriptor, &method, start),
                SiteState::Generic,
            ),
        };

        let tokens = collect_guard_tokens(runtime, start, method.owner());
        let guarded = guard(
            self.self_ref.clone(),
            guard_class,
            tokens,
            Arc::clone(&inner),
            name,
            mode,
        );
        self.install(guarded, state);

        inner(ctx, recv, args, block)
    }

    /// Swap in a new handler. Megamorphic is terminal: once entered, a
    /// racing specialization loses.
    fn install(&self, handler: DynCall, new_state: SiteState) {
        let mut slot = self.target.write();
        if self.state() == SiteState::Megamorphic && new_state != SiteState::Megamorphic {
            return;
        }
        *slot = Some(handler);
        self.state.store(new_state as u8, Ordering::Release);
    }
}

/// Collect the method-table tokens of every class walked from `from` down
/// to the defining class. A specialized handler stays valid only while
/// all of them hold.
fn collect_guard_tokens(
    runtime: &Runtime,
    from: ClassId,
    owner: ClassId,
) -> SmallVec<[Arc<SwitchPoint>; 2]> {
    let mut tokens = SmallVec::new();
    let mut current = Some(from);
    while let Some(id) = current {
        let class = runtime.class(id);
        tokens.push(class.invalidator().current());
        if id == owner {
            break;
        }
        current = class.superclass();
    }
    tokens
}

/// Wrap a handler with its validity guard. A failed guard transfers
/// control back to the owning site's fallback.
fn guard(
    site: Weak<InvokeSite>,
    expected: Option<ClassId>,
    tokens: SmallVec<[Arc<SwitchPoint>; 2]>,
    inner: DynCall,
    name: Symbol,
    mode: LookupMode,
) -> DynCall {
    Arc::new(move |ctx, recv, args, block| {
        let live = tokens.iter().all(|t| t.is_valid())
            && expected.is_none_or(|class| ctx.runtime().class_of(recv) == class);
        if live {
            inner(ctx, recv, args, block)
        } else if let Some(site) = site.upgrade() {
            site.fallback(ctx, recv, args, block)
        } else {
            slow_dispatch(ctx, name, mode, recv, args, block)
        }
    })
}

/// The always-correct slow path: full lookup plus the uniform virtual
/// entry. What a megamorphic cell runs forever.
fn slow_dispatch(
    ctx: &Context,
    name: Symbol,
    mode: LookupMode,
    recv: Value,
    args: &[Value],
    block: &Block,
) -> CallResult {
    let runtime = ctx.runtime();
    let start = match mode {
        LookupMode::Normal => runtime.class_of(recv),
        LookupMode::Super { owner } => match runtime.class(owner).superclass() {
            Some(superclass) => superclass,
            None => return Err(no_method(ctx, name, recv)),
        },
    };
    match runtime.lookup_method(start, name) {
        Some(method) => method.call(ctx, start, name, recv, args, block),
        None => Err(no_method(ctx, name, recv)),
    }
}

fn no_method(ctx: &Context, name: Symbol, recv: Value) -> GarnetError {
    let class = ctx.runtime().class(ctx.runtime().class_of(recv));
    GarnetError::NoMethod {
        name: name.resolve().to_string(),
        receiver_class: class.name().resolve().to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_runtime::method::{GenericEntry, Method, MethodKind};
    use garnet_runtime::{ClassDef, Runtime};
    use std::sync::atomic::AtomicU64;

    fn define_counting_method(
        class: &ClassDef,
        name: &str,
        result: Value,
    ) -> Arc<AtomicU64> {
        let calls = Arc::new(AtomicU64::new(0));
        let calls_inner = Arc::clone(&calls);
        let entry: GenericEntry = Arc::new(move |_, _, _, _, _, _| {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        });
        let sym = Symbol::intern(name);
        class.define_method(sym, Method::new(sym, class.id(), MethodKind::Generic(entry)));
        calls
    }

    #[test]
    fn test_site_starts_uninitialized() {
        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));
        assert_eq!(site.state(), SiteState::Uninitialized);
        assert_eq!(site.relinks(), 0);
    }

    #[test]
    fn test_first_invoke_installs_handler() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);
        define_counting_method(&class, "poke", Value::bool(true));

        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));
        let out = site.invoke(&ctx, obj, &[], &Block::none()).unwrap();

        assert_eq!(out, Value::bool(true));
        // Generic-kind methods get the guarded generic binding.
        assert_eq!(site.state(), SiteState::Generic);
        assert_eq!(site.relinks(), 1);

        // Second traversal goes through the installed handler.
        site.invoke(&ctx, obj, &[], &Block::none()).unwrap();
        assert_eq!(site.relinks(), 1);
    }

    #[test]
    fn test_missing_method_is_no_method_error() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);

        let site = InvokeSite::new(Symbol::intern("absent"), SiteArity::fixed(0, false));
        let err = site.invoke(&ctx, obj, &[], &Block::none()).unwrap_err();
        assert!(matches!(err, GarnetError::NoMethod { .. }));
    }

    #[test]
    fn test_redefinition_relinks_to_new_method() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);

        define_counting_method(&class, "poke", Value::fixnum(1).unwrap());
        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));
        assert_eq!(
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap(),
            Value::fixnum(1).unwrap()
        );

        // Redefine: the installed guard must observe the fired token.
        define_counting_method(&class, "poke", Value::fixnum(2).unwrap());
        assert_eq!(
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap(),
            Value::fixnum(2).unwrap()
        );
        assert_eq!(site.relinks(), 2);
    }

    #[test]
    fn test_superclass_definition_is_guarded_too() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let parent = runtime.define_class("Parent", None, &[]);
        let child = runtime.define_class("Child", Some(parent.id()), &[]);
        let obj = runtime.heap().alloc(&child);

        define_counting_method(&parent, "poke", Value::fixnum(1).unwrap());
        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));
        assert_eq!(
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap(),
            Value::fixnum(1).unwrap()
        );

        // Shadowing in the subclass must degrade the cached parent binding.
        define_counting_method(&child, "poke", Value::fixnum(2).unwrap());
        assert_eq!(
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap(),
            Value::fixnum(2).unwrap()
        );
    }

    #[test]
    fn test_receiver_class_change_relinks() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let a = runtime.define_class("A", None, &[]);
        let b = runtime.define_class("B", None, &[]);
        let obj_a = runtime.heap().alloc(&a);
        let obj_b = runtime.heap().alloc(&b);

        define_counting_method(&a, "poke", Value::fixnum(1).unwrap());
        define_counting_method(&b, "poke", Value::fixnum(2).unwrap());

        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));
        assert_eq!(
            site.invoke(&ctx, obj_a, &[], &Block::none()).unwrap(),
            Value::fixnum(1).unwrap()
        );
        assert_eq!(
            site.invoke(&ctx, obj_b, &[], &Block::none()).unwrap(),
            Value::fixnum(2).unwrap()
        );
        assert_eq!(site.relinks(), 2);
    }

    #[test]
    fn test_budget_exhaustion_goes_megamorphic() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);
        define_counting_method(&class, "poke", Value::nil());

        let site = InvokeSite::with_mode(
            CallSiteDescriptor::new(Symbol::intern("poke"), SiteArity::fixed(0, false)),
            LookupMode::Normal,
            2,
        );

        for _ in 0..4 {
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap();
            class.invalidator().fire();
        }

        assert_eq!(site.state(), SiteState::Megamorphic);
        assert!(!site.state().can_specialize());
        let relinks_at_degrade = site.relinks();

        // Further invalidations no longer re-enter the fallback.
        class.invalidator().fire();
        site.invoke(&ctx, obj, &[], &Block::none()).unwrap();
        assert_eq!(site.relinks(), relinks_at_degrade);
    }

    #[test]
    fn test_super_site_resolves_parent_method() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let parent = runtime.define_class("Parent", None, &[]);
        let child = runtime.define_class("Child", Some(parent.id()), &[]);
        let obj = runtime.heap().alloc(&child);

        define_counting_method(&parent, "poke", Value::fixnum(10).unwrap());
        // The child's own definition must not shadow a super call.
        define_counting_method(&child, "poke", Value::fixnum(20).unwrap());

        let site = InvokeSite::new_super(
            Symbol::intern("poke"),
            SiteArity::fixed(0, false),
            child.id(),
        );
        assert_eq!(
            site.invoke(&ctx, obj, &[], &Block::none()).unwrap(),
            Value::fixnum(10).unwrap()
        );
    }

    #[test]
    fn test_concurrent_first_resolution() {
        use std::thread;

        let runtime = Runtime::new();
        let class = runtime.define_class("Widget", None, &[]);
        let obj = runtime.heap().alloc(&class);
        define_counting_method(&class, "poke", Value::bool(true));

        let site = InvokeSite::new(Symbol::intern("poke"), SiteArity::fixed(0, false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                let site = Arc::clone(&site);
                thread::spawn(move || {
                    let ctx = runtime.context();
                    site.invoke(&ctx, obj, &[], &Block::none()).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Value::bool(true));
        }
        assert_ne!(site.state(), SiteState::Uninitialized);
    }
}
