//! Global-variable, constant, and checkpoint sites.
//!
//! Reads of a stable global constant-fold to its value behind the
//! variable's invalidation token; writes always go through direct storage
//! (store, trace, fire). A read site that keeps failing validation, or
//! targets an uncacheable or non-process-global variable, permanently
//! reverts to direct lookup. Constant sites fold runtime singletons on
//! first traversal; checkpoint sites are a guarded no-op that re-arms
//! after every checkpoint fire.

use crate::config::options;
use garnet_core::{Symbol, Value};
use garnet_runtime::globals::GlobalScope;
use garnet_runtime::opto::SwitchPoint;
use garnet_runtime::Context;
use log::debug;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Global read site
// =============================================================================

#[derive(Debug)]
enum ReadState {
    /// Nothing bound yet.
    Unbound,
    /// Constant-folded value, valid while the token holds.
    Cached {
        value: Value,
        token: Arc<SwitchPoint>,
    },
    /// Permanently direct lookup. Terminal.
    Direct,
}

/// A cached global-variable read.
#[derive(Debug)]
pub struct GlobalReadSite {
    name: Symbol,
    file: String,
    line: u32,
    state: RwLock<ReadState>,
    failures: AtomicU32,
    max_failures: u32,
}

impl GlobalReadSite {
    /// Create a read site with the configured failure budget.
    #[must_use]
    pub fn new(name: Symbol, file: &str, line: u32) -> Arc<Self> {
        Self::with_budget(name, file, line, options().global_max_failures)
    }

    /// Create a read site with an explicit failure budget.
    #[must_use]
    pub fn with_budget(name: Symbol, file: &str, line: u32, max_failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            file: file.to_string(),
            line,
            state: RwLock::new(ReadState::Unbound),
            failures: AtomicU32::new(0),
            max_failures,
        })
    }

    /// The variable name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// How many times the site has re-entered its fallback.
    #[inline]
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Whether the site has permanently reverted to direct lookup.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(&*self.state.read(), ReadState::Direct)
    }

    /// Whether a constant-folded value is currently installed.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(&*self.state.read(), ReadState::Cached { .. })
    }

    /// Read the global through the cache.
    pub fn read(&self, ctx: &Context) -> Value {
        enum FastPath {
            Hit(Value),
            Direct,
            Miss,
        }

        let fast = {
            let state = self.state.read();
            match &*state {
                ReadState::Cached { value, token } if token.is_valid() => FastPath::Hit(*value),
                ReadState::Direct => FastPath::Direct,
                _ => FastPath::Miss,
            }
        };

        match fast {
            FastPath::Hit(value) => value,
            FastPath::Direct => self.direct(ctx),
            FastPath::Miss => self.fallback(ctx),
        }
    }

    fn direct(&self, ctx: &Context) -> Value {
        ctx.runtime().globals().variable(self.name).get()
    }

    fn fallback(&self, ctx: &Context) -> Value {
        let variable = ctx.runtime().globals().variable(self.name);
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;

        if failures > self.max_failures
            || variable.scope() != GlobalScope::Global
            || variable.is_uncacheable()
        {
            if options().log_binding {
                debug!(
                    "global {} ({}:{}) uncacheable or rebound > {} times, reverting to simple lookup",
                    self.name, self.file, self.line, self.max_failures
                );
            }
            *self.state.write() = ReadState::Direct;
            return variable.get();
        }

        // Token first, then value: a write racing between the two fires
        // the fetched token and forces a refetch, never a stale cache.
        let token = variable.invalidator().current();
        let value = variable.get();
        *self.state.write() = ReadState::Cached { value, token };
        value
    }
}

// =============================================================================
// Global write site
// =============================================================================

/// A global-variable write. Never cached: store, trace, invalidate.
#[derive(Debug)]
pub struct GlobalWriteSite {
    name: Symbol,
}

impl GlobalWriteSite {
    /// Create a write site.
    #[must_use]
    pub fn new(name: Symbol) -> Arc<Self> {
        Arc::new(Self { name })
    }

    /// The variable name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Write the global: direct storage mutation, then trace observers,
    /// then fire the variable's invalidator so all readers re-fetch.
    pub fn write(&self, ctx: &Context, value: Value) {
        ctx.runtime().globals().variable(self.name).set(value);
    }
}

// =============================================================================
// Constant site
// =============================================================================

/// Which runtime singleton a constant site folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeConstant {
    /// The nil singleton.
    Nil,
    /// The true singleton.
    True,
    /// The false singleton.
    False,
    /// The runtime-handle object.
    Runtime,
}

/// A constant-folded singleton fetch. Folds on first traversal.
#[derive(Debug)]
pub struct ConstantSite {
    kind: RuntimeConstant,
    cached: OnceLock<Value>,
}

impl ConstantSite {
    /// Create a site for the given singleton.
    #[must_use]
    pub fn new(kind: RuntimeConstant) -> Self {
        Self {
            kind,
            cached: OnceLock::new(),
        }
    }

    /// The folded singleton.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RuntimeConstant {
        self.kind
    }

    /// Fetch the singleton, folding it on first traversal.
    pub fn fetch(&self, ctx: &Context) -> Value {
        *self.cached.get_or_init(|| match self.kind {
            RuntimeConstant::Nil => ctx.nil(),
            RuntimeConstant::True => ctx.tru(),
            RuntimeConstant::False => ctx.fals(),
            RuntimeConstant::Runtime => ctx.runtime().handle(),
        })
    }
}

// =============================================================================
// Checkpoint site
// =============================================================================

/// A cooperative interrupt check.
///
/// While the runtime checkpoint token holds, traversal is a no-op. Firing
/// the checkpoint degrades every site at once; each re-arms against the
/// fresh token on its next traversal.
#[derive(Debug)]
pub struct CheckpointSite {
    token: RwLock<Option<Arc<SwitchPoint>>>,
    relinks: AtomicU64,
}

impl CheckpointSite {
    /// Create an unarmed checkpoint site.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: RwLock::new(None),
            relinks: AtomicU64::new(0),
        })
    }

    /// How many times the site has re-armed.
    #[inline]
    #[must_use]
    pub fn relinks(&self) -> u64 {
        self.relinks.load(Ordering::Acquire)
    }

    /// Traverse the checkpoint.
    pub fn traverse(&self, ctx: &Context) {
        {
            let token = self.token.read();
            if let Some(token) = &*token {
                if token.is_valid() {
                    return;
                }
            }
        }
        self.fallback(ctx);
    }

    fn fallback(&self, ctx: &Context) {
        self.relinks.fetch_add(1, Ordering::AcqRel);
        *self.token.write() = Some(ctx.runtime().checkpoint().current());
    }
}

// =============================================================================
// Tests
// =============================================================================
