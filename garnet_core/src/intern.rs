//! Symbol interning.
//!
//! Method names, field names, and global-variable names are interned once
//! and compared as 32-bit handles afterwards. The interner is global and
//! append-only: a `Symbol` stays valid for the life of the process.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

/// A handle to an interned string.
///
/// Two symbols are equal if and only if they were interned from equal
/// string content; equality is a single integer compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// Intern `s` in the global table, returning its handle.
    #[must_use]
    pub fn intern(s: &str) -> Self {
        global_interner().intern(s)
    }

    /// Resolve this handle back to its string content.
    #[must_use]
    pub fn resolve(self) -> &'static str {
        global_interner().resolve(self)
    }

    /// The raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from its raw value.
    ///
    /// Only meaningful for values previously obtained from [`Symbol::raw`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.resolve())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resolve())
    }
}

/// Thread-safe append-only symbol table.
struct SymbolTable {
    by_value: FxHashMap<&'static str, Symbol>,
    by_index: Vec<&'static str>,
}

/// Global symbol interner.
pub struct Interner {
    inner: RwLock<SymbolTable>,
}

impl Interner {
    fn new() -> Self {
        Self {
            inner: RwLock::new(SymbolTable {
                by_value: FxHashMap::default(),
                by_index: Vec::new(),
            }),
        }
    }

    /// Intern a string, returning the canonical handle for its content.
    pub fn intern(&self, s: &str) -> Symbol {
        if let Some(&sym) = self.inner.read().by_value.get(s) {
            return sym;
        }

        let mut table = self.inner.write();
        // Re-check: another thread may have interned between the locks.
        if let Some(&sym) = table.by_value.get(s) {
            return sym;
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let sym = Symbol(table.by_index.len() as u32);
        table.by_index.push(leaked);
        table.by_value.insert(leaked, sym);
        sym
    }

    /// Resolve a handle to its content.
    ///
    /// # Panics
    /// Panics if the handle did not come from this interner.
    pub fn resolve(&self, sym: Symbol) -> &'static str {
        self.inner.read().by_index[sym.0 as usize]
    }

    /// Look up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.inner.read().by_value.get(s).copied()
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.inner.read().by_index.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL_INTERNER: OnceLock<Interner> = OnceLock::new();

/// The process-wide interner.
#[must_use]
pub fn global_interner() -> &'static Interner {
    GLOBAL_INTERNER.get_or_init(Interner::new)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let a = Symbol::intern("dedup_probe");
        let b = Symbol::intern("dedup_probe");
        assert_eq!(a, b);
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_intern_distinct() {
        let a = Symbol::intern("alpha_probe");
        let b = Symbol::intern("beta_probe");
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve() {
        let sym = Symbol::intern("resolve_probe");
        assert_eq!(sym.resolve(), "resolve_probe");
    }

    #[test]
    fn test_get_without_intern() {
        assert!(global_interner().get("never_interned_probe_xyzzy").is_none());
        let sym = Symbol::intern("get_probe");
        assert_eq!(global_interner().get("get_probe"), Some(sym));
    }

    #[test]
    fn test_raw_roundtrip() {
        let sym = Symbol::intern("raw_probe");
        assert_eq!(Symbol::from_raw(sym.raw()), sym);
    }

    #[test]
    fn test_concurrent_intern_same_content() {
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| Symbol::intern("concurrent_probe")))
            .collect();
        let syms: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(syms.windows(2).all(|w| w[0] == w[1]));
    }
}
