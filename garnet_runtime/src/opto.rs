//! Invalidation tokens.
//!
//! Every mutable global fact a cache may specialize against (a class's
//! method table, a global variable's value, the runtime checkpoint) owns
//! one [`Invalidator`]. Caches guard their fast paths with the
//! invalidator's *current* [`SwitchPoint`]; firing the invalidator kills
//! every handler guarded by that token at once and hands out a fresh token
//! for subsequent installs.
//!
//! # Memory ordering
//!
//! `SwitchPoint::invalidate` is a `Release` store and `is_valid` an
//! `Acquire` load: once `fire()` returns, every thread observes the fired
//! state on its next guard check. A single in-flight call that loaded the
//! token before the fire may still complete against the old target; that
//! bounded window is tolerated.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// Switch Point
// =============================================================================

/// A one-shot validity token.
///
/// Starts valid; becomes permanently invalid after [`SwitchPoint::invalidate`].
/// Holders share the token by `Arc` and never copy the flag value out.
#[derive(Debug)]
pub struct SwitchPoint {
    invalidated: AtomicBool,
}

impl SwitchPoint {
    /// Create a fresh, valid switch point.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            invalidated: AtomicBool::new(false),
        }
    }

    /// Whether the token is still live.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.invalidated.load(Ordering::Acquire)
    }

    /// Permanently invalidate the token.
    #[inline]
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }
}

impl Default for SwitchPoint {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Invalidator
// =============================================================================

/// A shared invalidation broadcaster for one mutable fact.
///
/// Arbitrarily many caches may guard against the same invalidator; firing
/// it degrades all of them simultaneously and independently (each
/// re-resolves on its own next invocation, not eagerly). A fired
/// invalidator immediately carries a fresh token so re-resolved handlers
/// can re-arm.
#[derive(Debug)]
pub struct Invalidator {
    current: RwLock<Arc<SwitchPoint>>,
    generation: AtomicU64,
}

impl Invalidator {
    /// Create an invalidator with a live initial token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(SwitchPoint::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// The live token guarding the current state of the fact.
    #[must_use]
    pub fn current(&self) -> Arc<SwitchPoint> {
        Arc::clone(&self.current.read())
    }

    /// Invalidate every handler guarded by the current token and install a
    /// fresh token for subsequent installs.
    ///
    /// The old token is invalidated *before* the replacement is published,
    /// so no reader can observe a still-valid stale token after a new one
    /// exists.
    pub fn fire(&self) {
        let mut slot = self.current.write();
        slot.invalidate();
        *slot = Arc::new(SwitchPoint::new());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!("invalidator fired, generation {generation}");
    }

    /// How many times this invalidator has fired. Diagnostic only.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for Invalidator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
