//! Block (closure) arguments.
//!
//! Call sites pass a [`Block`] alongside positional arguments; sites with
//! no block literal pass [`Block::none`], the missing-block sentinel the
//! dispatch engine inserts when adapting entries that demand one. A live
//! block pairs a compiled body with the [`Binding`] captured where the
//! literal appeared (frame + scope).

use crate::context::Context;
use crate::method::{CallResult, StaticScope};
use garnet_core::{Arity, Value};
use std::fmt;
use std::sync::Arc;

/// A compiled block body: `(context, binding, args)`.
pub type BlockFn = Arc<dyn Fn(&Context, &Binding, &[Value]) -> CallResult + Send + Sync>;

// =============================================================================
// Binding
// =============================================================================

/// The caller frame a block captures.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// The `self` at the capture point.
    pub self_value: Value,
}

impl Frame {
    /// Capture a frame around `self_value`.
    #[must_use]
    pub const fn capture(self_value: Value) -> Self {
        Self { self_value }
    }
}

/// What a block closes over: the captured frame and the lexical scope.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The captured frame.
    pub frame: Frame,
    /// The lexical scope at the capture point.
    pub scope: Arc<StaticScope>,
}

impl Binding {
    /// The frame-and-scope binding every block literal captures.
    #[must_use]
    pub fn frame_scope(self_value: Value, scope: Arc<StaticScope>) -> Self {
        Self {
            frame: Frame::capture(self_value),
            scope,
        }
    }
}

// =============================================================================
// Block
// =============================================================================

/// A compiled block body with its declared arity.
pub struct BlockBody {
    body: BlockFn,
    arity: Arity,
}

impl BlockBody {
    /// Wrap a compiled body.
    #[must_use]
    pub fn new(body: BlockFn, arity: Arity) -> Self {
        Self { body, arity }
    }

    /// The declared arity.
    #[must_use]
    pub fn arity(&self) -> Arity {
        self.arity
    }
}

impl fmt::Debug for BlockBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBody")
            .field("arity", &self.arity)
            .finish()
    }
}

#[derive(Debug)]
struct BlockData {
    body: Arc<BlockBody>,
    binding: Binding,
}

/// An optional block argument.
///
/// `Block::none()` is the sentinel for "no block given"; it is what the
/// dispatch engine supplies when a site without a block literal binds an
/// entry that takes one.
#[derive(Debug, Clone, Default)]
pub struct Block(Option<Arc<BlockData>>);

impl Block {
    /// The missing-block sentinel.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// A live block from a body and its captured binding.
    #[must_use]
    pub fn new(body: Arc<BlockBody>, binding: Binding) -> Self {
        Self(Some(Arc::new(BlockData { body, binding })))
    }

    /// Whether a block was actually given.
    #[inline]
    #[must_use]
    pub fn is_given(&self) -> bool {
        self.0.is_some()
    }

    /// The declared arity of the block, if given.
    #[must_use]
    pub fn arity(&self) -> Option<Arity> {
        self.0.as_ref().map(|d| d.body.arity())
    }

    /// The `self` captured by the block, if given.
    #[must_use]
    pub fn captured_self(&self) -> Option<Value> {
        self.0.as_ref().map(|d| d.binding.frame.self_value)
    }

    /// Yield to the block.
    ///
    /// Yielding to the missing-block sentinel is a program error surfaced
    /// as nil, matching a yield with no block.
    pub fn call(&self, ctx: &Context, args: &[Value]) -> CallResult {
        match &self.0 {
            Some(data) => (data.body.body)(ctx, &data.binding, args),
            None => Ok(Value::nil()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;
    use garnet_core::Symbol;

    #[test]
    fn test_none_is_not_given() {
        let block = Block::none();
        assert!(!block.is_given());
        assert!(block.arity().is_none());
    }

    #[test]
    fn test_block_carries_binding() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let scope = Arc::new(StaticScope::new("toplevel", vec![Symbol::intern("x")]));

        let body = Arc::new(BlockBody::new(
            Arc::new(|_, binding: &Binding, args: &[Value]| {
                // The block sees its captured self, not the caller's.
                assert!(binding.frame.self_value.is_nil());
                Ok(args.first().copied().unwrap_or_else(Value::nil))
            }),
            Arity::ONE_REQUIRED,
        ));
        let block = Block::new(body, Binding::frame_scope(Value::nil(), scope));

        assert!(block.is_given());
        assert_eq!(block.arity(), Some(Arity::ONE_REQUIRED));
        let out = block.call(&ctx, &[Value::bool(true)]).unwrap();
        assert_eq!(out, Value::bool(true));
    }

    #[test]
    fn test_yield_to_missing_block_is_nil() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        assert_eq!(Block::none().call(&ctx, &[]).unwrap(), Value::nil());
    }
}
