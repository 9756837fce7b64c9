//! Literal construction sites.
//!
//! Array, hash, string, and block literals in generated code go through
//! dedicated sites. Array/hash sites collect stack values into a fresh
//! container per traversal. A string site re-materializes a mutable string
//! from shared byte content each time; a frozen-string site deduplicates
//! and folds to a constant after its first traversal. A block site pairs a
//! compiled body with the frame-and-scope binding captured at the point of
//! the literal.

use garnet_core::{Symbol, Value};
use garnet_runtime::block::{Binding, Block, BlockBody};
use garnet_runtime::context::Encoding;
use garnet_runtime::method::StaticScope;
use garnet_runtime::Context;
use std::sync::{Arc, OnceLock};

// =============================================================================
// Container literals
// =============================================================================

/// An array literal site: collects element values into an array.
#[derive(Debug, Default)]
pub struct ArraySite;

impl ArraySite {
    /// Create the site.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the array from the site's collected elements.
    #[must_use]
    pub fn construct(&self, ctx: &Context, elements: &[Value]) -> Value {
        ctx.runtime().new_array(elements.to_vec())
    }
}

/// A hash literal site: collects alternating key/value stack values.
#[derive(Debug, Default)]
pub struct HashSite;

impl HashSite {
    /// Create the site.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the hash from collected `[k0, v0, k1, v1, ...]` values. A
    /// trailing unpaired key is dropped.
    #[must_use]
    pub fn construct(&self, ctx: &Context, pairs: &[Value]) -> Value {
        let entries = pairs
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        ctx.runtime().new_hash(entries)
    }
}

// =============================================================================
// String literals
// =============================================================================

/// A mutable string literal site.
///
/// The byte content and encoding are shared; each traversal allocates a
/// fresh string object so the program can mutate its copy.
#[derive(Debug)]
pub struct StringSite {
    bytes: Arc<[u8]>,
    encoding: &'static Encoding,
}

impl StringSite {
    /// Create a site over validated content. The encoding has already been
    /// resolved at bootstrap time.
    #[must_use]
    pub fn new(bytes: Arc<[u8]>, encoding: &'static Encoding) -> Self {
        Self { bytes, encoding }
    }

    /// The site's encoding.
    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Materialize a fresh string from the shared content.
    #[must_use]
    pub fn construct(&self, ctx: &Context) -> Value {
        ctx.runtime()
            .new_string(self.bytes.to_vec(), self.encoding.name)
    }
}

/// A frozen string literal site.
///
/// Deduplicated through the interner and folded to a constant after the
/// first traversal.
#[derive(Debug)]
pub struct FrozenStringSite {
    content: String,
    file: String,
    line: u32,
    cached: OnceLock<Value>,
}

impl FrozenStringSite {
    /// Create a site over validated content with its source position.
    #[must_use]
    pub fn new(content: String, file: &str, line: u32) -> Self {
        Self {
            content,
            file: file.to_string(),
            line,
            cached: OnceLock::new(),
        }
    }

    /// Source position of the literal.
    #[must_use]
    pub fn position(&self) -> (&str, u32) {
        (&self.file, self.line)
    }

    /// The deduplicated frozen string.
    #[must_use]
    pub fn construct(&self, _ctx: &Context) -> Value {
        *self
            .cached
            .get_or_init(|| Value::str(Symbol::intern(&self.content)))
    }
}

// =============================================================================
// Block literals
// =============================================================================

/// A block literal site.
///
/// The compiled body and lexical scope are fixed; each traversal captures
/// the current `self` into a frame-and-scope binding.
pub struct BlockSite {
    body: Arc<BlockBody>,
    scope: Arc<StaticScope>,
}

impl BlockSite {
    /// Create a site from the block's compiled body and lexical scope.
    #[must_use]
    pub fn new(body: Arc<BlockBody>, scope: Arc<StaticScope>) -> Self {
        Self { body, scope }
    }

    /// Construct the block value for one traversal.
    #[must_use]
    pub fn construct(&self, _ctx: &Context, self_value: Value) -> Block {
        let binding = Binding::frame_scope(self_value, Arc::clone(&self.scope));
        Block::new(Arc::clone(&self.body), binding)
    }
}

impl std::fmt::Debug for BlockSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSite")
            .field("scope", &self.scope.name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
