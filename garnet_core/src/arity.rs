//! Arity descriptors.
//!
//! [`Arity`] is the argument-count contract a method declares; it is an
//! immutable record produced by the compiler. [`SiteArity`] is the compact
//! encoding a call site carries: the declared positional arity (signed,
//! negative = variable) folded together with a "block argument present"
//! bit, as a single integer operand of the bootstrap descriptor.

/// The argument-count contract of a method.
///
/// Plain immutable record. `arity_number` produces the conventional signed
/// encoding: a method taking optional or rest arguments reports
/// `-(required + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arity {
    required: u16,
    optional: u16,
    allows_more: bool,
    defined_keywords: u16,
    has_keywords: bool,
    has_key_rest: bool,
}

impl Arity {
    /// A method taking no arguments.
    pub const NO_ARGUMENTS: Arity = Arity::new(0, 0, false, false, false, 0);

    /// A method taking exactly one required argument.
    pub const ONE_REQUIRED: Arity = Arity::new(1, 0, false, false, false, 0);

    /// Build an arity record.
    #[must_use]
    pub const fn new(
        required: u16,
        optional: u16,
        allows_more: bool,
        has_keywords: bool,
        has_key_rest: bool,
        defined_keywords: u16,
    ) -> Self {
        Self {
            required,
            optional,
            allows_more,
            defined_keywords,
            has_keywords,
            has_key_rest,
        }
    }

    /// Number of required positional arguments.
    #[inline]
    #[must_use]
    pub const fn required(&self) -> u16 {
        self.required
    }

    /// Number of optional positional arguments.
    #[inline]
    #[must_use]
    pub const fn optional(&self) -> u16 {
        self.optional
    }

    /// Whether a rest argument accepts arbitrarily many more.
    #[inline]
    #[must_use]
    pub const fn allows_more(&self) -> bool {
        self.allows_more
    }

    /// Whether any keyword parameters are declared.
    #[inline]
    #[must_use]
    pub const fn has_keywords(&self) -> bool {
        self.has_keywords
    }

    /// Number of declared keyword parameters.
    #[inline]
    #[must_use]
    pub const fn keyword_count(&self) -> u16 {
        self.defined_keywords
    }

    /// Whether a keyword-rest parameter is declared.
    #[inline]
    #[must_use]
    pub const fn has_key_rest(&self) -> bool {
        self.has_key_rest
    }

    /// The conventional signed arity number.
    ///
    /// Fixed-arity methods report their required count; methods accepting a
    /// variable number report `-(count + 1)` where `count` includes the
    /// keyword bundle when keywords are declared.
    #[must_use]
    pub const fn arity_number(&self) -> i32 {
        let mut count = self.required as i32;
        if self.has_keywords {
            count += 1;
        }
        if self.optional > 0 || self.allows_more {
            count = -count - 1;
        }
        count
    }
}

// =============================================================================
// Site arity encoding
// =============================================================================

/// The declared arity of a call site, with its block bit.
///
/// Encoded into a single `i32` descriptor operand:
/// - non-negative `e`: fixed arity `e >> 1`, block bit `e & 1`
/// - negative `e`: variable arity; with `m = -e - 1`, required count
///   `m >> 1` and block bit `m & 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteArity {
    /// Signed positional arity: `>= 0` fixed, `< 0` variable with
    /// `-n - 1` required arguments.
    arity: i32,
    /// Whether the site passes a block argument.
    has_block: bool,
}

impl SiteArity {
    /// A fixed-arity site.
    #[must_use]
    pub const fn fixed(count: u16, has_block: bool) -> Self {
        Self {
            arity: count as i32,
            has_block,
        }
    }

    /// A variable-arity site with `required` leading required arguments.
    #[must_use]
    pub const fn variable(required: u16, has_block: bool) -> Self {
        Self {
            arity: -(required as i32) - 1,
            has_block,
        }
    }

    /// The signed arity value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.arity
    }

    /// Whether this site passes a variable-length argument collection.
    #[inline]
    #[must_use]
    pub const fn is_variable(&self) -> bool {
        self.arity < 0
    }

    /// Required argument count for a variable site; the fixed count otherwise.
    #[inline]
    #[must_use]
    pub const fn required(&self) -> u16 {
        if self.arity < 0 {
            (-self.arity - 1) as u16
        } else {
            self.arity as u16
        }
    }

    /// Whether the site passes a block argument.
    #[inline]
    #[must_use]
    pub const fn has_block(&self) -> bool {
        self.has_block
    }

    /// Fold into the single-integer descriptor operand.
    #[must_use]
    pub const fn encode(&self) -> i32 {
        let block = self.has_block as i32;
        if self.arity >= 0 {
            (self.arity << 1) | block
        } else {
            let m = ((-self.arity - 1) << 1) | block;
            -m - 1
        }
    }

    /// Rebuild from the descriptor operand. Every `i32` is a valid encoding.
    #[must_use]
    pub const fn decode(encoded: i32) -> Self {
        if encoded >= 0 {
            Self {
                arity: encoded >> 1,
                has_block: encoded & 1 == 1,
            }
        } else {
            let m = -encoded - 1;
            Self {
                arity: -(m >> 1) - 1,
                has_block: m & 1 == 1,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
