//! Error types and result definitions for Garnet.
//!
//! Two families live here:
//!
//! - [`GarnetError`]: errors visible to the dynamic program (raised by
//!   method bodies, failed lookups, frozen mutation, ...). Dispatch
//!   plumbing never raises these on its own behalf; it degrades to a
//!   slower path instead.
//! - [`BootstrapError`]: link-time misconfiguration detected while a call
//!   site is being constructed (malformed site descriptor, unknown string
//!   encoding). These are fatal to code generation and never occur during
//!   dispatch.

use thiserror::Error;

/// The unified result type used throughout Garnet.
pub type GarnetResult<T> = Result<T, GarnetError>;

/// Errors visible to the dynamic program being executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GarnetError {
    /// No method with the given name on the receiver's class chain.
    #[error("NoMethodError: undefined method '{name}' for {receiver_class}")]
    NoMethod {
        /// The missing method name.
        name: String,
        /// Name of the receiver's class.
        receiver_class: String,
    },

    /// Name not found (undefined global or constant).
    #[error("NameError: undefined name '{name}'")]
    Name {
        /// The undefined name.
        name: String,
    },

    /// Dynamic type mismatch.
    #[error("TypeError: {message}")]
    Type {
        /// Error description.
        message: String,
    },

    /// Wrong number of arguments.
    #[error("ArgumentError: wrong number of arguments (given {given}, expected {expected})")]
    Argument {
        /// Arguments supplied at the call.
        given: usize,
        /// Expected argument description (e.g. "2" or "1+").
        expected: String,
    },

    /// Mutation of a frozen value.
    #[error("FrozenError: can't modify frozen {kind}")]
    Frozen {
        /// Kind of the frozen value.
        kind: String,
    },

    /// Generic runtime failure raised by a method body.
    #[error("RuntimeError: {message}")]
    Runtime {
        /// Error description.
        message: String,
    },
}

/// Fatal call-site construction failure.
///
/// Signals a code-generation bug or misconfiguration, not a recoverable
/// runtime condition; bootstrap entry points return these instead of
/// producing a site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Site descriptor operation string was not recognized.
    #[error("unknown site operation '{operation}'")]
    UnknownOperation {
        /// The unrecognized operation.
        operation: String,
    },

    /// Site descriptor name could not be split into operation and operand.
    #[error("malformed site name '{name}'")]
    MalformedName {
        /// The full descriptor name.
        name: String,
    },

    /// String literal site referenced an encoding the runtime does not know.
    #[error("could not find encoding: {encoding}")]
    UnknownEncoding {
        /// The requested encoding name.
        encoding: String,
    },

    /// Encoded site arity was not a valid encoding.
    #[error("invalid site arity encoding: {encoded}")]
    InvalidArity {
        /// The raw encoded arity.
        encoded: i32,
    },
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_method_display() {
        let err = GarnetError::NoMethod {
            name: "frobnicate".into(),
            receiver_class: "Integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "NoMethodError: undefined method 'frobnicate' for Integer"
        );
    }

    #[test]
    fn test_argument_display() {
        let err = GarnetError::Argument {
            given: 3,
            expected: "2".into(),
        };
        assert_eq!(
            err.to_string(),
            "ArgumentError: wrong number of arguments (given 3, expected 2)"
        );
    }

    #[test]
    fn test_bootstrap_unknown_encoding_display() {
        let err = BootstrapError::UnknownEncoding {
            encoding: "KOI8-R".into(),
        };
        assert_eq!(err.to_string(), "could not find encoding: KOI8-R");
    }

    #[test]
    fn test_bootstrap_malformed_name() {
        let err = BootstrapError::MalformedName {
            name: "noseparator".into(),
        };
        assert!(err.to_string().contains("noseparator"));
    }
}
