//! # Garnet Core
//!
//! Core types shared across the Garnet dynamic runtime:
//!
//! - **Value System**: NaN-boxed tagged representation of runtime values
//! - **Interning**: symbol interning for O(1) name equality
//! - **Arity**: the argument-count contract carried by methods and call sites
//! - **Error Handling**: result types and error definitions

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod arity;
pub mod error;
pub mod intern;
pub mod value;

pub use arity::{Arity, SiteArity};
pub use error::{GarnetError, GarnetResult};
pub use intern::Symbol;
pub use value::Value;

/// Garnet runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
