//! # Garnet Dispatch
//!
//! Polymorphic inline-cache method dispatch for the Garnet runtime.
//!
//! Generated code never calls methods directly: every call, attribute
//! access, global read/write, and literal construction goes through a
//! *site* produced by the [`bootstrap`] module. Sites specialize
//! themselves on first traversal and stay specialized only while the
//! assumptions behind the binding hold.
//!
//! # Architecture
//!
//! ```text
//! Uninitialized ──► Specialized ◄──► Generic ──► Megamorphic
//!                        │                            ▲
//!                        └── invalidator fired ───────┘ (budget exceeded)
//! ```
//!
//! ## Components
//!
//! - **site**: the mutable dispatch cell and its guard/fallback protocol
//! - **resolver**: the binding ladder choosing the cheapest handler for a
//!   resolved method's representation
//! - **native**: the foreign-call adapter (coercion both ways, fault
//!   swallowing, memoized per method)
//! - **accessor**: attribute fast paths and per-site field caches
//! - **global_site**: global reads/writes, constant folding, checkpoints
//! - **literal**: array/hash/string/frozen-string/block construction
//! - **convention**: the adaptation primitives bridging site and entry
//!   calling conventions
//!
//! Invalidation tokens live with the facts they guard, in
//! `garnet_runtime::opto`; this crate only consumes them.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod accessor;
pub mod bootstrap;
pub mod config;
pub mod convention;
pub mod global_site;
pub mod literal;
pub mod native;
pub mod resolver;
pub mod site;

pub use accessor::{VariableOp, VariableSite};
pub use bootstrap::GlobalSiteHandle;
pub use config::{options, BindingOptions};
pub use convention::{plan_for, Adaptation, AdaptationPlan, TargetShape};
pub use global_site::{
    CheckpointSite, ConstantSite, GlobalReadSite, GlobalWriteSite, RuntimeConstant,
};
pub use literal::{ArraySite, BlockSite, FrozenStringSite, HashSite, StringSite};
pub use site::{CallSiteDescriptor, InvokeSite, LookupMode, SiteState};
