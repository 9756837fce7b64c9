//! # Garnet Runtime
//!
//! The object-model collaborators consulted by the dispatch engine:
//!
//! - **opto**: shared invalidation tokens (switch points) broadcast to
//!   every cache keyed on the same mutable fact
//! - **method**: the method representation variants a call site can bind
//! - **class**: classes, method tables, and per-class field layouts
//! - **object**: the object heap and per-instance field storage
//! - **globals**: global-variable storage with tracing and invalidation
//! - **block**: closure arguments and captured bindings
//! - **context**: the runtime handle and per-thread execution context
//!
//! Nothing in this crate makes binding decisions; it only exposes the
//! narrow surfaces the dispatch crate specializes against.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod class;
pub mod context;
pub mod globals;
pub mod method;
pub mod object;
pub mod opto;

pub use block::{Binding, Block, BlockBody, BlockFn, Frame};
pub use class::{AccessorDescriptor, AccessorKind, ClassDef, ClassId, FieldLayout};
pub use context::{Context, Encoding, Runtime};
pub use globals::{GlobalScope, GlobalTable, GlobalVariable, TraceFn};
pub use method::{
    AttributeKind, CallResult, CompiledEntry, CompiledMethod, DynCall, Entry0, Entry1, Entry2,
    Entry3, GenericEntry, HandleEntries, Method, MethodKind, NativeCall, NativeError, NativeFn,
    NativeMethod, NativeType, NativeValue, StaticScope, VariableEntry,
};
pub use object::{Instance, ObjectHeap, Payload};
pub use opto::{Invalidator, SwitchPoint};
