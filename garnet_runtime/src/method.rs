//! Method representation.
//!
//! Every entry in a method table is a [`Method`]: a name, the class it was
//! defined on (the cache key for specialized dispatch), a serial number,
//! and a [`MethodKind`] describing the cheapest way to enter it. The
//! dispatch engine feature-detects the kind to choose a binding strategy;
//! [`Method::call`] is the always-correct uniform entry every kind
//! supports.
//!
//! The native value model at the bottom of this module is the coercion
//! table the foreign-call adapter works against: how runtime values map to
//! foreign parameter types and how foreign returns map back.

use crate::block::Block;
use crate::class::ClassId;
use crate::context::Context;
use garnet_core::{GarnetError, GarnetResult, Symbol, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Result of any method invocation.
pub type CallResult = GarnetResult<Value>;

// =============================================================================
// Entry point signatures
// =============================================================================

/// Precompiled entry taking no positional arguments.
pub type Entry0 = Arc<dyn Fn(&Context, Value, &Block) -> CallResult + Send + Sync>;
/// Precompiled entry taking one positional argument.
pub type Entry1 = Arc<dyn Fn(&Context, Value, Value, &Block) -> CallResult + Send + Sync>;
/// Precompiled entry taking two positional arguments.
pub type Entry2 = Arc<dyn Fn(&Context, Value, Value, Value, &Block) -> CallResult + Send + Sync>;
/// Precompiled entry taking three positional arguments.
pub type Entry3 =
    Arc<dyn Fn(&Context, Value, Value, Value, Value, &Block) -> CallResult + Send + Sync>;
/// Entry taking its positional arguments as one packed array.
pub type VariableEntry = Arc<dyn Fn(&Context, Value, &[Value], &Block) -> CallResult + Send + Sync>;

/// A fully-adapted callable in the uniform site shape. What the dispatch
/// engine installs, and what the native adapter memoizes.
pub type DynCall = Arc<dyn Fn(&Context, Value, &[Value], &Block) -> CallResult + Send + Sync>;

/// The uniform virtual entry: `(context, dispatch class, name, self, args,
/// block)`.
pub type GenericEntry =
    Arc<dyn Fn(&Context, ClassId, Symbol, Value, &[Value], &Block) -> CallResult + Send + Sync>;

/// A compiled body's entry: `(context, static scope, self, args, block,
/// owning class, frame name)`.
pub type CompiledEntry = Arc<
    dyn Fn(&Context, &StaticScope, Value, &[Value], &Block, ClassId, Symbol) -> CallResult
        + Send
        + Sync,
>;

/// A foreign function: receiver (when instance-level) and converted
/// arguments, plus the site's block when the signature declares one.
pub type NativeFn =
    Arc<dyn Fn(&Context, &[NativeValue], &Block) -> Result<NativeValue, NativeError> + Send + Sync>;

// =============================================================================
// Static scope
// =============================================================================

/// The lexical scope a compiled body closes over.
#[derive(Debug, Clone)]
pub struct StaticScope {
    name: String,
    locals: Vec<Symbol>,
}

impl StaticScope {
    /// Create a named scope with its local-variable table.
    #[must_use]
    pub fn new(name: impl Into<String>, locals: Vec<Symbol>) -> Self {
        Self {
            name: name.into(),
            locals,
        }
    }

    /// The scope's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared local variables.
    #[must_use]
    pub fn locals(&self) -> &[Symbol] {
        &self.locals
    }
}

// =============================================================================
// Method kinds
// =============================================================================

/// Precompiled direct entry points, one per small arity plus an optional
/// variable-arity entry.
#[derive(Clone, Default)]
pub struct HandleEntries {
    /// Exact entry for zero arguments.
    pub arity0: Option<Entry0>,
    /// Exact entry for one argument.
    pub arity1: Option<Entry1>,
    /// Exact entry for two arguments.
    pub arity2: Option<Entry2>,
    /// Exact entry for three arguments.
    pub arity3: Option<Entry3>,
    /// Packed-array entry accepting any argument count.
    pub variable: Option<VariableEntry>,
}

impl HandleEntries {
    /// Whether an exact entry exists for `arity`.
    #[must_use]
    pub fn has_exact(&self, arity: usize) -> bool {
        match arity {
            0 => self.arity0.is_some(),
            1 => self.arity1.is_some(),
            2 => self.arity2.is_some(),
            3 => self.arity3.is_some(),
            _ => false,
        }
    }
}

impl fmt::Debug for HandleEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleEntries")
            .field("arity0", &self.arity0.is_some())
            .field("arity1", &self.arity1.is_some())
            .field("arity2", &self.arity2.is_some())
            .field("arity3", &self.arity3.is_some())
            .field("variable", &self.variable.is_some())
            .finish()
    }
}

/// A body produced by the compiler: a uniform variable-arity entry plus
/// optional arity-specialized entries, and the static scope it runs in.
#[derive(Clone)]
pub struct CompiledMethod {
    /// The uniform entry; always present.
    pub variable: CompiledEntry,
    /// Arity-specialized entries for 0..=3 arguments.
    pub specialized: [Option<CompiledEntry>; 4],
    /// The body's lexical scope.
    pub scope: Arc<StaticScope>,
}

impl CompiledMethod {
    /// The specialized entry for `arity`, if one was compiled.
    #[must_use]
    pub fn entry_for(&self, arity: usize) -> Option<&CompiledEntry> {
        self.specialized.get(arity).and_then(Option::as_ref)
    }
}

impl fmt::Debug for CompiledMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMethod")
            .field("scope", &self.scope.name())
            .field(
                "specialized",
                &self
                    .specialized
                    .iter()
                    .map(Option::is_some)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Which half of an attribute pair a method implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// `foo`: returns the named field.
    Reader,
    /// `foo=`: stores into the named field.
    Writer,
}

/// A foreign method plus its memoized adapter.
pub struct NativeMethod {
    /// The foreign descriptor.
    pub call: NativeCall,
    /// Invoker with binding semantics the adapter cannot honor; such
    /// methods always dispatch through the uniform entry.
    pub special_invoker: bool,
    adapter: OnceLock<Option<DynCall>>,
}

impl NativeMethod {
    /// Wrap a foreign descriptor.
    #[must_use]
    pub fn new(call: NativeCall) -> Self {
        Self {
            call,
            special_invoker: false,
            adapter: OnceLock::new(),
        }
    }

    /// Mark the invoker as incompatible with direct binding.
    #[must_use]
    pub fn with_special_invoker(mut self) -> Self {
        self.special_invoker = true;
        self
    }

    /// The memoized adapter, building it on first request. Repeated binding
    /// attempts for the same method reuse the first result, including a
    /// negative one.
    pub fn adapter_or_build(
        &self,
        build: impl FnOnce() -> Option<DynCall>,
    ) -> Option<DynCall> {
        self.adapter.get_or_init(build).clone()
    }
}

impl fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMethod")
            .field("call", &self.call)
            .field("special_invoker", &self.special_invoker)
            .field("adapter_built", &self.adapter.get().is_some())
            .finish()
    }
}

/// The representation variants the resolver feature-detects.
pub enum MethodKind {
    /// Precompiled direct entry points per small arity.
    HandleBacked(HandleEntries),
    /// Compiler-produced body with uniform and specialized entries.
    Compiled(CompiledMethod),
    /// Foreign function behind the coercion boundary.
    Native(NativeMethod),
    /// Pure field reader or writer.
    Attribute {
        /// The backing field name.
        variable: Symbol,
        /// Reader or writer.
        kind: AttributeKind,
    },
    /// Only the uniform virtual entry exists.
    Generic(GenericEntry),
}

impl fmt::Debug for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandleBacked(h) => f.debug_tuple("HandleBacked").field(h).finish(),
            Self::Compiled(c) => f.debug_tuple("Compiled").field(c).finish(),
            Self::Native(n) => f.debug_tuple("Native").field(n).finish(),
            Self::Attribute { variable, kind } => f
                .debug_struct("Attribute")
                .field("variable", variable)
                .field("kind", kind)
                .finish(),
            Self::Generic(_) => f.write_str("Generic"),
        }
    }
}

// =============================================================================
// Method
// =============================================================================

static METHOD_SERIAL: AtomicU64 = AtomicU64::new(0);

/// One method-table entry.
#[derive(Debug)]
pub struct Method {
    name: Symbol,
    owner: ClassId,
    serial: u64,
    kind: MethodKind,
}

impl Method {
    /// Create a method of the given kind, owned by `owner`.
    #[must_use]
    pub fn new(name: Symbol, owner: ClassId, kind: MethodKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            owner,
            serial: METHOD_SERIAL.fetch_add(1, Ordering::Relaxed),
            kind,
        })
    }

    /// An attribute reader for `variable`.
    #[must_use]
    pub fn attribute_reader(name: Symbol, owner: ClassId, variable: Symbol) -> Arc<Self> {
        Self::new(
            name,
            owner,
            MethodKind::Attribute {
                variable,
                kind: AttributeKind::Reader,
            },
        )
    }

    /// An attribute writer for `variable`.
    #[must_use]
    pub fn attribute_writer(name: Symbol, owner: ClassId, variable: Symbol) -> Arc<Self> {
        Self::new(
            name,
            owner,
            MethodKind::Attribute {
                variable,
                kind: AttributeKind::Writer,
            },
        )
    }

    /// The method's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// The class the method was defined on, which is the cache key for
    /// any specialized binding.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    /// Process-unique serial, for binding logs.
    #[inline]
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The representation variant.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    /// The uniform virtual entry. Always correct; never the fastest.
    pub fn call(
        &self,
        ctx: &Context,
        dispatch_class: ClassId,
        name: Symbol,
        recv: Value,
        args: &[Value],
        block: &Block,
    ) -> CallResult {
        match &self.kind {
            MethodKind::HandleBacked(h) => self.call_handle(h, ctx, recv, args, block),
            MethodKind::Compiled(c) => {
                if let Some(entry) = c.entry_for(args.len()) {
                    entry(ctx, &c.scope, recv, args, block, self.owner, name)
                } else {
                    (c.variable)(ctx, &c.scope, recv, args, block, self.owner, name)
                }
            }
            MethodKind::Native(n) => self.call_native(n, ctx, recv, args, block),
            MethodKind::Attribute { variable, kind } => match kind {
                AttributeKind::Reader => read_attribute(ctx, recv, *variable, args),
                AttributeKind::Writer => write_attribute(ctx, recv, *variable, args),
            },
            MethodKind::Generic(g) => g(ctx, dispatch_class, name, recv, args, block),
        }
    }

    fn call_handle(
        &self,
        h: &HandleEntries,
        ctx: &Context,
        recv: Value,
        args: &[Value],
        block: &Block,
    ) -> CallResult {
        match args {
            [] if h.arity0.is_some() => (h.arity0.as_ref().unwrap())(ctx, recv, block),
            [a] if h.arity1.is_some() => (h.arity1.as_ref().unwrap())(ctx, recv, *a, block),
            [a, b] if h.arity2.is_some() => (h.arity2.as_ref().unwrap())(ctx, recv, *a, *b, block),
            [a, b, c] if h.arity3.is_some() => {
                (h.arity3.as_ref().unwrap())(ctx, recv, *a, *b, *c, block)
            }
            _ => match &h.variable {
                Some(var) => var(ctx, recv, args, block),
                None => Err(GarnetError::Argument {
                    given: args.len(),
                    expected: "0..=3".to_string(),
                }),
            },
        }
    }

    fn call_native(
        &self,
        n: &NativeMethod,
        ctx: &Context,
        recv: Value,
        args: &[Value],
        block: &Block,
    ) -> CallResult {
        let call = &n.call;
        let mut natives: Vec<NativeValue> = Vec::with_capacity(args.len() + 1);
        if !call.is_static {
            natives.push(unwrap_receiver(recv));
        }

        if call.takes_value_array() {
            natives.push(NativeValue::Array(args.to_vec()));
        } else if call.params.len() == args.len() {
            for (value, ty) in args.iter().zip(&call.params) {
                match to_native(*value, *ty) {
                    Ok(nv) => natives.push(nv),
                    // Conversion failures degrade exactly like foreign
                    // faults: the declared return type's default.
                    Err(_) => return Ok(from_native(call.ret, native_default(call.ret))),
                }
            }
        } else {
            return Err(GarnetError::Argument {
                given: args.len(),
                expected: call.params.len().to_string(),
            });
        }

        match (call.target)(ctx, &natives, block) {
            Ok(ret) => Ok(from_native(call.ret, ret)),
            // Foreign faults never escape as native errors; they degrade to
            // the declared return type's default. Intentional policy.
            Err(_) => Ok(from_native(call.ret, native_default(call.ret))),
        }
    }
}

fn read_attribute(ctx: &Context, recv: Value, variable: Symbol, args: &[Value]) -> CallResult {
    if !args.is_empty() {
        return Err(GarnetError::Argument {
            given: args.len(),
            expected: "0".to_string(),
        });
    }
    let runtime = ctx.runtime();
    let Some(index) = recv.as_object() else {
        return Ok(Value::nil());
    };
    let class = runtime.class(runtime.class_of(recv));
    match class.layout().accessor_for_read(variable) {
        Some(accessor) => Ok(runtime
            .heap()
            .read(index, &accessor)
            .unwrap_or_else(Value::nil)),
        None => Ok(Value::nil()),
    }
}

fn write_attribute(ctx: &Context, recv: Value, variable: Symbol, args: &[Value]) -> CallResult {
    if args.len() != 1 {
        return Err(GarnetError::Argument {
            given: args.len(),
            expected: "1".to_string(),
        });
    }
    let runtime = ctx.runtime();
    let Some(index) = recv.as_object() else {
        let class = runtime.class(runtime.class_of(recv));
        return Err(GarnetError::Frozen {
            kind: class.name().resolve().to_string(),
        });
    };
    let class = runtime.class(runtime.class_of(recv));
    let accessor = class.layout().accessor_for_write(variable);
    runtime.heap().write(index, &accessor, args[0]);
    Ok(Value::nil())
}

// =============================================================================
// Native value model
// =============================================================================

/// Error raised on the foreign side of a native call.
#[derive(Error, Debug, Clone)]
#[error("native call failed: {message}")]
pub struct NativeError {
    /// Foreign-side description.
    pub message: String,
}

impl NativeError {
    /// Wrap a foreign failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Declared parameter/return types of a foreign signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    /// Primitive 8-bit integral.
    Byte,
    /// Primitive 16-bit integral.
    Short,
    /// Primitive character (treated as integral).
    Char,
    /// Primitive 32-bit integral.
    Int,
    /// Primitive 64-bit integral.
    Long,
    /// Nullable boxed integral (any width).
    BoxedLong,
    /// Primitive 32-bit float.
    Float,
    /// Primitive 64-bit float.
    Double,
    /// Nullable boxed float.
    BoxedDouble,
    /// Primitive boolean.
    Bool,
    /// Nullable boxed boolean.
    BoxedBool,
    /// Character-sequence type.
    CharSequence,
    /// No value.
    Void,
    /// Any other reference type.
    Reference,
    /// Variable-length collection of runtime values.
    ValueArray,
}

impl NativeType {
    /// Whether this is a primitive integral type.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Char | Self::Int | Self::Long
        )
    }

    /// Whether this is an array type.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::ValueArray)
    }
}

/// A value in the foreign representation.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Any primitive integral, widened to 64 bits.
    Int(i64),
    /// Nullable boxed integral.
    BoxedInt(Option<i64>),
    /// Any primitive float, widened.
    Float(f64),
    /// Nullable boxed float.
    BoxedFloat(Option<f64>),
    /// Primitive boolean.
    Bool(bool),
    /// Nullable boxed boolean.
    BoxedBool(Option<bool>),
    /// Character sequence, possibly null.
    Str(Option<String>),
    /// No value.
    Void,
    /// An opaque foreign reference carried in its runtime wrapper.
    Reference(Value),
    /// Variable-length collection of runtime values.
    Array(Vec<Value>),
}

/// A foreign signature: target, foreign name, declared types, and the
/// flags that shape its calling convention.
#[derive(Clone)]
pub struct NativeCall {
    /// The foreign function.
    pub target: NativeFn,
    /// The foreign-side name, for binding logs.
    pub native_name: String,
    /// Declared parameter types, excluding receiver, context, and block.
    pub params: Vec<NativeType>,
    /// Declared return type.
    pub ret: NativeType,
    /// Whether the method is static (no receiver).
    pub is_static: bool,
    /// Whether the foreign side wants the execution context.
    pub has_context: bool,
    /// Whether the signature declares a trailing block parameter.
    pub has_block: bool,
}

impl NativeCall {
    /// Whether the signature's only positional parameter is a
    /// variable-length collection.
    #[must_use]
    pub fn takes_value_array(&self) -> bool {
        self.params.len() == 1 && self.params[0].is_array()
    }

    /// Positional arity: the declared parameter count, or -1 when the
    /// signature accepts one variable-length collection.
    #[must_use]
    pub fn native_arity(&self) -> i32 {
        if self.takes_value_array() {
            -1
        } else {
            self.params.len() as i32
        }
    }
}

impl fmt::Debug for NativeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCall")
            .field("native_name", &self.native_name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("is_static", &self.is_static)
            .field("has_context", &self.has_context)
            .field("has_block", &self.has_block)
            .finish()
    }
}

/// Unwrap the receiver from its runtime wrapper into the foreign
/// representation.
#[must_use]
pub fn unwrap_receiver(recv: Value) -> NativeValue {
    NativeValue::Reference(recv)
}

/// Convert a runtime value to the foreign representation demanded by
/// `ty`.
pub fn to_native(value: Value, ty: NativeType) -> Result<NativeValue, NativeError> {
    match ty {
        NativeType::Byte => integral(value, ty).map(|i| NativeValue::Int(i as i8 as i64)),
        NativeType::Short => integral(value, ty).map(|i| NativeValue::Int(i as i16 as i64)),
        NativeType::Char | NativeType::Int => {
            integral(value, ty).map(|i| NativeValue::Int(i as i32 as i64))
        }
        NativeType::Long => integral(value, ty).map(NativeValue::Int),
        NativeType::BoxedLong => {
            if value.is_nil() {
                Ok(NativeValue::BoxedInt(None))
            } else {
                integral(value, ty).map(|i| NativeValue::BoxedInt(Some(i)))
            }
        }
        NativeType::Float | NativeType::Double => floating(value, ty).map(NativeValue::Float),
        NativeType::BoxedDouble => {
            if value.is_nil() {
                Ok(NativeValue::BoxedFloat(None))
            } else {
                floating(value, ty).map(|f| NativeValue::BoxedFloat(Some(f)))
            }
        }
        NativeType::Bool => Ok(NativeValue::Bool(value.is_truthy())),
        NativeType::BoxedBool => {
            if value.is_nil() {
                Ok(NativeValue::BoxedBool(None))
            } else {
                Ok(NativeValue::BoxedBool(Some(value.is_truthy())))
            }
        }
        NativeType::CharSequence => {
            if value.is_nil() {
                Ok(NativeValue::Str(None))
            } else {
                value
                    .as_str()
                    .map(|sym| NativeValue::Str(Some(sym.resolve().to_string())))
                    .ok_or_else(|| mismatch(value, ty))
            }
        }
        NativeType::Reference => Ok(NativeValue::Reference(value)),
        NativeType::Void | NativeType::ValueArray => Err(mismatch(value, ty)),
    }
}

fn integral(value: Value, ty: NativeType) -> Result<i64, NativeError> {
    value.as_fixnum().ok_or_else(|| mismatch(value, ty))
}

fn floating(value: Value, ty: NativeType) -> Result<f64, NativeError> {
    value
        .as_float()
        .or_else(|| value.as_fixnum().map(|i| i as f64))
        .ok_or_else(|| mismatch(value, ty))
}

fn mismatch(value: Value, ty: NativeType) -> NativeError {
    NativeError::new(format!("cannot convert {value:?} to {ty:?}"))
}

/// The nil/zero-equivalent default for a declared return type. Produced
/// when the foreign side faults.
#[must_use]
pub fn native_default(ty: NativeType) -> NativeValue {
    match ty {
        NativeType::Byte | NativeType::Short | NativeType::Char | NativeType::Int
        | NativeType::Long => NativeValue::Int(0),
        NativeType::BoxedLong => NativeValue::BoxedInt(None),
        NativeType::Float | NativeType::Double => NativeValue::Float(0.0),
        NativeType::BoxedDouble => NativeValue::BoxedFloat(None),
        NativeType::Bool => NativeValue::Bool(false),
        NativeType::BoxedBool => NativeValue::BoxedBool(None),
        NativeType::CharSequence => NativeValue::Str(None),
        NativeType::Void => NativeValue::Void,
        NativeType::Reference | NativeType::ValueArray => NativeValue::Reference(Value::nil()),
    }
}

/// Convert a foreign return to a runtime value, per the declared return
/// type. Exhaustive; first match wins.
#[must_use]
pub fn from_native(ret: NativeType, value: NativeValue) -> Value {
    match (ret, value) {
        // Primitive integrals box to a fixnum.
        (_, NativeValue::Int(i)) => Value::fixnum(i).unwrap_or_else(Value::nil),
        // Boxed integrals box to a fixnum, or nil when null.
        (_, NativeValue::BoxedInt(Some(i))) => Value::fixnum(i).unwrap_or_else(Value::nil),
        (_, NativeValue::BoxedInt(None)) => Value::nil(),
        // Floats box to a float.
        (_, NativeValue::Float(f)) => Value::float(f),
        (_, NativeValue::BoxedFloat(Some(f))) => Value::float(f),
        (_, NativeValue::BoxedFloat(None)) => Value::nil(),
        // Booleans.
        (_, NativeValue::Bool(b)) => Value::bool(b),
        (_, NativeValue::BoxedBool(Some(b))) => Value::bool(b),
        (_, NativeValue::BoxedBool(None)) => Value::nil(),
        // Character sequences produce a string, or nil when null.
        (_, NativeValue::Str(Some(s))) => Value::str(Symbol::intern(&s)),
        (_, NativeValue::Str(None)) => Value::nil(),
        // Void produces nil.
        (_, NativeValue::Void) => Value::nil(),
        // Any other reference converts to a usable runtime value.
        (_, NativeValue::Reference(v)) => v,
        // Collections are not a supported return kind.
        (_, NativeValue::Array(_)) => Value::nil(),
    }
}

// =============================================================================
// Tests
// =============================================================================
