//! Binding strategy selection.
//!
//! Given a site descriptor and a resolved method, produce the cheapest
//! handler compatible with the site's calling convention, or `None` to
//! force the generic path. The ladder, first success wins:
//!
//! 1. handle-backed direct binding (exact arity, else adapted variable
//!    entry),
//! 2. attribute binding (reader at arity 0, writer at arity 1),
//! 3. compiled-entry direct binding (specialized entry preferred),
//! 4. native binding through the foreign-call adapter,
//! 5. generic fallback, always available via [`generic_binding`].
//!
//! Binding is a pure function of (method identity, site shape); racing
//! callers may bind redundantly and the losing handler is discarded.

use crate::accessor;
use crate::config::options;
use crate::convention::{plan_for, TargetShape};
use crate::native;
use crate::site::CallSiteDescriptor;
use garnet_core::GarnetError;
use garnet_runtime::class::ClassId;
use garnet_runtime::method::{
    AttributeKind, CompiledMethod, DynCall, HandleEntries, Method, MethodKind,
};
use garnet_runtime::Context;
use log::debug;
use std::sync::Arc;

/// Choose a specialized handler for `method` at `site`, or `None` when
/// only generic dispatch applies.
#[must_use]
pub fn bind(
    ctx: &Context,
    site: &CallSiteDescriptor,
    method: &Arc<Method>,
    dispatch_class: ClassId,
) -> Option<DynCall> {
    match method.kind() {
        MethodKind::HandleBacked(entries) => bind_handle(site, method, entries),
        MethodKind::Attribute { variable, kind } => {
            bind_attribute(ctx, site, method, dispatch_class, *variable, *kind)
        }
        MethodKind::Compiled(compiled) => bind_compiled(site, method, compiled),
        MethodKind::Native(native) => native::try_native_binding(site, native),
        MethodKind::Generic(_) => None,
    }
}

/// The always-correct binding: the resolved method's uniform virtual
/// entry, carrying the owning type and site name.
#[must_use]
pub fn generic_binding(
    site: &CallSiteDescriptor,
    method: &Arc<Method>,
    dispatch_class: ClassId,
) -> DynCall {
    if options().log_binding {
        debug!("{}\tbound indirectly to method #{}", site.name(), method.serial());
    }
    let name = site.name();
    let method = Arc::clone(method);
    Arc::new(move |ctx, recv, args, block| {
        method.call(ctx, dispatch_class, name, recv, args, block)
    })
}

// =============================================================================
// Handle-backed binding
// =============================================================================

fn bind_handle(
    site: &CallSiteDescriptor,
    method: &Arc<Method>,
    entries: &HandleEntries,
) -> Option<DynCall> {
    let arity = site.arity();

    let handler = if !arity.is_variable() {
        let count = arity.required() as usize;
        if entries.has_exact(count) {
            Some(explode_exact(entries, count))
        } else {
            let variable = entries.variable.clone()?;
            let plan = plan_for(arity, TargetShape::Variable)?;
            let adapted: DynCall = Arc::new(move |ctx, recv, args, block| {
                variable(ctx, recv, plan.arguments(args), block)
            });
            Some(adapted)
        }
    } else {
        let variable = entries.variable.clone()?;
        let passthrough: DynCall =
            Arc::new(move |ctx, recv, args, block| variable(ctx, recv, args, block));
        Some(passthrough)
    };

    if handler.is_some() && options().log_binding {
        debug!(
            "{}\tbound directly to handle method #{}",
            site.name(),
            method.serial()
        );
    }
    handler
}

fn explode_exact(entries: &HandleEntries, count: usize) -> DynCall {
    match count {
        0 => {
            let entry = entries.arity0.clone().expect("checked by has_exact");
            Arc::new(move |ctx, recv, args, block| {
                if !args.is_empty() {
                    return Err(wrong_arity(args.len(), 0));
                }
                entry(ctx, recv, block)
            })
        }
        1 => {
            let entry = entries.arity1.clone().expect("checked by has_exact");
            Arc::new(move |ctx, recv, args, block| {
                let &[a] = args else {
                    return Err(wrong_arity(args.len(), 1));
                };
                entry(ctx, recv, a, block)
            })
        }
        2 => {
            let entry = entries.arity2.clone().expect("checked by has_exact");
            Arc::new(move |ctx, recv, args, block| {
                let &[a, b] = args else {
                    return Err(wrong_arity(args.len(), 2));
                };
                entry(ctx, recv, a, b, block)
            })
        }
        _ => {
            let entry = entries.arity3.clone().expect("checked by has_exact");
            Arc::new(move |ctx, recv, args, block| {
                let &[a, b, c] = args else {
                    return Err(wrong_arity(args.len(), 3));
                };
                entry(ctx, recv, a, b, c, block)
            })
        }
    }
}

fn wrong_arity(given: usize, expected: usize) -> GarnetError {
    GarnetError::Argument {
        given,
        expected: expected.to_string(),
    }
}

// =============================================================================
// Attribute binding
// =============================================================================

fn bind_attribute(
    ctx: &Context,
    site: &CallSiteDescriptor,
    method: &Arc<Method>,
    dispatch_class: ClassId,
    variable: garnet_core::Symbol,
    kind: AttributeKind,
) -> Option<DynCall> {
    let arity = site.arity();
    if arity.is_variable() {
        return None;
    }

    match (kind, arity.required()) {
        (AttributeKind::Reader, 0) => {
            let class = ctx.runtime().class(dispatch_class);
            if options().log_binding {
                debug!(
                    "{}\tbound as attr reader #{}:{variable}",
                    site.name(),
                    method.serial()
                );
            }
            Some(accessor::attribute_reader_handler(&class, variable))
        }
        (AttributeKind::Writer, 1) => {
            let class = ctx.runtime().class(dispatch_class);
            if options().log_binding {
                debug!(
                    "{}\tbound as attr writer #{}:{variable}",
                    site.name(),
                    method.serial()
                );
            }
            Some(accessor::attribute_writer_handler(&class, variable))
        }
        _ => None,
    }
}

// =============================================================================
// Compiled binding
// =============================================================================

fn bind_compiled(
    site: &CallSiteDescriptor,
    method: &Arc<Method>,
    compiled: &CompiledMethod,
) -> Option<DynCall> {
    let arity = site.arity();
    let scope = Arc::clone(&compiled.scope);
    let owner = method.owner();
    let name = site.name();

    let handler: DynCall = if !arity.is_variable() {
        let count = arity.required() as usize;
        if let Some(entry) = compiled.entry_for(count) {
            let entry = entry.clone();
            Arc::new(move |ctx, recv, args, block| {
                entry(ctx, &scope, recv, args, block, owner, name)
            })
        } else {
            let entry = compiled.variable.clone();
            let plan = plan_for(arity, TargetShape::Variable)?;
            Arc::new(move |ctx, recv, args, block| {
                entry(ctx, &scope, recv, plan.arguments(args), block, owner, name)
            })
        }
    } else {
        let entry = compiled.variable.clone();
        Arc::new(move |ctx, recv, args, block| entry(ctx, &scope, recv, args, block, owner, name))
    };

    if options().log_binding {
        debug!(
            "{}\tbound directly to compiled method #{}",
            site.name(),
            method.serial()
        );
    }
    Some(handler)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::{SiteArity, Symbol, Value};
    use garnet_runtime::method::{CompiledEntry, StaticScope, VariableEntry};
    use garnet_runtime::{Block, Runtime};
    use parking_lot::Mutex;

    fn descriptor(arity: SiteArity) -> CallSiteDescriptor {
        CallSiteDescriptor::new(Symbol::intern("probe"), arity)
    }

    /// Records which entry ran and how many positionals it received.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Hit {
        Exact(usize),
        Variable(usize),
    }

    fn handle_method(
        exact: &[usize],
        with_variable: bool,
        hits: &Arc<Mutex<Vec<Hit>>>,
    ) -> Arc<Method> {
        let mut entries = HandleEntries::default();
        for &n in exact {
            match n {
                0 => {
                    let hits = Arc::clone(hits);
                    entries.arity0 = Some(Arc::new(move |_, _, _| {
                        hits.lock().push(Hit::Exact(0));
                        Ok(Value::nil())
                    }));
                }
                1 => {
                    let hits = Arc::clone(hits);
                    entries.arity1 = Some(Arc::new(move |_, _, _, _| {
                        hits.lock().push(Hit::Exact(1));
                        Ok(Value::nil())
                    }));
                }
                2 => {
                    let hits = Arc::clone(hits);
                    entries.arity2 = Some(Arc::new(move |_, _, _, _, _| {
                        hits.lock().push(Hit::Exact(2));
                        Ok(Value::nil())
                    }));
                }
                _ => {
                    let hits = Arc::clone(hits);
                    entries.arity3 = Some(Arc::new(move |_, _, _, _, _, _| {
                        hits.lock().push(Hit::Exact(3));
                        Ok(Value::nil())
                    }));
                }
            }
        }
        if with_variable {
            let hits = Arc::clone(hits);
            let variable: VariableEntry = Arc::new(move |_, _, args, _| {
                hits.lock().push(Hit::Variable(args.len()));
                Ok(Value::nil())
            });
            entries.variable = Some(variable);
        }
        Method::new(
            Symbol::intern("probe"),
            ClassId(0),
            MethodKind::HandleBacked(entries),
        )
    }

    fn invoke(handler: &DynCall, ctx: &Context, args: &[Value]) {
        handler(ctx, Value::nil(), args, &Block::none()).unwrap();
    }

    #[test]
    fn test_exact_entry_preferred() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let method = handle_method(&[0, 1, 2], true, &hits);

        let site = descriptor(SiteArity::fixed(1, false));
        let handler = bind(&ctx, &site, &method, ClassId(0)).unwrap();
        invoke(&handler, &ctx, &[Value::nil()]);

        assert_eq!(hits.lock().as_slice(), &[Hit::Exact(1)]);
    }

    #[test]
    fn test_arity_ladder_collects_excess_into_variable_entry() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));
        // Exact entries for 0..=2 only; arity-3 site must use the
        // variable entry with all three arguments packed.
        let method = handle_method(&[0, 1, 2], true, &hits);

        let site = descriptor(SiteArity::fixed(3, false));
        let handler = bind(&ctx, &site, &method, ClassId(0)).unwrap();
        invoke(
            &handler,
            &ctx,
            &[Value::nil(), Value::bool(true), Value::bool(false)],
        );

        assert_eq!(hits.lock().as_slice(), &[Hit::Variable(3)]);
    }

    #[test]
    fn test_arity_ladder_zero_substitutes_empty_array() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));
        // Variable entry only: an arity-0 site must pass an empty array,
        // never omit the argument slot.
        let method = handle_method(&[], true, &hits);

        let site = descriptor(SiteArity::fixed(0, false));
        let handler = bind(&ctx, &site, &method, ClassId(0)).unwrap();
        invoke(&handler, &ctx, &[]);

        assert_eq!(hits.lock().as_slice(), &[Hit::Variable(0)]);
    }

    #[test]
    fn test_variable_site_needs_variable_entry() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let fixed_only = handle_method(&[0, 1], false, &hits);

        let site = descriptor(SiteArity::variable(0, false));
        assert!(bind(&ctx, &site, &fixed_only, ClassId(0)).is_none());

        let with_variable = handle_method(&[0, 1], true, &hits);
        assert!(bind(&ctx, &site, &with_variable, ClassId(0)).is_some());
    }

    #[test]
    fn test_attribute_reader_writer_exclusive() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let class = runtime.define_class("Point", None, &["@x"]);
        let var = Symbol::intern("@x");

        let reader = Method::attribute_reader(Symbol::intern("x"), class.id(), var);
        let writer = Method::attribute_writer(Symbol::intern("x="), class.id(), var);

        let read_site = descriptor(SiteArity::fixed(0, false));
        let write_site = descriptor(SiteArity::fixed(1, false));

        // Matching shapes bind.
        assert!(bind(&ctx, &read_site, &reader, class.id()).is_some());
        assert!(bind(&ctx, &write_site, &writer, class.id()).is_some());

        // A write-arity site must never bind the reader path, and vice
        // versa.
        assert!(bind(&ctx, &write_site, &reader, class.id()).is_none());
        assert!(bind(&ctx, &read_site, &writer, class.id()).is_none());
    }

    #[test]
    fn test_compiled_prefers_specialized_entry() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let scope = Arc::new(StaticScope::new("probe", vec![]));
        let variable_hits = Arc::clone(&hits);
        let variable: CompiledEntry = Arc::new(move |_, _, _, args, _, _, _| {
            variable_hits.lock().push(Hit::Variable(args.len()));
            Ok(Value::nil())
        });
        let special_hits = Arc::clone(&hits);
        let specialized: CompiledEntry = Arc::new(move |_, _, _, args, _, _, _| {
            special_hits.lock().push(Hit::Exact(args.len()));
            Ok(Value::nil())
        });
        let method = Method::new(
            Symbol::intern("probe"),
            ClassId(0),
            MethodKind::Compiled(CompiledMethod {
                variable,
                specialized: [None, Some(specialized), None, None],
                scope,
            }),
        );

        // Arity 1 has a specialized entry.
        let handler = bind(&ctx, &descriptor(SiteArity::fixed(1, false)), &method, ClassId(0))
            .unwrap();
        invoke(&handler, &ctx, &[Value::nil()]);

        // Arity 2 falls back to the uniform entry.
        let handler = bind(&ctx, &descriptor(SiteArity::fixed(2, false)), &method, ClassId(0))
            .unwrap();
        invoke(&handler, &ctx, &[Value::nil(), Value::nil()]);

        assert_eq!(hits.lock().as_slice(), &[Hit::Exact(1), Hit::Variable(2)]);
    }

    #[test]
    fn test_generic_kind_forces_slow_path() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let entry: garnet_runtime::method::GenericEntry =
            Arc::new(|_, _, _, _, _, _| Ok(Value::nil()));
        let method = Method::new(
            Symbol::intern("probe"),
            ClassId(0),
            MethodKind::Generic(entry),
        );

        assert!(bind(
            &ctx,
            &descriptor(SiteArity::fixed(0, false)),
            &method,
            ClassId(0)
        )
        .is_none());
    }

    #[test]
    fn test_generic_binding_reaches_uniform_entry() {
        let runtime = Runtime::new();
        let ctx = runtime.context();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits_inner = Arc::clone(&hits);
        let entry: garnet_runtime::method::GenericEntry =
            Arc::new(move |_, _, _, _, args, _| {
                hits_inner.lock().push(Hit::Variable(args.len()));
                Ok(Value::nil())
            });
        let method = Method::new(
            Symbol::intern("probe"),
            ClassId(0),
            MethodKind::Generic(entry),
        );

        let handler =
            generic_binding(&descriptor(SiteArity::fixed(4, false)), &method, ClassId(0));
        let args = [Value::nil(); 4];
        invoke(&handler, &ctx, &args);
        assert_eq!(hits.lock().as_slice(), &[Hit::Variable(4)]);
    }
}
