//! Foreign-call adapter.
//!
//! Adapts a foreign method's concrete parameter/return types into the
//! uniform call shape: the receiver is unwrapped, every parameter is
//! converted through the runtime's coercion table, and the foreign return
//! is boxed back per its declared type.
//!
//! # Failure policy (intentional)
//!
//! Any error raised on the foreign side of the call (including argument
//! conversion) is caught at the boundary and converted to the declared
//! return type's nil/zero default. Foreign faults never propagate to the
//! dynamic program and are never retried. Tests assert the default-value
//! outcome, not an error.

use crate::config::options;
use crate::site::CallSiteDescriptor;
use garnet_runtime::method::{
    from_native, native_default, to_native, unwrap_receiver, DynCall, NativeCall, NativeMethod,
    NativeValue,
};
use log::debug;
use smallvec::SmallVec;
use std::sync::Arc;

/// Try to bind a foreign method directly at `site`.
///
/// Returns `None` (falling through to generic dispatch) when:
/// - the site passes a block literal (closure conversion unsupported),
/// - the invoker's binding semantics are incompatible,
/// - the declared arity does not match the site's arity, unless the
///   signature's single parameter is a variable-length collection,
/// - the signature's trailing parameter is an array type.
#[must_use]
pub fn try_native_binding(site: &CallSiteDescriptor, native: &NativeMethod) -> Option<DynCall> {
    let call = &native.call;

    if site.arity().has_block() {
        if options().log_binding {
            debug!(
                "{}\tpassed a closure to native method {}",
                site.name(),
                call.native_name
            );
        }
        return None;
    }

    if native.special_invoker {
        return None;
    }

    if call.takes_value_array() {
        // A single variable-length collection accepts any site arity.
    } else {
        if site.arity().is_variable() {
            return None;
        }
        if site.arity().required() as usize != call.params.len() {
            if options().log_binding {
                debug!(
                    "{}\tdid not match the arity of native method {}",
                    site.name(),
                    call.native_name
                );
            }
            return None;
        }
        if call.params.len() > 1 && call.params.last().is_some_and(|t| t.is_array()) {
            return None;
        }
    }

    // The assembled adapter is memoized on the method; every accepting
    // site shares the first build.
    let adapter = native.adapter_or_build(|| Some(build_adapter(call.clone())));

    if adapter.is_some() && options().log_binding {
        debug!(
            "{}\tbound directly to native method {}",
            site.name(),
            call.native_name
        );
    }

    adapter
}

/// Assemble the conversion pipeline around a foreign call.
fn build_adapter(call: NativeCall) -> DynCall {
    Arc::new(move |ctx, recv, args, block| {
        let mut natives: SmallVec<[NativeValue; 4]> = SmallVec::new();

        if !call.is_static {
            natives.push(unwrap_receiver(recv));
        }

        if call.takes_value_array() {
            natives.push(NativeValue::Array(args.to_vec()));
        } else {
            for (value, ty) in args.iter().zip(&call.params) {
                match to_native(*value, *ty) {
                    Ok(converted) => natives.push(converted),
                    Err(err) => {
                        debug!(
                            "native argument conversion failed for {}: {err}",
                            call.native_name
                        );
                        return Ok(from_native(call.ret, native_default(call.ret)));
                    }
                }
            }
        }

        match (call.target)(ctx, &natives, block) {
            Ok(ret) => Ok(from_native(call.ret, ret)),
            Err(err) => {
                debug!("native call {} failed: {err}", call.native_name);
                Ok(from_native(call.ret, native_default(call.ret)))
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
