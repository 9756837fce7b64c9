//! Bootstrap entry points.
//!
//! The code generator emits one descriptor per site and calls the matching
//! constructor here exactly once, receiving a live dispatch cell to embed.
//! Descriptor parsing failures (unknown operation, malformed name, unknown
//! encoding) are fatal link-time errors, never runtime dispatch failures.
//!
//! Operation-carrying names use the `operation:operand` form the code
//! generator mangles, e.g. `get:@width` for an attribute site or
//! `set:$stdout` for a global write.

use crate::accessor::{VariableOp, VariableSite};
use crate::global_site::{
    CheckpointSite, ConstantSite, GlobalReadSite, GlobalWriteSite, RuntimeConstant,
};
use crate::literal::{ArraySite, BlockSite, FrozenStringSite, HashSite, StringSite};
use crate::site::InvokeSite;
use garnet_core::error::BootstrapError;
use garnet_core::{SiteArity, Symbol};
use garnet_runtime::block::BlockBody;
use garnet_runtime::class::ClassId;
use garnet_runtime::method::StaticScope;
use garnet_runtime::Runtime;
use std::sync::Arc;

/// A parsed global-variable site.
#[derive(Debug)]
pub enum GlobalSiteHandle {
    /// `get:$name`
    Read(Arc<GlobalReadSite>),
    /// `set:$name`
    Write(Arc<GlobalWriteSite>),
}

/// Bootstrap a plain method dispatch site.
#[must_use]
pub fn invoke(name: &str, encoded_arity: i32) -> Arc<InvokeSite> {
    InvokeSite::new(Symbol::intern(name), SiteArity::decode(encoded_arity))
}

/// Bootstrap a super-call dispatch site for a call lexically inside
/// `owner`.
#[must_use]
pub fn invoke_super(name: &str, encoded_arity: i32, owner: ClassId) -> Arc<InvokeSite> {
    InvokeSite::new_super(Symbol::intern(name), SiteArity::decode(encoded_arity), owner)
}

/// Bootstrap an attribute access site from a `get:@x` / `set:@x`
/// descriptor name.
pub fn variable(name: &str) -> Result<Arc<VariableSite>, BootstrapError> {
    let (operation, operand) = split_operation(name)?;
    let op = match operation {
        "get" => VariableOp::Get,
        "set" => VariableOp::Set,
        _ => {
            return Err(BootstrapError::UnknownOperation {
                operation: operation.to_string(),
            })
        }
    };
    Ok(VariableSite::new(Symbol::intern(operand), op))
}

/// Bootstrap a global-variable site from a `get:$x` / `set:$x` descriptor
/// name, with the source position for degradation logs.
pub fn global(name: &str, file: &str, line: u32) -> Result<GlobalSiteHandle, BootstrapError> {
    let (operation, operand) = split_operation(name)?;
    let sym = Symbol::intern(operand);
    match operation {
        "get" => Ok(GlobalSiteHandle::Read(GlobalReadSite::new(sym, file, line))),
        "set" => Ok(GlobalSiteHandle::Write(GlobalWriteSite::new(sym))),
        _ => Err(BootstrapError::UnknownOperation {
            operation: operation.to_string(),
        }),
    }
}

/// Bootstrap an array literal site.
#[must_use]
pub fn array() -> ArraySite {
    ArraySite::new()
}

/// Bootstrap a hash literal site.
#[must_use]
pub fn hash() -> HashSite {
    HashSite::new()
}

/// Bootstrap a mutable string literal site. The encoding name must be one
/// the runtime knows.
pub fn string(value: &[u8], encoding_name: &str) -> Result<StringSite, BootstrapError> {
    let encoding =
        Runtime::find_encoding(encoding_name).ok_or_else(|| BootstrapError::UnknownEncoding {
            encoding: encoding_name.to_string(),
        })?;
    Ok(StringSite::new(Arc::from(value), encoding))
}

/// Bootstrap a frozen string literal site.
pub fn fstring(
    value: &[u8],
    encoding_name: &str,
    file: &str,
    line: u32,
) -> Result<FrozenStringSite, BootstrapError> {
    if Runtime::find_encoding(encoding_name).is_none() {
        return Err(BootstrapError::UnknownEncoding {
            encoding: encoding_name.to_string(),
        });
    }
    let content = String::from_utf8_lossy(value).into_owned();
    Ok(FrozenStringSite::new(content, file, line))
}

/// Bootstrap a constant singleton fetch site.
pub fn constant(name: &str) -> Result<ConstantSite, BootstrapError> {
    let kind = match name {
        "nil" => RuntimeConstant::Nil,
        "true" => RuntimeConstant::True,
        "false" => RuntimeConstant::False,
        "runtime" => RuntimeConstant::Runtime,
        _ => {
            return Err(BootstrapError::UnknownOperation {
                operation: name.to_string(),
            })
        }
    };
    Ok(ConstantSite::new(kind))
}

/// Bootstrap a block construction site.
#[must_use]
pub fn block(body: Arc<BlockBody>, scope: Arc<StaticScope>) -> BlockSite {
    BlockSite::new(body, scope)
}

/// Bootstrap a checkpoint site.
#[must_use]
pub fn checkpoint() -> Arc<CheckpointSite> {
    CheckpointSite::new()
}

fn split_operation(name: &str) -> Result<(&str, &str), BootstrapError> {
    name.split_once(':')
        .filter(|(op, operand)| !op.is_empty() && !operand.is_empty())
        .ok_or_else(|| BootstrapError::MalformedName {
            name: name.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteState;

    #[test]
    fn test_invoke_site_descriptor_roundtrip() {
        let encoded = SiteArity::fixed(2, true).encode();
        let site = invoke("frobnicate", encoded);
        assert_eq!(site.descriptor().name().resolve(), "frobnicate");
        assert_eq!(site.descriptor().arity(), SiteArity::fixed(2, true));
        assert_eq!(site.state(), SiteState::Uninitialized);
    }

    #[test]
    fn test_variable_parses_operation() {
        let get = variable("get:@width").unwrap();
        assert_eq!(get.op(), VariableOp::Get);
        assert_eq!(get.name().resolve(), "@width");

        let set = variable("set:@width").unwrap();
        assert_eq!(set.op(), VariableOp::Set);
    }

    #[test]
    fn test_variable_rejects_bad_descriptors() {
        assert!(matches!(
            variable("noseparator"),
            Err(BootstrapError::MalformedName { .. })
        ));
        assert!(matches!(
            variable("swap:@x"),
            Err(BootstrapError::UnknownOperation { .. })
        ));
        assert!(matches!(
            variable(":@x"),
            Err(BootstrapError::MalformedName { .. })
        ));
    }

    #[test]
    fn test_global_parses_operation() {
        match global("get:$stdout", "probe.grt", 1).unwrap() {
            GlobalSiteHandle::Read(site) => assert_eq!(site.name().resolve(), "$stdout"),
            other => panic!("expected read site, got {other:?}"),
        }
        match global("set:$stdout", "probe.grt", 2).unwrap() {
            GlobalSiteHandle::Write(site) => assert_eq!(site.name().resolve(), "$stdout"),
            other => panic!("expected write site, got {other:?}"),
        }
        assert!(global("swap:$x", "probe.grt", 3).is_err());
    }

    #[test]
    fn test_string_validates_encoding() {
        assert!(string(b"ok", "UTF-8").is_ok());
        assert!(string(b"ok", "BINARY").is_ok());
        assert!(matches!(
            string(b"bad", "KOI8-R"),
            Err(BootstrapError::UnknownEncoding { .. })
        ));
        assert!(matches!(
            fstring(b"bad", "KOI8-R", "probe.grt", 1),
            Err(BootstrapError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn test_constant_names() {
        assert_eq!(constant("nil").unwrap().kind(), RuntimeConstant::Nil);
        assert_eq!(constant("true").unwrap().kind(), RuntimeConstant::True);
        assert_eq!(constant("false").unwrap().kind(), RuntimeConstant::False);
        assert_eq!(
            constant("runtime").unwrap().kind(),
            RuntimeConstant::Runtime
        );
        assert!(matches!(
            constant("self"),
            Err(BootstrapError::UnknownOperation { .. })
        ));
    }
}
