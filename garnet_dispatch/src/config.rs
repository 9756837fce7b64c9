//! Binding options.
//!
//! Compiled-in defaults overridable through process environment variables,
//! resolved once on first use:
//!
//! | variable                  | default | effect                                   |
//! |---------------------------|---------|------------------------------------------|
//! | `GARNET_LOG_BINDING`      | off     | log every binding decision               |
//! | `GARNET_GLOBAL_MAX_FAIL`  | 100     | global read re-links before going direct |
//! | `GARNET_SITE_MAX_FAIL`    | 8       | call-site re-links before going generic  |
//! | `GARNET_ATTR_CHAIN_DEPTH` | 4       | attribute-site shapes before uncached    |

use std::sync::OnceLock;

/// Tunables for binding and degradation decisions.
#[derive(Debug, Clone)]
pub struct BindingOptions {
    /// Log binding decisions through the `log` facade.
    pub log_binding: bool,
    /// Re-link budget of a global-variable read site.
    pub global_max_failures: u32,
    /// Re-link budget of a method call site.
    pub site_max_failures: u32,
    /// Receiver-shape budget of an attribute site.
    pub attribute_chain_depth: usize,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            log_binding: false,
            global_max_failures: 100,
            site_max_failures: 8,
            attribute_chain_depth: 4,
        }
    }
}

impl BindingOptions {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_binding: env_flag("GARNET_LOG_BINDING").unwrap_or(defaults.log_binding),
            global_max_failures: env_number("GARNET_GLOBAL_MAX_FAIL")
                .unwrap_or(defaults.global_max_failures),
            site_max_failures: env_number("GARNET_SITE_MAX_FAIL")
                .unwrap_or(defaults.site_max_failures),
            attribute_chain_depth: env_number("GARNET_ATTR_CHAIN_DEPTH")
                .unwrap_or(defaults.attribute_chain_depth),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    Some(matches!(raw.as_str(), "1" | "true" | "yes" | "on"))
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

static OPTIONS: OnceLock<BindingOptions> = OnceLock::new();

/// The process-wide binding options.
pub fn options() -> &'static BindingOptions {
    OPTIONS.get_or_init(BindingOptions::from_env)
}

// =============================================================================
// Tests
// =============================================================================
