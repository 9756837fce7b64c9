//! Calling-convention adaptation.
//!
//! A call site's shape is fixed at compile time: `(context, receiver,
//! positional*, block)`. Target entries want other shapes: an exact
//! positional count, a packed argument array, an inserted static scope.
//! The resolver bridges the two with a small set of composable adaptation
//! primitives computed once at specialization time as plain data, then
//! baked into the installed handler.

use garnet_core::{SiteArity, Value};
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Target shapes
// =============================================================================

/// The positional shape a target entry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    /// Exactly `n` exploded positional arguments.
    Fixed(usize),
    /// One packed argument array of any length.
    Variable,
}

/// One adaptation step between a site's shape and a target's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adaptation {
    /// Pass the missing-block sentinel where the target wants a block the
    /// site does not supply.
    SupplyMissingBlock,
    /// Bundle the site's positional arguments into one array parameter.
    CollectArgs {
        /// How many positionals get bundled.
        count: usize,
    },
    /// Substitute an empty argument array for a zero-arity site calling a
    /// variable-arity target. The argument slot is never simply omitted.
    InsertEmptyArgs,
}

// =============================================================================
// Adaptation plan
// =============================================================================

/// The ordered adaptation steps bridging one site to one target entry.
#[derive(Clone, PartialEq, Eq)]
pub struct AdaptationPlan {
    target: TargetShape,
    steps: SmallVec<[Adaptation; 2]>,
}

impl AdaptationPlan {
    /// The target shape this plan feeds.
    #[must_use]
    pub fn target(&self) -> TargetShape {
        self.target
    }

    /// The steps, in application order.
    #[must_use]
    pub fn steps(&self) -> &[Adaptation] {
        &self.steps
    }

    /// Whether the plan bundles positionals into an array.
    #[must_use]
    pub fn collects(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, Adaptation::CollectArgs { .. }))
    }

    /// Apply the positional steps to the site's arguments.
    ///
    /// For a variable target the result is the packed argument array; for
    /// a fixed target it is the exact positional list.
    #[must_use]
    pub fn arguments<'a>(&self, args: &'a [Value]) -> &'a [Value] {
        if self.steps.contains(&Adaptation::InsertEmptyArgs) {
            &[]
        } else {
            args
        }
    }
}

impl fmt::Debug for AdaptationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptationPlan")
            .field("target", &self.target)
            .field("steps", &self.steps.as_slice())
            .finish()
    }
}

/// Compute the adaptation plan bridging `site` to `target`, or `None` when
/// no adaptation exists (the caller falls through its decision ladder).
#[must_use]
pub fn plan_for(site: SiteArity, target: TargetShape) -> Option<AdaptationPlan> {
    let mut steps: SmallVec<[Adaptation; 2]> = SmallVec::new();

    match target {
        TargetShape::Fixed(n) => {
            // Exact entries only accept their own arity; a variable site
            // cannot be exploded without knowing its length statically.
            if site.is_variable() || site.required() as usize != n {
                return None;
            }
        }
        TargetShape::Variable => {
            if !site.is_variable() {
                let n = site.required() as usize;
                if n == 0 {
                    steps.push(Adaptation::InsertEmptyArgs);
                } else {
                    steps.push(Adaptation::CollectArgs { count: n });
                }
            }
            // A variable site already passes a packed collection.
        }
    }

    if !site.has_block() {
        steps.push(Adaptation::SupplyMissingBlock);
    }

    Some(AdaptationPlan { target, steps })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_to_fixed_same_arity() {
        let plan = plan_for(SiteArity::fixed(2, true), TargetShape::Fixed(2)).unwrap();
        assert_eq!(plan.target(), TargetShape::Fixed(2));
        assert!(plan.steps().is_empty());
    }

    #[test]
    fn test_fixed_to_fixed_mismatch_rejected() {
        assert!(plan_for(SiteArity::fixed(1, false), TargetShape::Fixed(2)).is_none());
        assert!(plan_for(SiteArity::variable(0, false), TargetShape::Fixed(0)).is_none());
    }

    #[test]
    fn test_zero_arity_to_variable_inserts_empty() {
        let plan = plan_for(SiteArity::fixed(0, false), TargetShape::Variable).unwrap();
        assert!(plan.steps().contains(&Adaptation::InsertEmptyArgs));

        let args = [Value::nil()];
        assert!(plan.arguments(&args[..0]).is_empty());
    }

    #[test]
    fn test_positional_to_variable_collects() {
        let plan = plan_for(SiteArity::fixed(3, false), TargetShape::Variable).unwrap();
        assert!(plan.collects());
        assert!(plan
            .steps()
            .contains(&Adaptation::CollectArgs { count: 3 }));

        let args = [Value::nil(), Value::bool(true), Value::bool(false)];
        assert_eq!(plan.arguments(&args).len(), 3);
    }

    #[test]
    fn test_variable_to_variable_passes_through() {
        let plan = plan_for(SiteArity::variable(0, false), TargetShape::Variable).unwrap();
        assert!(!plan.collects());
        assert!(!plan.steps().contains(&Adaptation::InsertEmptyArgs));
    }

    #[test]
    fn test_blockless_site_supplies_sentinel() {
        let plan = plan_for(SiteArity::fixed(1, false), TargetShape::Fixed(1)).unwrap();
        assert_eq!(plan.steps(), &[Adaptation::SupplyMissingBlock]);

        let with_block = plan_for(SiteArity::fixed(1, true), TargetShape::Fixed(1)).unwrap();
        assert!(with_block.steps().is_empty());
    }
}
