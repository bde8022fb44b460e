//! Inlining policies.

use std::fmt;

use crate::cir::BlockId;

/// Why a block is eligible for inlining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlineReason {
    /// The block has at most one incoming call.
    SingleCall,
    /// The block's body only forwards to a continuation parameter.
    Trampoline,
    /// The block's body is a switch whose discriminant is constant at the call site.
    ConstantSwitch,
}

impl fmt::Display for InlineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleCall => "single call",
            Self::Trampoline => "trampoline",
            Self::ConstantSwitch => "constant switch",
        })
    }
}

/// An eligible block at one call site, as presented to an [`InliningPolicy`].
#[derive(Debug, Clone)]
pub struct InlineCandidate {
    /// The block.
    pub block: BlockId,
    /// Why it is eligible.
    pub reason: InlineReason,
    /// Number of incoming calls.
    pub incoming: usize,
    /// Number of calls in the block's closure tree.
    pub size: usize,
    /// Blocks already inlined into the method.
    pub inlined_so_far: usize,
}

/// Decides which eligible blocks are actually inlined.
///
/// Eligibility (single call, trampoline, constant switch, never self-recursive) is
/// established by the optimizer; a policy can only veto.
pub trait InliningPolicy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns `true` to inline `candidate`.
    fn should_inline(&self, candidate: &InlineCandidate) -> bool;
}

/// Inlines every eligible block.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPolicy;

impl InliningPolicy for StaticPolicy {
    fn name(&self) -> &'static str {
        "static"
    }

    fn should_inline(&self, _candidate: &InlineCandidate) -> bool {
        true
    }
}

/// Inlines blocks that do not grow the method, and duplicating ones up to a size.
///
/// Inlining a block with a single incoming call removes the block, so it never grows
/// code. Other candidates are copied once per call site and are accepted only while
/// their size stays within `max_size`.
#[derive(Debug, Clone, Copy)]
pub struct DynamicPolicy {
    /// Largest block, in calls, that may be duplicated.
    pub max_size: usize,
}

impl Default for DynamicPolicy {
    fn default() -> Self {
        Self { max_size: 24 }
    }
}

impl InliningPolicy for DynamicPolicy {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn should_inline(&self, candidate: &InlineCandidate) -> bool {
        candidate.incoming <= 1 || candidate.size <= self.max_size
    }
}

/// Inlines eligible blocks until a fixed number has been inlined.
#[derive(Debug, Clone, Copy)]
pub struct BudgetPolicy(pub u32);

impl InliningPolicy for BudgetPolicy {
    fn name(&self) -> &'static str {
        "budget"
    }

    fn should_inline(&self, candidate: &InlineCandidate) -> bool {
        candidate.inlined_so_far < self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(incoming: usize, size: usize, inlined_so_far: usize) -> InlineCandidate {
        InlineCandidate {
            block: BlockId::new(0),
            reason: InlineReason::ConstantSwitch,
            incoming,
            size,
            inlined_so_far,
        }
    }

    #[test]
    fn test_dynamic_policy_limits_duplication() {
        let policy = DynamicPolicy { max_size: 4 };
        assert!(policy.should_inline(&candidate(1, 100, 0)));
        assert!(policy.should_inline(&candidate(3, 4, 0)));
        assert!(!policy.should_inline(&candidate(3, 5, 0)));
    }

    #[test]
    fn test_budget_policy_counts() {
        let policy = BudgetPolicy(2);
        assert!(policy.should_inline(&candidate(1, 1, 1)));
        assert!(!policy.should_inline(&candidate(1, 1, 2)));
        assert!(!BudgetPolicy(0).should_inline(&candidate(1, 1, 0)));
        assert!(StaticPolicy.should_inline(&candidate(9, 900, 900)));
    }
}
