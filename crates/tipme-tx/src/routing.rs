//! Routing policy, priority tiers, and block-builder tip-account rotation.

use std::{fmt, str::FromStr};

use rand::{Rng, seq::SliceRandom};
use solana_pubkey::Pubkey;

use crate::builder::TipPlacement;

/// Block-builder tip-collection accounts, rotated per built tip.
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    Pubkey::from_str_const("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    Pubkey::from_str_const("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    Pubkey::from_str_const("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    Pubkey::from_str_const("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    Pubkey::from_str_const("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    Pubkey::from_str_const("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    Pubkey::from_str_const("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    Pubkey::from_str_const("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// How aggressively a transfer pays for inclusion.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum PriorityTier {
    /// Fixed floor fee, low tip ceiling.
    Low,
    /// Estimated fee, configured tip ceiling.
    #[default]
    High,
}

impl PriorityTier {
    /// Returns the lowercase tier label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority tier `{other}`")),
        }
    }
}

/// One independent broadcast path.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Route {
    /// `sendTransaction` on the default RPC endpoint.
    Direct,
    /// `sendTransaction` on the premium RPC endpoint.
    Premium,
    /// `sendBundle` on the block-builder.
    Bundle,
}

impl Route {
    /// Returns the route label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Premium => "premium",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied broadcast configuration.
///
/// The broadcaster applies this as given and never infers routes on its own.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RoutingPolicy {
    /// Submit to the default RPC endpoint.
    pub use_direct: bool,
    /// Submit a bundle with a tip to the block-builder.
    pub use_bundle: bool,
    /// Submit to the premium RPC endpoint.
    pub use_premium_rpc: bool,
    /// Fee and tip aggressiveness.
    pub priority_tier: PriorityTier,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            use_direct: true,
            use_bundle: false,
            use_premium_rpc: false,
            priority_tier: PriorityTier::High,
        }
    }
}

impl RoutingPolicy {
    /// Returns the enabled routes in a stable order.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::with_capacity(3);
        if self.use_direct {
            routes.push(Route::Direct);
        }
        if self.use_premium_rpc {
            routes.push(Route::Premium);
        }
        if self.use_bundle {
            routes.push(Route::Bundle);
        }
        routes
    }

    /// Returns where a tip goes for this policy, or `None` when no route pays one.
    ///
    /// Bundles carry the tip as a sibling unit; a premium-only send carries it inline.
    #[must_use]
    pub const fn tip_placement(&self) -> Option<TipPlacement> {
        if self.use_bundle {
            Some(TipPlacement::Sibling)
        } else if self.use_premium_rpc {
            Some(TipPlacement::Inline)
        } else {
            None
        }
    }
}

/// Picks a tip-collection account uniformly at random.
#[must_use]
pub fn select_tip_account() -> Pubkey {
    select_tip_account_with(&mut rand::thread_rng())
}

/// Picks a tip-collection account uniformly at random from `rng`.
pub fn select_tip_account_with<R: Rng + ?Sized>(rng: &mut R) -> Pubkey {
    let [first, ..] = TIP_ACCOUNTS;
    TIP_ACCOUNTS.choose(rng).copied().unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn routes_follow_policy_flags() {
        let policy = RoutingPolicy {
            use_direct: true,
            use_bundle: true,
            use_premium_rpc: true,
            priority_tier: PriorityTier::High,
        };
        assert_eq!(
            policy.routes(),
            vec![Route::Direct, Route::Premium, Route::Bundle]
        );
        assert_eq!(RoutingPolicy::default().routes(), vec![Route::Direct]);
        let none = RoutingPolicy {
            use_direct: false,
            ..RoutingPolicy::default()
        };
        assert!(none.routes().is_empty());
    }

    #[test]
    fn tip_placement_depends_on_routes() {
        let direct = RoutingPolicy::default();
        assert_eq!(direct.tip_placement(), None);

        let premium = RoutingPolicy {
            use_premium_rpc: true,
            ..RoutingPolicy::default()
        };
        assert_eq!(premium.tip_placement(), Some(TipPlacement::Inline));

        let bundle = RoutingPolicy {
            use_bundle: true,
            use_premium_rpc: true,
            ..RoutingPolicy::default()
        };
        assert_eq!(bundle.tip_placement(), Some(TipPlacement::Sibling));
    }

    #[test]
    fn tip_accounts_rotate_over_whole_set() {
        let mut rng = StdRng::seed_from_u64(7);
        let known: HashSet<Pubkey> = TIP_ACCOUNTS.iter().copied().collect();
        let mut seen = HashSet::new();
        for _ in 0..512 {
            let account = select_tip_account_with(&mut rng);
            assert!(known.contains(&account));
            let _ = seen.insert(account);
        }
        assert_eq!(seen.len(), TIP_ACCOUNTS.len());
        assert!(known.contains(&select_tip_account()));
    }

    #[test]
    fn priority_tier_parses_labels() {
        assert_eq!("low".parse::<PriorityTier>(), Ok(PriorityTier::Low));
        assert_eq!(" HIGH ".parse::<PriorityTier>(), Ok(PriorityTier::High));
        assert!("medium".parse::<PriorityTier>().is_err());
        assert_eq!(PriorityTier::default(), PriorityTier::High);
        assert_eq!(Route::Bundle.to_string(), "bundle");
    }
}
