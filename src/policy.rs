//! Version Policy (spec §4.2, C2): pure function deciding which versions
//! should be served.

use std::collections::BTreeSet;

/// Policy configuration for one model (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfig {
    /// Serve the `n` numerically largest available versions.
    Latest(u32),
    /// Serve exactly the versions in `S` that exist on disk.
    Specific(BTreeSet<u64>),
    /// Serve every version present on disk.
    All,
}

impl PolicyConfig {
    /// Versions this policy would serve out of `observed`, independent of
    /// what's currently loaded.
    pub fn serve_set(&self, observed: &BTreeSet<u64>) -> BTreeSet<u64> {
        match self {
            PolicyConfig::Latest(n) => observed
                .iter()
                .rev()
                .take(*n as usize)
                .copied()
                .collect(),
            PolicyConfig::Specific(set) => observed.intersection(set).copied().collect(),
            PolicyConfig::All => observed.clone(),
        }
    }
}

/// Outcome of applying a policy to the current observed/loaded state
/// (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub to_load: BTreeSet<u64>,
    pub to_unload: BTreeSet<u64>,
    pub to_serve: BTreeSet<u64>,
}

/// `decide(observed_versions, loaded_versions, cfg)` (spec §4.2).
///
/// `to_serve` is the policy applied to `observed_versions`; `to_load` is
/// what's in `to_serve` but not yet `loaded_versions`; `to_unload` is the
/// reverse. Empty `observed_versions` yields an entirely empty `Decision`.
pub fn decide(
    observed_versions: &BTreeSet<u64>,
    loaded_versions: &BTreeSet<u64>,
    cfg: &PolicyConfig,
) -> Decision {
    let to_serve = cfg.serve_set(observed_versions);
    let to_load = to_serve.difference(loaded_versions).copied().collect();
    let to_unload = loaded_versions.difference(&to_serve).copied().collect();

    Decision {
        to_load,
        to_unload,
        to_serve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u64]) -> BTreeSet<u64> {
        items.iter().copied().collect()
    }

    #[test]
    fn latest_prefers_numerically_larger() {
        let cfg = PolicyConfig::Latest(1);
        let decision = decide(&set(&[1, 2]), &set(&[]), &cfg);
        assert_eq!(decision.to_serve, set(&[2]));
        assert_eq!(decision.to_load, set(&[2]));
    }

    #[test]
    fn latest_partial_serve_set_is_acceptable() {
        // Open Question 1: fewer than N loadable versions is fine.
        let cfg = PolicyConfig::Latest(5);
        let decision = decide(&set(&[1, 2]), &set(&[]), &cfg);
        assert_eq!(decision.to_serve, set(&[1, 2]));
    }

    #[test]
    fn specific_only_serves_existing_members() {
        let cfg = PolicyConfig::Specific(set(&[1, 3, 4]));
        let decision = decide(&set(&[1, 4]), &set(&[]), &cfg);
        assert_eq!(decision.to_serve, set(&[1, 4]));
    }

    #[test]
    fn s2_churn_scenario() {
        // spec §8 S2: SPECIFIC={1,3,4}, start {1,4}, remove 4 add 3.
        let cfg = PolicyConfig::Specific(set(&[1, 3, 4]));
        let loaded = set(&[1, 4]);
        let decision = decide(&set(&[1, 3]), &loaded, &cfg);
        assert_eq!(decision.to_serve, set(&[1, 3]));
        assert_eq!(decision.to_load, set(&[3]));
        assert_eq!(decision.to_unload, set(&[4]));
    }

    #[test]
    fn all_serves_everything_observed() {
        let cfg = PolicyConfig::All;
        let decision = decide(&set(&[5, 6, 7]), &set(&[5]), &cfg);
        assert_eq!(decision.to_serve, set(&[5, 6, 7]));
        assert_eq!(decision.to_load, set(&[6, 7]));
        assert_eq!(decision.to_unload, set(&[]));
    }

    #[test]
    fn empty_observed_is_empty_everything() {
        let cfg = PolicyConfig::All;
        let decision = decide(&set(&[]), &set(&[1, 2]), &cfg);
        assert_eq!(decision.to_serve, set(&[]));
        assert_eq!(decision.to_load, set(&[]));
        assert_eq!(decision.to_unload, set(&[1, 2]));
    }

    #[test]
    fn decide_is_idempotent_when_reapplied() {
        // property 4: re-applying with loaded' = loaded ∪ to_load \ to_unload
        // must not produce further load/unload churn.
        let cfg = PolicyConfig::Latest(2);
        let observed = set(&[1, 2, 3]);
        let first = decide(&observed, &set(&[]), &cfg);

        let loaded_next: BTreeSet<u64> = first
            .to_load
            .union(&BTreeSet::new())
            .copied()
            .collect::<BTreeSet<_>>()
            .difference(&first.to_unload)
            .copied()
            .collect();

        let second = decide(&observed, &loaded_next, &cfg);
        assert!(second.to_load.is_empty());
        assert!(second.to_unload.is_empty());
        assert_eq!(second.to_serve, first.to_serve);
    }
}
