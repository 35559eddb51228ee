//! Redundancy Filter.
//!
//! Narrows a publication's heading list to one branch of the MeSH tree
//! (diseases by default) and drops headings that are ancestors of another
//! heading in the same list: if a paper is indexed with both `Neoplasms`
//! (`C04`) and `Breast Neoplasms` (`C04.588.180`), only the more specific
//! one is kept.
//!
//! Containment is a plain string-prefix test between tree numbers, checked
//! pairwise across all kept headings (O(n²) pairs, each comparing every code
//! of one heading with every code of the other).
//!
//! # Identical tree numbers
//!
//! The prefix test is reflexive, so two distinct headings that share an
//! identical tree number each look like an ancestor of the other. What
//! happens then is an explicit [`DuplicateCodePolicy`] choice rather than an
//! accident of the comparison. One shared code is enough: a heading with
//! codes `C04` and `C99.1` listed after one with `C04` alone is collapsed
//! away even though its second code is unique.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{MeshNormError, Result};
use crate::hierarchy::{HierarchyLookup, HierarchyResolver, TreeNumbers};

/// How to treat two kept headings that share an identical tree number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateCodePolicy {
    /// Treat equality as containment both ways: both headings are dropped.
    DropBoth,
    /// Equality is not containment: both headings are kept.
    KeepBoth,
    /// Keep the first heading in list order and drop the later ones.
    #[default]
    Collapse,
}

impl FromStr for DuplicateCodePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "drop-both" => Ok(Self::DropBoth),
            "keep-both" => Ok(Self::KeepBoth),
            "collapse" => Ok(Self::Collapse),
            other => Err(format!(
                "unknown duplicate policy '{other}' (expected drop-both, keep-both or collapse)"
            )),
        }
    }
}

/// The set of tree-number prefixes a heading must fall under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBranch {
    prefixes: Vec<String>,
}

impl TargetBranch {
    /// Diseases, tree category `C`.
    pub fn disease() -> Self {
        Self {
            prefixes: vec!["C".to_string()],
        }
    }

    /// Investigative techniques, tree branch `E05`.
    pub fn exp_strat() -> Self {
        Self {
            prefixes: vec!["E05".to_string()],
        }
    }

    /// Build from explicit prefixes.
    pub fn from_prefixes<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.as_ref().trim();
            if prefix.is_empty() || prefix.contains(',') {
                return Err(MeshNormError::InvalidPrefix(prefix.to_string()));
            }
            if !out.iter().any(|p| p == prefix) {
                out.push(prefix.to_string());
            }
        }
        if out.is_empty() {
            return Err(MeshNormError::InvalidPrefix(String::new()));
        }
        Ok(Self { prefixes: out })
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether any of `codes` lies in this branch.
    pub fn matches(&self, codes: &[String]) -> bool {
        codes
            .iter()
            .any(|code| self.prefixes.iter().any(|p| code.starts_with(p.as_str())))
    }
}

impl Default for TargetBranch {
    fn default() -> Self {
        Self::disease()
    }
}

impl fmt::Display for TargetBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefixes.join("+"))
    }
}

/// Parses `disease`, `exp_strat`, or a `+`-separated list of raw prefixes
/// such as `C04+C15`.
impl FromStr for TargetBranch {
    type Err = MeshNormError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "disease" => Ok(Self::disease()),
            "exp_strat" => Ok(Self::exp_strat()),
            raw => Self::from_prefixes(raw.split('+')),
        }
    }
}

/// Branch and nesting filter over heading lists.
pub struct RedundancyFilter<'r, L> {
    resolver: &'r HierarchyResolver<L>,
    branch: TargetBranch,
    keep_nested: bool,
    policy: DuplicateCodePolicy,
}

impl<'r, L: HierarchyLookup> RedundancyFilter<'r, L> {
    pub fn new(resolver: &'r HierarchyResolver<L>, branch: TargetBranch) -> Self {
        Self {
            resolver,
            branch,
            keep_nested: false,
            policy: DuplicateCodePolicy::default(),
        }
    }

    /// Keep ancestor headings instead of dropping them.
    pub fn keep_nested(mut self, keep_nested: bool) -> Self {
        self.keep_nested = keep_nested;
        self
    }

    pub fn with_policy(mut self, policy: DuplicateCodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resolver(&self) -> &'r HierarchyResolver<L> {
        self.resolver
    }

    /// Filter a heading list.
    ///
    /// Headings without tree numbers, or with none in the target branch,
    /// are dropped. Unless `keep_nested` is set, a heading is also dropped
    /// when one of its tree numbers is a prefix of a tree number of another
    /// kept heading. Output preserves input order.
    ///
    /// Errors only when the lookup collaborator fails.
    pub fn filter(&self, headings: Option<&[String]>) -> Result<Vec<String>> {
        let headings = match headings {
            Some(h) if !h.is_empty() => h,
            _ => return Ok(Vec::new()),
        };

        let mut in_branch: Vec<(&str, TreeNumbers)> = Vec::with_capacity(headings.len());
        for heading in headings {
            match self.resolver.resolve(heading)? {
                Some(codes) if self.branch.matches(&codes) => in_branch.push((heading.as_str(), codes)),
                _ => debug!(heading = %heading, branch = %self.branch, "Heading outside target branch"),
            }
        }

        if self.keep_nested {
            return Ok(in_branch.into_iter().map(|(h, _)| h.to_string()).collect());
        }

        let kept = in_branch
            .iter()
            .enumerate()
            .filter(|&(i, (heading, codes))| {
                let redundant = in_branch
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .any(|(j, (_, other))| self.contains(codes, other, j < i));
                if redundant {
                    debug!(heading = %heading, "Dropping ancestor heading");
                }
                !redundant
            })
            .map(|(_, (heading, _))| heading.to_string())
            .collect();

        Ok(kept)
    }

    /// Whether `codes` is an ancestor (or, per policy, a duplicate) of
    /// `other`. `other_first` is true when `other` precedes in list order.
    fn contains(&self, codes: &[String], other: &[String], other_first: bool) -> bool {
        codes.iter().any(|sub| {
            other.iter().any(|sup| {
                if sup.len() > sub.len() {
                    return sup.starts_with(sub.as_str());
                }
                if sup != sub {
                    return false;
                }
                match self.policy {
                    DuplicateCodePolicy::DropBoth => true,
                    DuplicateCodePolicy::KeepBoth => false,
                    DuplicateCodePolicy::Collapse => other_first,
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::fixtures::StubLookup;
    use std::sync::Arc;

    fn headings(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    fn resolver() -> HierarchyResolver<Arc<StubLookup>> {
        HierarchyResolver::new(Arc::new(StubLookup::new(&[
            ("Neoplasms", "C04"),
            ("Breast Neoplasms", "C04.588.180,C17.800.090.500"),
            ("Arthritis", "C05.116.099"),
            ("Humans", "B01.050.150.900.649.313.988.400.112.400.400"),
            ("Female", "B01.050.150.900.649.313.988.400.112.400.400.300"),
            ("Skin Diseases", "C17.800"),
            ("Cancer Alias", "C04"),
            ("Tumor Alias", "C04"),
            ("Mixed Tumor", "C04,C99.1"),
            ("Sequence Analysis", "E05.393.760"),
            ("Leukemia", "C04.557.337,C15.604.515.560"),
        ])))
    }

    #[test]
    fn test_drops_ancestor_heading() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());

        let out = filter
            .filter(Some(headings(&["Neoplasms", "Breast Neoplasms", "Arthritis"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Breast Neoplasms", "Arthritis"]));
    }

    #[test]
    fn test_keep_nested_returns_branch_in_order() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease()).keep_nested(true);

        let out = filter
            .filter(Some(headings(&["Neoplasms", "Breast Neoplasms", "Arthritis"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Neoplasms", "Breast Neoplasms", "Arthritis"]));
    }

    #[test]
    fn test_empty_and_absent_lists() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());

        assert!(filter.filter(None).unwrap().is_empty());
        assert!(filter.filter(Some(&[][..])).unwrap().is_empty());
        assert_eq!(resolver.lookup_calls(), 0);
    }

    #[test]
    fn test_non_branch_and_unknown_headings_dropped() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());

        let out = filter
            .filter(Some(headings(&["Humans", "Female", "Leukemia", "Not A Heading"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Leukemia"]));
        assert_eq!(resolver.unresolved(), vec!["Not A Heading".to_string()]);
    }

    #[test]
    fn test_any_code_can_contain() {
        // Breast Neoplasms' second code sits under Skin Diseases
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());

        let out = filter
            .filter(Some(headings(&["Skin Diseases", "Breast Neoplasms"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Breast Neoplasms"]));
    }

    #[test]
    fn test_other_branch_prefix() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::exp_strat());

        let out = filter
            .filter(Some(headings(&["Sequence Analysis", "Leukemia", "Humans"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Sequence Analysis"]));
    }

    #[test]
    fn test_output_has_no_ancestor_pairs() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());
        let input = headings(&[
            "Leukemia",
            "Neoplasms",
            "Skin Diseases",
            "Arthritis",
            "Breast Neoplasms",
        ]);

        let out = filter.filter(Some(input.as_slice())).unwrap();
        for a in &out {
            for b in &out {
                if a == b {
                    continue;
                }
                let ca = resolver.resolve(a).unwrap().unwrap();
                let cb = resolver.resolve(b).unwrap().unwrap();
                let nested = ca
                    .iter()
                    .any(|x| cb.iter().any(|y| y.len() > x.len() && y.starts_with(x.as_str())));
                assert!(!nested, "{a} is an ancestor of {b}");
            }
        }
        assert_eq!(out, headings(&["Leukemia", "Arthritis", "Breast Neoplasms"]));
    }

    // Two distinct headings sharing the exact tree number "C04". The plain
    // prefix comparison counts this as mutual containment; each policy
    // resolves it differently and all three are pinned here.

    #[test]
    fn test_identical_codes_drop_both() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease())
            .with_policy(DuplicateCodePolicy::DropBoth);

        let out = filter
            .filter(Some(headings(&["Cancer Alias", "Tumor Alias", "Arthritis"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Arthritis"]));
    }

    #[test]
    fn test_identical_codes_keep_both() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease())
            .with_policy(DuplicateCodePolicy::KeepBoth);

        let out = filter
            .filter(Some(headings(&["Cancer Alias", "Tumor Alias", "Arthritis"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Cancer Alias", "Tumor Alias", "Arthritis"]));
    }

    #[test]
    fn test_identical_codes_collapse_to_first() {
        let resolver = resolver();
        let filter = RedundancyFilter::new(&resolver, TargetBranch::disease());

        let out = filter
            .filter(Some(headings(&["Tumor Alias", "Cancer Alias", "Arthritis"]).as_slice()))
            .unwrap();
        assert_eq!(out, headings(&["Tumor Alias", "Arthritis"]));
    }

    #[test]
    fn test_one_shared_code_collapses() {
        // Mixed Tumor also carries C99.1, which Neoplasms lacks
        let resolver = resolver();
        let input = headings(&["Neoplasms", "Mixed Tumor", "Arthritis"]);

        let collapse = RedundancyFilter::new(&resolver, TargetBranch::disease());
        assert_eq!(
            collapse.filter(Some(input.as_slice())).unwrap(),
            headings(&["Neoplasms", "Arthritis"])
        );

        let keep_both = RedundancyFilter::new(&resolver, TargetBranch::disease())
            .with_policy(DuplicateCodePolicy::KeepBoth);
        assert_eq!(keep_both.filter(Some(input.as_slice())).unwrap(), input);
    }

    #[test]
    fn test_identical_codes_still_dropped_as_ancestors() {
        // Both aliases are ancestors of Breast Neoplasms under every policy
        let resolver = resolver();
        for policy in [
            DuplicateCodePolicy::DropBoth,
            DuplicateCodePolicy::KeepBoth,
            DuplicateCodePolicy::Collapse,
        ] {
            let filter =
                RedundancyFilter::new(&resolver, TargetBranch::disease()).with_policy(policy);
            let out = filter
                .filter(Some(headings(&["Cancer Alias", "Tumor Alias", "Breast Neoplasms"]).as_slice()))
                .unwrap();
            assert_eq!(out, headings(&["Breast Neoplasms"]), "{policy:?}");
        }
    }

    #[test]
    fn test_repeated_heading_policies() {
        let resolver = resolver();
        let input = headings(&["Arthritis", "Arthritis"]);

        let collapse = RedundancyFilter::new(&resolver, TargetBranch::disease());
        assert_eq!(collapse.filter(Some(input.as_slice())).unwrap(), headings(&["Arthritis"]));

        let drop_both = RedundancyFilter::new(&resolver, TargetBranch::disease())
            .with_policy(DuplicateCodePolicy::DropBoth);
        assert!(drop_both.filter(Some(input.as_slice())).unwrap().is_empty());
    }

    #[test]
    fn test_target_branch_parsing() {
        assert_eq!("disease".parse::<TargetBranch>().unwrap(), TargetBranch::disease());
        assert_eq!("exp_strat".parse::<TargetBranch>().unwrap().prefixes(), &["E05"]);
        assert_eq!(
            "C04+C15+C04".parse::<TargetBranch>().unwrap().prefixes(),
            &["C04", "C15"]
        );
        assert!("".parse::<TargetBranch>().is_err());
        assert!("C04,C15".parse::<TargetBranch>().is_err());
    }

    #[test]
    fn test_duplicate_policy_parsing() {
        assert_eq!("collapse".parse::<DuplicateCodePolicy>().unwrap(), DuplicateCodePolicy::Collapse);
        assert_eq!("drop_both".parse::<DuplicateCodePolicy>().unwrap(), DuplicateCodePolicy::DropBoth);
        assert_eq!("Keep-Both".parse::<DuplicateCodePolicy>().unwrap(), DuplicateCodePolicy::KeepBoth);
        assert!("merge".parse::<DuplicateCodePolicy>().is_err());
    }
}
