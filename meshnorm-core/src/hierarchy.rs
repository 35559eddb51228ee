//! MeSH tree-number resolution with a run-scoped memo cache.
//!
//! A tree number such as `C04.588.180` places a heading in the MeSH
//! hierarchy; a tree number that is a string prefix of another marks an
//! ancestor. Tree numbers come from an external [`HierarchyLookup`]
//! collaborator that may be slow or rate-limited, so the
//! [`HierarchyResolver`] issues at most one exact + fallback call pair per
//! distinct term for its whole lifetime, remembering "not found" as well.
//!
//! # Cache Lifecycle
//!
//! - Created once per run and passed to the components that need it
//! - Insert-only: a resolved entry never changes
//! - Dropped with the resolver at the end of the run
//!
//! # Thread Safety
//!
//! Hits take a shared read lock. Misses are serialized through an
//! upgradable lock so readers keep going while one lookup is in flight,
//! and two workers asking for the same term cannot both reach the
//! collaborator.
//!
//! The collaborator call runs while the upgradable lock is held, so cold
//! lookups for different terms also run one at a time across the pool. A
//! parallel batch only gains over a sequential one for terms already in the
//! cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::nlp::normalize_term;

/// Tree numbers for one term, in lookup order.
pub type TreeNumbers = Arc<[String]>;

/// Split a comma-joined tree number list.
///
/// Whitespace around each code is dropped, as are empty entries.
///
/// # Example
/// ```
/// use meshnorm_core::hierarchy::parse_tree_numbers;
///
/// assert_eq!(parse_tree_numbers("C04.588.180, C17.800.090.500"), vec!["C04.588.180", "C17.800.090.500"]);
/// assert!(parse_tree_numbers(" , ").is_empty());
/// ```
pub fn parse_tree_numbers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// External source of tree numbers.
///
/// Both searches return a comma-joined tree number list, or `None` when the
/// source has nothing for the term. `Err` is reserved for collaborator
/// failures (network, rate limiting) and is never memoized.
pub trait HierarchyLookup: Send + Sync {
    /// Exact heading match.
    fn exact_search(&self, term: &str) -> Result<Option<String>>;

    /// Looser match used when the exact search finds nothing, typically
    /// because of punctuation or special characters in the term.
    fn fallback_search(&self, term: &str) -> Result<Option<String>>;
}

impl<L: HierarchyLookup + ?Sized> HierarchyLookup for Arc<L> {
    fn exact_search(&self, term: &str) -> Result<Option<String>> {
        (**self).exact_search(term)
    }

    fn fallback_search(&self, term: &str) -> Result<Option<String>> {
        (**self).fallback_search(term)
    }
}

/// Memoized outcome for one term.
#[derive(Debug, Clone)]
enum Resolution {
    Found(TreeNumbers),
    NotFound,
}

impl Resolution {
    fn codes(&self) -> Option<TreeNumbers> {
        match self {
            Resolution::Found(codes) => Some(Arc::clone(codes)),
            Resolution::NotFound => None,
        }
    }
}

/// Memoizing front for a [`HierarchyLookup`].
pub struct HierarchyResolver<L> {
    lookup: L,
    memo: RwLock<HashMap<String, Resolution>>,
    /// External calls issued (exact and fallback counted separately)
    calls: AtomicU64,
}

impl<L: HierarchyLookup> HierarchyResolver<L> {
    /// Create a resolver with an empty cache.
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            memo: RwLock::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Tree numbers for `term`, or `None` if the hierarchy has none.
    ///
    /// The first call for a term runs the exact search, then the fallback
    /// search if the exact one yields no codes. Every later call for the
    /// same term is answered from the cache, including a cached "none".
    pub fn resolve(&self, term: &str) -> Result<Option<TreeNumbers>> {
        if let Some(hit) = self.memo.read().get(term) {
            return Ok(hit.codes());
        }

        let memo = self.memo.upgradable_read();
        // Another worker may have resolved it while we waited
        if let Some(hit) = memo.get(term) {
            return Ok(hit.codes());
        }

        let resolution = self.fetch(term)?;
        let codes = resolution.codes();
        let mut memo = RwLockUpgradableReadGuard::upgrade(memo);
        memo.insert(term.to_string(), resolution);

        Ok(codes)
    }

    fn fetch(&self, term: &str) -> Result<Resolution> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(codes) = non_empty(self.lookup.exact_search(term)?) {
            debug!(term, codes = codes.len(), "Resolved tree numbers by exact search");
            return Ok(Resolution::Found(codes));
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(codes) = non_empty(self.lookup.fallback_search(term)?) {
            debug!(term, codes = codes.len(), "Resolved tree numbers by fallback search");
            return Ok(Resolution::Found(codes));
        }

        debug!(term, "No tree numbers found");
        Ok(Resolution::NotFound)
    }

    /// Whether `term` has been resolved (found or not) in this run.
    pub fn is_cached(&self, term: &str) -> bool {
        self.memo.read().contains_key(term)
    }

    /// Number of external calls issued so far.
    pub fn lookup_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of distinct terms resolved.
    pub fn len(&self) -> usize {
        self.memo.read().len()
    }

    /// Check if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.memo.read().is_empty()
    }

    /// Terms for which neither search produced tree numbers, sorted.
    pub fn unresolved(&self) -> Vec<String> {
        let mut terms: Vec<String> = self
            .memo
            .read()
            .iter()
            .filter(|(_, r)| matches!(r, Resolution::NotFound))
            .map(|(term, _)| term.clone())
            .collect();
        terms.sort_unstable();
        terms
    }
}

fn non_empty(raw: Option<String>) -> Option<TreeNumbers> {
    let codes = parse_tree_numbers(raw.as_deref()?);
    if codes.is_empty() {
        None
    } else {
        Some(codes.into())
    }
}

/// One row of the MeSH "Descriptor Tree with Headings" table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HierarchyRow {
    /// Tree number
    pub tree: String,
    /// Heading
    pub mesh: String,
}

/// Offline [`HierarchyLookup`] backed by the MeSH tree table.
///
/// Exact search compares heading strings byte for byte. Fallback search
/// compares [`normalize_term`] keys, so punctuation and case differences
/// still resolve.
#[derive(Debug, Default, Clone)]
pub struct TreeIndex {
    exact: HashMap<String, Vec<String>>,
    normalized: HashMap<String, Vec<String>>,
    headings: Vec<String>,
}

impl TreeIndex {
    /// Build the index from tree table rows.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = HierarchyRow>,
    {
        let mut index = Self::default();
        for row in rows {
            let tree = row.tree.trim();
            if tree.is_empty() || row.mesh.is_empty() {
                continue;
            }
            if !index.exact.contains_key(&row.mesh) {
                index.headings.push(row.mesh.clone());
            }
            let codes = index.exact.entry(row.mesh.clone()).or_default();
            if !codes.iter().any(|c| c == tree) {
                codes.push(tree.to_string());
            }

            let folded = index.normalized.entry(normalize_term(&row.mesh)).or_default();
            if !folded.iter().any(|c| c == tree) {
                folded.push(tree.to_string());
            }
        }
        index
    }

    /// Distinct headings in first-seen order.
    pub fn headings(&self) -> &[String] {
        &self.headings
    }

    /// Number of distinct headings.
    pub fn len(&self) -> usize {
        self.headings.len()
    }

    /// Check if the index holds no headings.
    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }
}

impl HierarchyLookup for TreeIndex {
    fn exact_search(&self, term: &str) -> Result<Option<String>> {
        Ok(self.exact.get(term).map(|codes| codes.join(",")))
    }

    fn fallback_search(&self, term: &str) -> Result<Option<String>> {
        let key = normalize_term(term);
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self.normalized.get(&key).map(|codes| codes.join(",")))
    }
}
