//! Lock-free Vocabulary Store using ArcSwap.
//!
//! Holds the lookup tables the annotator reads for every heading:
//!
//! - MeSH term → CUI (from the concept table build)
//! - CUI → standard name (the curated controlled vocabulary)
//! - concept equivalence rows (for curation reports)
//!
//! Reads happen for every heading of every publication and may come from
//! several workers at once; writes only happen when curators reload the
//! vocabulary between batches. Readers always see one consistent snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use serde::Deserialize;

use crate::builder::{EquivalenceRow, TermConceptRow};

/// One row of the controlled vocabulary table.
///
/// Rows without a CUI are valid in the source sheet but can never be
/// reached from a heading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VocabularyRow {
    #[serde(rename = "UMLS_CUI")]
    pub cui: Option<String>,
    pub standard_name: String,
}

/// Immutable state of the store.
///
/// Updates build a new snapshot and atomically swap the pointer.
#[derive(Debug, Default, Clone)]
pub struct VocabularySnapshot {
    term_to_cui: HashMap<String, String>,
    standard_names: HashMap<String, String>,
    equivalences: Arc<Vec<EquivalenceRow>>,
    /// Monotonic version counter
    version: u64,
}

impl VocabularySnapshot {
    /// CUI for a MeSH term.
    #[inline]
    pub fn cui_for(&self, term: &str) -> Option<&str> {
        self.term_to_cui.get(term).map(String::as_str)
    }

    /// Standard name for a CUI.
    #[inline]
    pub fn standard_name(&self, cui: &str) -> Option<&str> {
        self.standard_names
            .get(cui)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Concept equivalence rows, in table order.
    pub fn equivalences(&self) -> &[EquivalenceRow] {
        &self.equivalences
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of mapped MeSH terms.
    pub fn term_count(&self) -> usize {
        self.term_to_cui.len()
    }

    /// Number of CUIs listed in the vocabulary.
    pub fn vocabulary_len(&self) -> usize {
        self.standard_names.len()
    }
}

fn term_map(rows: Vec<TermConceptRow>) -> HashMap<String, String> {
    // Later rows win when a term carries several CUIs
    rows.into_iter().map(|r| (r.term, r.cui)).collect()
}

fn vocabulary_map(rows: Vec<VocabularyRow>) -> HashMap<String, String> {
    rows.into_iter()
        .filter_map(|r| {
            let cui = r.cui?.trim().to_string();
            (!cui.is_empty()).then_some((cui, r.standard_name))
        })
        .collect()
}

/// Lock-free Vocabulary Store.
///
/// # Thread Safety
///
/// - Reads: lock-free (atomic load)
/// - Writes: copy-on-write, atomic swap
///
/// # Memory Model
///
/// A [`snapshot`](Self::snapshot) keeps its version alive while held, so a
/// publication is resolved against one vocabulary even if a reload lands
/// halfway through.
pub struct VocabularyStore {
    inner: ArcSwap<VocabularySnapshot>,
}

impl VocabularyStore {
    /// Create a store from loaded tables.
    pub fn from_tables(
        term_concepts: Vec<TermConceptRow>,
        vocabulary: Vec<VocabularyRow>,
        equivalences: Vec<EquivalenceRow>,
    ) -> Self {
        Self {
            inner: ArcSwap::from_pointee(VocabularySnapshot {
                term_to_cui: term_map(term_concepts),
                standard_names: vocabulary_map(vocabulary),
                equivalences: Arc::new(equivalences),
                version: 1,
            }),
        }
    }

    /// Get the current store version.
    #[inline]
    pub fn version(&self) -> u64 {
        self.inner.load().version
    }

    /// Get a snapshot guard for extended read operations.
    #[inline]
    pub fn snapshot(&self) -> Guard<Arc<VocabularySnapshot>> {
        self.inner.load()
    }

    /// Replace the controlled vocabulary, keeping the concept tables.
    ///
    /// Used when curators add standard names for previously unmapped CUIs
    /// and the batch is re-run. Returns the new version.
    pub fn replace_vocabulary(&self, vocabulary: Vec<VocabularyRow>) -> u64 {
        let mut next = (*self.inner.load_full()).clone();
        next.standard_names = vocabulary_map(vocabulary);
        next.version += 1;
        let version = next.version;
        self.inner.store(Arc::new(next));
        version
    }
}
