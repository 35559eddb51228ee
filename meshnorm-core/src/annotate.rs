//! Annotation Resolver.
//!
//! Turns a publication's raw MeSH heading list into standard names from the
//! controlled vocabulary:
//!
//! ```text
//! headings ──► RedundancyFilter ──► term → CUI ──► CUI → standard name
//!                                                   │            │
//!                                                   │ missing    ▼ found
//!                                                   ▼         standard_names
//!                                               unmapped
//! ```
//!
//! Unmapped CUIs are pooled across a batch and cross-referenced against the
//! concept equivalence table so curators can pick standard names for them.

use std::collections::{BTreeSet, HashSet};

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::builder::EquivalenceRow;
use crate::error::Result;
use crate::hierarchy::HierarchyLookup;
use crate::redundancy::RedundancyFilter;
use crate::store::VocabularyStore;

/// Placeholder standard name for "no specific disease".
pub const NOT_SPECIFIED: &str = "Not Specified";

/// Annotation of a single publication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationResult {
    /// Headings that survived the redundancy filter, input order
    pub headings: Vec<String>,
    /// Distinct standard names, sorted
    pub standard_names: BTreeSet<String>,
    /// CUIs reached from a heading but absent from the vocabulary
    pub unmapped: BTreeSet<String>,
    /// CUIs of the surviving headings, heading order
    pub concepts: Vec<String>,
}

impl AnnotationResult {
    /// Standard names joined for the output column.
    pub fn names_column(&self) -> String {
        join(self.standard_names.iter())
    }

    /// CUIs joined for the optional CUI column.
    pub fn concepts_column(&self) -> String {
        join(self.concepts.iter())
    }
}

fn join<'a>(items: impl Iterator<Item = &'a String>) -> String {
    items.map(String::as_str).collect::<Vec<_>>().join(";")
}

/// A publication whose headings could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPublication {
    /// Position in the batch
    pub index: usize,
    pub reason: String,
}

/// Batch-wide diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub publications: usize,
    /// Union of every publication's unmapped CUIs
    pub unmapped: BTreeSet<String>,
    /// Publications left unannotated because a lookup failed
    pub failed: Vec<FailedPublication>,
}

/// Results of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<AnnotationResult>,
    pub report: BatchReport,
}

/// Resolves heading lists against a [`VocabularyStore`].
pub struct AnnotationResolver<'a, L> {
    filter: RedundancyFilter<'a, L>,
    store: &'a VocabularyStore,
    not_specified: String,
}

impl<'a, L: HierarchyLookup> AnnotationResolver<'a, L> {
    pub fn new(filter: RedundancyFilter<'a, L>, store: &'a VocabularyStore) -> Self {
        Self {
            filter,
            store,
            not_specified: NOT_SPECIFIED.to_string(),
        }
    }

    /// Use a different placeholder name.
    pub fn with_not_specified(mut self, sentinel: impl Into<String>) -> Self {
        self.not_specified = sentinel.into();
        self
    }

    /// Annotate one publication.
    ///
    /// Surviving headings without a CUI are skipped. When the placeholder
    /// name appears next to any other standard name it is dropped; on its
    /// own it is kept.
    pub fn resolve(&self, headings: Option<&[String]>) -> Result<AnnotationResult> {
        let headings = self.filter.filter(headings)?;
        let snapshot = self.store.snapshot();

        let mut result = AnnotationResult::default();
        for heading in &headings {
            let Some(cui) = snapshot.cui_for(heading) else {
                continue;
            };
            result.concepts.push(cui.to_string());
            match snapshot.standard_name(cui) {
                Some(name) => {
                    result.standard_names.insert(name.to_string());
                }
                None => {
                    result.unmapped.insert(cui.to_string());
                }
            }
        }

        if result.standard_names.len() > 1 {
            result.standard_names.remove(&self.not_specified);
        }
        result.headings = headings;
        Ok(result)
    }

    /// Annotate publications one after another.
    ///
    /// A lookup failure leaves that publication empty and is recorded on
    /// the report; the rest of the batch continues.
    #[instrument(skip_all, fields(publications = publications.len()))]
    pub fn resolve_batch(&self, publications: &[Option<Vec<String>>]) -> BatchOutcome {
        let resolved = publications
            .iter()
            .map(|headings| self.resolve(headings.as_deref()))
            .collect();
        self.collect(resolved)
    }

    /// Annotate publications on a worker pool.
    ///
    /// Produces the same outcome as [`resolve_batch`](Self::resolve_batch);
    /// the hierarchy cache is shared by all workers.
    #[instrument(skip_all, fields(publications = publications.len(), workers = pool.current_num_threads()))]
    pub fn resolve_batch_parallel(
        &self,
        pool: &ThreadPool,
        publications: &[Option<Vec<String>>],
    ) -> BatchOutcome {
        let resolved = pool.install(|| {
            publications
                .par_iter()
                .map(|headings| self.resolve(headings.as_deref()))
                .collect()
        });
        self.collect(resolved)
    }

    fn collect(&self, resolved: Vec<Result<AnnotationResult>>) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(resolved.len()),
            report: BatchReport {
                publications: resolved.len(),
                ..Default::default()
            },
        };

        for (index, result) in resolved.into_iter().enumerate() {
            match result {
                Ok(annotation) => {
                    outcome.report.unmapped.extend(annotation.unmapped.iter().cloned());
                    outcome.results.push(annotation);
                }
                Err(e) => {
                    warn!(index, error = %e, "Publication left unannotated");
                    outcome.report.failed.push(FailedPublication {
                        index,
                        reason: e.to_string(),
                    });
                    outcome.results.push(AnnotationResult::default());
                }
            }
        }

        let resolver = self.filter.resolver();
        info!(
            publications = outcome.report.publications,
            unmapped = outcome.report.unmapped.len(),
            failed = outcome.report.failed.len(),
            distinct_terms = resolver.len(),
            lookup_calls = resolver.lookup_calls(),
            "Batch annotated"
        );
        outcome
    }
}

/// Candidate names for CUIs missing from the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurationReport {
    /// Every equivalence row whose CUI is unmapped, table order
    pub rows: Vec<EquivalenceRow>,
    /// First candidate term per unmapped CUI
    pub candidates: Vec<(String, String)>,
}

impl CurationReport {
    /// Filter the equivalence table down to the unmapped CUIs.
    pub fn build(unmapped: &BTreeSet<String>, equivalences: &[EquivalenceRow]) -> Self {
        let mut report = Self::default();
        let mut seen = HashSet::new();

        for row in equivalences {
            let Some(cui) = row.cui.as_deref() else {
                continue;
            };
            if !unmapped.contains(cui) {
                continue;
            }
            if seen.insert(cui) {
                report.candidates.push((cui.to_string(), row.term.clone()));
            }
            report.rows.push(row.clone());
        }
        report
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
