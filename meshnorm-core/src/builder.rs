//! Concept Table Builder.
//!
//! Runs offline over the filtered Metathesaurus and the MeSH tree table and
//! produces the two lookup tables the annotator depends on:
//!
//! - **term → CUI**: every canonical-source (MeSH) term with its concept
//! - **concept equivalence**: for each heading's concept, the preferred name
//!   and every alternate-source synonym ranked by edit distance to it
//!
//! ```text
//! heading ──► MSH records with STR == heading ──► candidate CUIs
//!                                                     │
//!           ┌─────────────────────────────────────────┤
//!           ▼                                         ▼
//!   preferred name (TS, LUI, STT, SUI, ISPREF↓)   ICD10CM / NCI terms
//!           │                                         │
//!           └──────────► levenshtein ◄────────────────┘
//!                            │
//!                            ▼
//!                  equivalence rows (score ↑)
//! ```
//!
//! Missing and ambiguous headings never stop the build; they are collected
//! on the [`BuildReport`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use xxhash_rust::xxh64::Xxh64;

use crate::config::BuildConfig;
use crate::nlp::levenshtein_distance;
use crate::thesaurus::{SourceVocab, ThesaurusRecord};

/// Headings between progress log lines.
const PROGRESS_EVERY: usize = 500;

/// One row of the term → CUI table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermConceptRow {
    #[serde(rename = "CUI")]
    pub cui: String,
    #[serde(rename = "STR")]
    pub term: String,
}

/// One row of the concept equivalence table.
///
/// A heading without any concept is written with an empty CUI, empty
/// preferred name and no source or score, carrying the heading as `term`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivalenceRow {
    #[serde(rename = "CUI")]
    pub cui: Option<String>,
    pub pref_name: String,
    pub ont_source: Option<SourceVocab>,
    pub term: String,
    pub edit_score: Option<usize>,
    pub mesh: String,
}

/// An alternate-source term for a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Synonym {
    pub term: String,
    pub source: SourceVocab,
    /// Edit distance to the preferred name
    pub score: usize,
}

/// Preferred name and ranked synonyms for one CUI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptEquivalenceEntry {
    pub cui: String,
    /// Empty when no record carries the CUI
    pub pref_name: String,
    /// Ascending by score; ties keep source then file order
    pub synonyms: Vec<Synonym>,
}

/// A heading whose MeSH string maps to several concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousHeading {
    pub heading: String,
    pub cuis: Vec<String>,
}

/// Diagnostics gathered during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Distinct headings processed
    pub headings: usize,
    /// Distinct concepts emitted
    pub concepts: usize,
    /// Headings with no canonical-source concept
    pub missing: Vec<String>,
    /// Headings with more than one concept (all were processed)
    pub ambiguous: Vec<AmbiguousHeading>,
    /// Thesaurus rows rejected while loading
    pub rejected_records: usize,
}

/// XxHash64 over the serialized rows of both output tables.
///
/// Two builds from unchanged input produce the same fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TableFingerprint(pub u64);

impl fmt::Display for TableFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Output of [`ConceptTableBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConceptTables {
    /// Term → CUI rows, deduplicated, first-seen order
    pub term_concepts: Vec<TermConceptRow>,
    /// Equivalence rows, deduplicated, heading order
    pub equivalences: Vec<EquivalenceRow>,
    /// Grouped view of the equivalence rows, keyed by CUI
    pub entries: BTreeMap<String, ConceptEquivalenceEntry>,
    pub report: BuildReport,
}

impl ConceptTables {
    /// Fingerprint of the persisted rows.
    pub fn fingerprint(&self) -> TableFingerprint {
        let mut hasher = Xxh64::new(0);
        for row in &self.term_concepts {
            hash_fields(&mut hasher, &[&row.cui, &row.term]);
        }
        hasher.update(b"\x1d");
        for row in &self.equivalences {
            let score = row.edit_score.map(|s| s.to_string()).unwrap_or_default();
            hash_fields(
                &mut hasher,
                &[
                    row.cui.as_deref().unwrap_or(""),
                    &row.pref_name,
                    row.ont_source.map(|s| s.as_str()).unwrap_or(""),
                    &row.term,
                    &score,
                    &row.mesh,
                ],
            );
        }
        TableFingerprint(hasher.digest())
    }
}

fn hash_fields(hasher: &mut Xxh64, fields: &[&str]) {
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.update(b"\x1e");
}

/// Builds concept tables from a loaded thesaurus.
///
/// # Usage
/// ```
/// use meshnorm_core::builder::ConceptTableBuilder;
/// use meshnorm_core::config::BuildConfig;
///
/// let config = BuildConfig::default();
/// let builder = ConceptTableBuilder::new(&config, &[]);
/// let tables = builder.build(&["Neoplasms".to_string()]);
/// assert_eq!(tables.report.missing, vec!["Neoplasms".to_string()]);
/// ```
pub struct ConceptTableBuilder<'a> {
    config: &'a BuildConfig,
    records: &'a [ThesaurusRecord],
    /// CUI → record indices, file order
    by_cui: HashMap<&'a str, Vec<usize>>,
    /// Canonical-source term → distinct CUIs, file order
    canonical_terms: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> ConceptTableBuilder<'a> {
    /// Index the thesaurus for heading lookups.
    pub fn new(config: &'a BuildConfig, records: &'a [ThesaurusRecord]) -> Self {
        let mut by_cui: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut canonical_terms: HashMap<&str, Vec<&str>> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            by_cui.entry(record.cui.as_str()).or_default().push(i);
            if record.source == config.canonical_source {
                let cuis = canonical_terms.entry(record.term.as_str()).or_default();
                if !cuis.contains(&record.cui.as_str()) {
                    cuis.push(record.cui.as_str());
                }
            }
        }

        Self {
            config,
            records,
            by_cui,
            canonical_terms,
        }
    }

    /// Build both tables for the given canonical headings.
    ///
    /// Repeated headings are processed once.
    #[instrument(skip_all, fields(headings = headings.len(), records = self.records.len()))]
    pub fn build(&self, headings: &[String]) -> ConceptTables {
        let mut tables = ConceptTables {
            term_concepts: self.term_concepts(),
            ..Default::default()
        };
        let mut rows = Vec::new();
        let mut seen_headings = HashSet::new();

        for heading in headings {
            if !seen_headings.insert(heading.as_str()) {
                continue;
            }
            let processed = seen_headings.len();
            if processed % PROGRESS_EVERY == 0 {
                info!(processed, total = headings.len(), "Building concept table");
            }

            let cuis = self
                .canonical_terms
                .get(heading.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();

            match cuis.len() {
                0 => {
                    warn!(heading = %heading, "Heading has no associated concepts");
                    tables.report.missing.push(heading.clone());
                    rows.push(EquivalenceRow {
                        cui: None,
                        pref_name: String::new(),
                        ont_source: None,
                        term: heading.clone(),
                        edit_score: None,
                        mesh: heading.clone(),
                    });
                    continue;
                }
                1 => {}
                n => {
                    warn!(heading = %heading, concepts = n, "Heading has multiple associated concepts");
                    tables.report.ambiguous.push(AmbiguousHeading {
                        heading: heading.clone(),
                        cuis: cuis.iter().map(|c| c.to_string()).collect(),
                    });
                }
            }

            for &cui in cuis {
                let entry = tables
                    .entries
                    .entry(cui.to_string())
                    .or_insert_with(|| self.equivalence_entry(cui));

                rows.extend(entry.synonyms.iter().map(|synonym| EquivalenceRow {
                    cui: Some(cui.to_string()),
                    pref_name: entry.pref_name.clone(),
                    ont_source: Some(synonym.source),
                    term: synonym.term.clone(),
                    edit_score: Some(synonym.score),
                    mesh: heading.clone(),
                }));
            }
        }

        tables.equivalences = dedup_rows(rows);
        tables.report.headings = seen_headings.len();
        tables.report.concepts = tables.entries.len();

        info!(
            headings = tables.report.headings,
            concepts = tables.report.concepts,
            rows = tables.equivalences.len(),
            missing = tables.report.missing.len(),
            ambiguous = tables.report.ambiguous.len(),
            fingerprint = %tables.fingerprint(),
            "Concept tables built"
        );
        tables
    }

    /// Canonical-source (CUI, STR) pairs.
    fn term_concepts(&self) -> Vec<TermConceptRow> {
        dedup_rows(
            self.records
                .iter()
                .filter(|r| r.source == self.config.canonical_source)
                .map(|r| TermConceptRow {
                    cui: r.cui.clone(),
                    term: r.term.clone(),
                })
                .collect(),
        )
    }

    fn equivalence_entry(&self, cui: &str) -> ConceptEquivalenceEntry {
        let pref_name = self.preferred_name(cui).unwrap_or_default();
        let members = self.members(cui);

        let mut synonyms = Vec::new();
        for &source in &self.config.alternate_sources {
            for record in members.iter().filter(|r| r.source == source) {
                let synonym = Synonym {
                    term: record.term.clone(),
                    source,
                    score: levenshtein_distance(&record.term, &pref_name),
                };
                if !synonyms.contains(&synonym) {
                    synonyms.push(synonym);
                }
            }
        }
        // Stable: equal scores keep source order, then file order
        synonyms.sort_by_key(|s| s.score);

        ConceptEquivalenceEntry {
            cui: cui.to_string(),
            pref_name,
            synonyms,
        }
    }

    /// Pick the preferred name for a concept.
    ///
    /// Records are first reduced to one per distinct term (the first one in
    /// file order), then ranked by [`ThesaurusRecord::preference_cmp`].
    /// Returns `None` when no record carries the CUI.
    pub fn preferred_name(&self, cui: &str) -> Option<String> {
        let mut seen = HashSet::new();
        self.members(cui)
            .into_iter()
            .filter(|r| seen.insert(r.term.as_str()))
            .min_by(|a, b| a.preference_cmp(b))
            .map(|r| r.term.clone())
    }

    fn members(&self, cui: &str) -> Vec<&'a ThesaurusRecord> {
        self.by_cui
            .get(cui)
            .map(|ids| ids.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }
}

/// Drop repeated rows, keeping the first occurrence.
fn dedup_rows<T: Clone + Eq + Hash>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thesaurus::fixtures::record;
    use SourceVocab::{Icd10cm, Msh, Nci};

    fn thesaurus() -> Vec<ThesaurusRecord> {
        vec![
            // Leukemia: single concept, variant spellings
            record("C0023418", Msh, "Leukemia", "P", "L0023418", "PF", "S0059717", true),
            record("C0023418", Msh, "Leukemias", "S", "L0023418", "VO", "S0059718", true),
            record("C0023418", Nci, "Leukemia", "P", "L0023418", "PF", "S0059717", false),
            record("C0023418", Nci, "Leukaemia", "S", "L0023418", "VO", "S0361320", false),
            record("C0023418", Icd10cm, "Leukemia, unspecified", "P", "L1", "PF", "S2", false),
            // Cold: ambiguous MeSH string
            record("C0009443", Msh, "Cold", "P", "L0009443", "PF", "S0023466", true),
            record("C0009443", Nci, "Common Cold", "P", "L0009443", "PF", "S0023400", false),
            record("C0009264", Msh, "Cold", "S", "L0009264", "PF", "S0023467", true),
            record("C0009264", Msh, "Cold Temperature", "P", "L0009263", "PF", "S0023470", true),
            record("C0009264", Icd10cm, "Exposure to cold", "P", "L5", "PF", "S5", false),
        ]
    }

    fn build(headings: &[&str]) -> ConceptTables {
        let config = BuildConfig::default();
        let records = thesaurus();
        let builder = ConceptTableBuilder::new(&config, &records);
        let headings: Vec<String> = headings.iter().map(|h| h.to_string()).collect();
        builder.build(&headings)
    }

    #[test]
    fn test_preferred_name_ordering() {
        let config = BuildConfig::default();
        let records = thesaurus();
        let builder = ConceptTableBuilder::new(&config, &records);

        assert_eq!(builder.preferred_name("C0023418").as_deref(), Some("Leukemia"));
        // TS "P" beats "S" even though the SUI is larger
        assert_eq!(builder.preferred_name("C0009264").as_deref(), Some("Cold Temperature"));
        assert_eq!(builder.preferred_name("C9999999"), None);
    }

    #[test]
    fn test_ispref_breaks_final_tie() {
        let config = BuildConfig::default();
        let records = vec![
            record("C1", Nci, "Tumour", "P", "L1", "PF", "S1", false),
            record("C1", Msh, "Tumor", "P", "L1", "PF", "S1", true),
        ];
        let builder = ConceptTableBuilder::new(&config, &records);
        assert_eq!(builder.preferred_name("C1").as_deref(), Some("Tumor"));
    }

    #[test]
    fn test_single_concept_synonyms_ranked() {
        let tables = build(&["Leukemia"]);

        let entry = &tables.entries["C0023418"];
        assert_eq!(entry.pref_name, "Leukemia");
        let ranked: Vec<(&str, usize)> =
            entry.synonyms.iter().map(|s| (s.term.as_str(), s.score)).collect();
        assert_eq!(
            ranked,
            vec![("Leukemia", 0), ("Leukaemia", 1), ("Leukemia, unspecified", 13)]
        );

        assert_eq!(tables.equivalences.len(), 3);
        assert!(tables.equivalences.iter().all(|r| r.mesh == "Leukemia"));
        assert!(tables
            .equivalences
            .windows(2)
            .all(|w| w[0].edit_score <= w[1].edit_score));
        assert!(tables.report.missing.is_empty());
        assert!(tables.report.ambiguous.is_empty());
    }

    #[test]
    fn test_ambiguous_heading_keeps_all_concepts() {
        let tables = build(&["Cold"]);

        assert_eq!(tables.report.ambiguous.len(), 1);
        assert_eq!(tables.report.ambiguous[0].cuis, vec!["C0009443", "C0009264"]);

        let cuis: HashSet<_> = tables
            .equivalences
            .iter()
            .filter_map(|r| r.cui.as_deref())
            .collect();
        assert!(cuis.contains("C0009443"));
        assert!(cuis.contains("C0009264"));
        assert_eq!(tables.entries.len(), 2);
    }

    #[test]
    fn test_missing_heading_reported() {
        let tables = build(&["Leukemia", "Chimera Syndrome"]);

        assert_eq!(tables.report.missing, vec!["Chimera Syndrome".to_string()]);
        let row = tables
            .equivalences
            .iter()
            .find(|r| r.mesh == "Chimera Syndrome")
            .expect("missing heading still gets a row");
        assert_eq!(row.cui, None);
        assert_eq!(row.pref_name, "");
        assert_eq!(row.term, "Chimera Syndrome");
        assert_eq!(row.edit_score, None);
    }

    #[test]
    fn test_concept_without_alternates_has_entry_but_no_rows() {
        let config = BuildConfig::default();
        let records = vec![record("C7", Msh, "Humans", "P", "L7", "PF", "S7", true)];
        let builder = ConceptTableBuilder::new(&config, &records);
        let tables = builder.build(&["Humans".to_string()]);

        assert!(tables.equivalences.is_empty());
        assert_eq!(tables.entries["C7"].pref_name, "Humans");
        assert!(tables.entries["C7"].synonyms.is_empty());
    }

    #[test]
    fn test_term_concept_table_canonical_only() {
        let tables = build(&[]);
        let terms: Vec<&str> = tables.term_concepts.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec!["Leukemia", "Leukemias", "Cold", "Cold", "Cold Temperature"]);
        assert!(!terms.contains(&"Leukaemia"));
    }

    #[test]
    fn test_duplicate_rows_removed() {
        let config = BuildConfig::default();
        let mut records = thesaurus();
        // Same NCI atom twice (different AUIs upstream)
        records.push(record("C0023418", Nci, "Leukaemia", "S", "L0023418", "VO", "S0361320", false));
        records.push(record("C0023418", Msh, "Leukemia", "P", "L0023418", "PF", "S0059717", true));
        let builder = ConceptTableBuilder::new(&config, &records);
        let tables = builder.build(&["Leukemia".to_string(), "Leukemia".to_string()]);

        assert_eq!(tables.equivalences.len(), 3);
        assert_eq!(
            tables.term_concepts.iter().filter(|r| r.term == "Leukemia").count(),
            1
        );
        assert_eq!(tables.report.headings, 1);
    }

    #[test]
    fn test_build_is_idempotent() {
        let first = build(&["Leukemia", "Cold", "Chimera Syndrome"]);
        let second = build(&["Leukemia", "Cold", "Chimera Syndrome"]);

        assert_eq!(first.term_concepts, second.term_concepts);
        assert_eq!(first.equivalences, second.equivalences);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = build(&["Leukemia"]);
        let b = build(&["Leukemia", "Cold"]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
