//! UMLS Metathesaurus concept records.
//!
//! One [`ThesaurusRecord`] per MRCONSO row: a term string from one source
//! vocabulary, tied to a Concept Unique Identifier (CUI). Several records
//! share a CUI across vocabularies, which is what lets a MeSH heading be
//! linked to its ICD-10-CM and NCI Thesaurus counterparts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::error::{MeshNormError, Result};

/// Column names of MRCONSO.RRF, in file order.
pub const RRF_COLUMNS: [&str; 18] = [
    "CUI", "LAT", "TS", "LUI", "STT", "SUI", "ISPREF", "AUI", "SAUI", "SCUI", "SDUI", "SAB", "TTY",
    "CODE", "STR", "SRL", "SUPPRESS", "CVF",
];

/// Language tag kept by default.
pub const ENGLISH: &str = "ENG";

/// Source vocabularies the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceVocab {
    /// Medical Subject Headings, the canonical heading source
    #[serde(rename = "MSH")]
    Msh,
    /// ICD-10 Clinical Modification
    #[serde(rename = "ICD10CM")]
    Icd10cm,
    /// NCI Thesaurus
    #[serde(rename = "NCI")]
    Nci,
}

impl SourceVocab {
    /// The SAB tag as written in MRCONSO.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceVocab::Msh => "MSH",
            SourceVocab::Icd10cm => "ICD10CM",
            SourceVocab::Nci => "NCI",
        }
    }
}

impl fmt::Display for SourceVocab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceVocab {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "MSH" => Ok(SourceVocab::Msh),
            "ICD10CM" => Ok(SourceVocab::Icd10cm),
            "NCI" => Ok(SourceVocab::Nci),
            other => Err(format!("unrecognized source vocabulary '{other}'")),
        }
    }
}

/// A single Metathesaurus term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThesaurusRecord {
    /// Concept Unique Identifier
    pub cui: String,
    /// Language tag (LAT)
    pub language: String,
    /// Term status (TS): `P` preferred, `S` non-preferred
    pub term_status: String,
    /// Lexical Unique Identifier (LUI)
    pub lui: String,
    /// String type (STT): `PF`, `VO`, `VC`, ...
    pub string_type: String,
    /// String Unique Identifier (SUI)
    pub sui: String,
    /// Atom-level preferred flag (ISPREF = `Y`)
    pub is_preferred: bool,
    /// Source vocabulary (SAB)
    pub source: SourceVocab,
    /// The term string (STR)
    pub term: String,
}

impl ThesaurusRecord {
    /// Preferred-name ordering: TS, LUI, STT, SUI ascending, then ISPREF
    /// with `Y` first.
    pub fn preference_cmp(&self, other: &Self) -> Ordering {
        self.term_status
            .cmp(&other.term_status)
            .then_with(|| self.lui.cmp(&other.lui))
            .then_with(|| self.string_type.cmp(&other.string_type))
            .then_with(|| self.sui.cmp(&other.sui))
            .then_with(|| other.is_preferred.cmp(&self.is_preferred))
    }
}

/// Positions of the columns a record is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    cui: usize,
    lat: usize,
    ts: usize,
    lui: usize,
    stt: usize,
    sui: usize,
    ispref: usize,
    sab: usize,
    term: usize,
}

impl ColumnIndex {
    /// Fixed positions of a headerless MRCONSO.RRF file.
    pub fn rrf() -> Self {
        Self {
            cui: 0,
            lat: 1,
            ts: 2,
            lui: 3,
            stt: 4,
            sui: 5,
            ispref: 6,
            sab: 11,
            term: 14,
        }
    }

    /// Locate every MRCONSO column in a header row.
    ///
    /// All eighteen columns must be present even though only nine are read,
    /// so a truncated export is caught before any processing starts.
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| MeshNormError::schema("thesaurus", name))
        };
        for name in RRF_COLUMNS {
            position(name)?;
        }
        Ok(Self {
            cui: position("CUI")?,
            lat: position("LAT")?,
            ts: position("TS")?,
            lui: position("LUI")?,
            stt: position("STT")?,
            sui: position("SUI")?,
            ispref: position("ISPREF")?,
            sab: position("SAB")?,
            term: position("STR")?,
        })
    }

    fn max(&self) -> usize {
        [
            self.cui, self.lat, self.ts, self.lui, self.stt, self.sui, self.ispref, self.sab,
            self.term,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Which rows survive loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Accepted LAT values
    pub languages: Vec<String>,
    /// Accepted SAB values
    pub sources: Vec<SourceVocab>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            languages: vec![ENGLISH.to_string()],
            sources: vec![SourceVocab::Msh, SourceVocab::Icd10cm, SourceVocab::Nci],
        }
    }
}

impl RecordFilter {
    /// Turn a raw row into a record.
    ///
    /// Returns `Ok(None)` for rows outside the filter (other languages or
    /// vocabularies) and an [`MeshNormError::InvalidRecord`] for rows that
    /// are too short or lack a CUI or term.
    pub fn parse(
        &self,
        columns: &ColumnIndex,
        row: &StringRecord,
        line: u64,
    ) -> Result<Option<ThesaurusRecord>> {
        if row.len() <= columns.max() {
            return Err(MeshNormError::InvalidRecord {
                line,
                reason: format!("expected at least {} fields, found {}", columns.max() + 1, row.len()),
            });
        }
        let field = |i: usize| row.get(i).unwrap_or("").trim();

        let language = field(columns.lat);
        if !self.languages.iter().any(|l| l == language) {
            return Ok(None);
        }
        let source = match field(columns.sab).parse::<SourceVocab>() {
            Ok(source) if self.sources.contains(&source) => source,
            _ => return Ok(None),
        };

        let cui = field(columns.cui);
        if cui.is_empty() {
            return Err(MeshNormError::InvalidRecord {
                line,
                reason: "empty CUI".to_string(),
            });
        }
        // STR is not trimmed: whitespace is part of the term string
        let term = row.get(columns.term).unwrap_or("");
        if term.is_empty() {
            return Err(MeshNormError::InvalidRecord {
                line,
                reason: format!("empty STR for {cui}"),
            });
        }

        Ok(Some(ThesaurusRecord {
            cui: cui.to_string(),
            language: language.to_string(),
            term_status: field(columns.ts).to_string(),
            lui: field(columns.lui).to_string(),
            string_type: field(columns.stt).to_string(),
            sui: field(columns.sui).to_string(),
            is_preferred: field(columns.ispref) == "Y",
            source,
            term: term.to_string(),
        }))
    }
}
