//! CSV input and output for every table the pipeline touches.
//!
//! | Table | Direction | Required columns |
//! |-------|-----------|------------------|
//! | thesaurus (MRCONSO) | in | 18 RRF columns (header CSV) or fixed positions (`.RRF`) |
//! | hierarchy | in | `tree`, `mesh` |
//! | term → CUI | in/out | `CUI`, `STR` |
//! | concept equivalence | in/out | `CUI`, `pref_name`, `ont_source`, `term`, `edit_score`, `mesh` |
//! | vocabulary | in | `UMLS_CUI`, `standard_name` |
//! | manifest | in/out | the heading column |
//!
//! Headers are checked before any row is read, so a wrong file fails with
//! [`MeshNormError::Schema`] instead of a pile of per-row errors. Outputs
//! go to a temporary file next to the target and are renamed into place
//! once complete.

use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::annotate::{AnnotationResult, CurationReport};
use crate::builder::{EquivalenceRow, TermConceptRow};
use crate::error::{MeshNormError, Result};
use crate::hierarchy::HierarchyRow;
use crate::store::VocabularyRow;
use crate::thesaurus::{ColumnIndex, RecordFilter, ThesaurusRecord};

pub const TERM_CONCEPT_COLUMNS: [&str; 2] = ["CUI", "STR"];

pub const EQUIVALENCE_COLUMNS: [&str; 6] =
    ["CUI", "pref_name", "ont_source", "term", "edit_score", "mesh"];

pub const CURATION_COLUMNS: [&str; 2] = ["CUI", "term"];

pub const HIERARCHY_COLUMNS: [&str; 2] = ["tree", "mesh"];

pub const VOCABULARY_COLUMNS: [&str; 2] = ["UMLS_CUI", "standard_name"];

/// On-disk layout of the thesaurus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThesaurusFormat {
    /// Pipe-delimited, headerless MRCONSO.RRF
    Rrf,
    /// Comma-delimited with a header row
    Csv,
}

impl ThesaurusFormat {
    /// Guess from the file extension; anything but `.rrf` is CSV.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("rrf") => Self::Rrf,
            _ => Self::Csv,
        }
    }
}

impl FromStr for ThesaurusFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rrf" => Ok(Self::Rrf),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown thesaurus format: {other}")),
        }
    }
}

/// Records kept from a thesaurus file.
#[derive(Debug, Default)]
pub struct ThesaurusLoad {
    pub records: Vec<ThesaurusRecord>,
    /// Rows rejected as malformed
    pub rejected: usize,
}

/// Read and filter a thesaurus file.
///
/// Malformed rows are skipped and counted; rows outside the filter are
/// dropped silently.
pub fn read_thesaurus(path: &Path, format: ThesaurusFormat, filter: &RecordFilter) -> Result<ThesaurusLoad> {
    let file = File::open(path)?;
    let mut builder = ReaderBuilder::new();
    builder.flexible(true);
    if format == ThesaurusFormat::Rrf {
        builder.delimiter(b'|').has_headers(false).quoting(false);
    }
    let mut reader = builder.from_reader(file);

    let columns = match format {
        ThesaurusFormat::Rrf => ColumnIndex::rrf(),
        ThesaurusFormat::Csv => ColumnIndex::from_headers(reader.headers()?)?,
    };

    let mut load = ThesaurusLoad::default();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        match filter.parse(&columns, &row, line) {
            Ok(Some(record)) => load.records.push(record),
            Ok(None) => {}
            Err(e) if !e.is_fatal() => {
                debug!(error = %e, "Rejected thesaurus row");
                load.rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if load.rejected > 0 {
        warn!(path = %path.display(), rejected = load.rejected, "Thesaurus rows rejected");
    }
    info!(path = %path.display(), records = load.records.len(), "Thesaurus loaded");
    Ok(load)
}

/// Open a header CSV and check it carries `required`.
fn open_table(path: &Path, table: &str, required: &[&str]) -> Result<csv::Reader<File>> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let headers = reader.headers()?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(MeshNormError::schema(table, column));
        }
    }
    Ok(reader)
}

fn read_rows<T: DeserializeOwned>(path: &Path, table: &str, required: &[&str]) -> Result<Vec<T>> {
    let mut reader = open_table(path, table, required)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    debug!(table, path = %path.display(), rows = rows.len(), "Table loaded");
    Ok(rows)
}

pub fn read_hierarchy(path: &Path) -> Result<Vec<HierarchyRow>> {
    read_rows(path, "hierarchy", &HIERARCHY_COLUMNS)
}

pub fn read_term_concepts(path: &Path) -> Result<Vec<TermConceptRow>> {
    read_rows(path, "term_concepts", &TERM_CONCEPT_COLUMNS)
}

pub fn read_equivalences(path: &Path) -> Result<Vec<EquivalenceRow>> {
    read_rows(path, "equivalences", &EQUIVALENCE_COLUMNS)
}

/// Read the controlled vocabulary. Extra columns are ignored.
pub fn read_vocabulary(path: &Path) -> Result<Vec<VocabularyRow>> {
    read_rows(path, "vocabulary", &VOCABULARY_COLUMNS)
}

/// Write `rows` under `headers`, replacing `path` only once the write
/// has completed.
fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(tmp.as_file_mut());
        writer.write_record(headers)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), rows = rows.len(), "Table written");
    Ok(())
}

pub fn write_term_concepts(path: &Path, rows: &[TermConceptRow]) -> Result<()> {
    write_rows(path, &TERM_CONCEPT_COLUMNS, rows)
}

pub fn write_equivalences(path: &Path, rows: &[EquivalenceRow]) -> Result<()> {
    write_rows(path, &EQUIVALENCE_COLUMNS, rows)
}

/// Write one candidate term per unmapped CUI.
pub fn write_curation_report(path: &Path, report: &CurationReport) -> Result<()> {
    write_rows(path, &CURATION_COLUMNS, &report.candidates)
}

/// Write every equivalence row of the unmapped CUIs.
pub fn write_curation_rows(path: &Path, report: &CurationReport) -> Result<()> {
    write_rows(path, &EQUIVALENCE_COLUMNS, &report.rows)
}

/// Decode a manifest heading cell.
///
/// Cells hold a bracketed list literal such as `['Neoplasms', 'Humans']`.
/// An empty cell means no headings were recorded; `[]` means an empty list.
/// Commas inside a quoted item belong to the heading, and the quotes are
/// stripped. Cells without any quotes are split on `", "`.
///
/// ```
/// use meshnorm_core::tables::parse_heading_list;
///
/// assert_eq!(
///     parse_heading_list("['Neoplasms', \"Alzheimer's Disease\"]"),
///     Some(vec!["Neoplasms".to_string(), "Alzheimer's Disease".to_string()])
/// );
/// assert_eq!(parse_heading_list("[]"), Some(vec![]));
/// assert_eq!(parse_heading_list(""), None);
/// ```
pub fn parse_heading_list(cell: &str) -> Option<Vec<String>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    let inner = cell
        .strip_prefix('[')
        .and_then(|c| c.strip_suffix(']'))
        .unwrap_or(cell)
        .trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    // Unquoted cells have no way to protect a comma inside a heading
    if !inner.contains(['\'', '"']) {
        return Some(
            inner
                .split(", ")
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }
    Some(split_quoted(inner))
}

/// Split on commas outside `'…'` or `"…"`, stripping the quotes.
///
/// Only the quote that opened an item closes it, so `"Alzheimer's Disease"`
/// keeps its apostrophe.
fn split_quoted(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut item = String::new();
    let mut open: Option<char> = None;

    for c in inner.chars() {
        match open {
            Some(quote) if c == quote => open = None,
            Some(_) => item.push(c),
            None => match c {
                '\'' | '"' => open = Some(c),
                ',' => push_item(&mut items, &mut item),
                _ => item.push(c),
            },
        }
    }
    push_item(&mut items, &mut item);
    items
}

fn push_item(items: &mut Vec<String>, item: &mut String) {
    let trimmed = item.trim();
    if !trimmed.is_empty() {
        items.push(trimmed.to_string());
    }
    item.clear();
}

/// A publication manifest held in memory.
#[derive(Debug, Clone)]
pub struct Manifest {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    heading_index: usize,
}

impl Manifest {
    /// Read a manifest whose heading lists sit in `heading_column`.
    pub fn read(path: &Path, heading_column: &str) -> Result<Self> {
        let mut reader = open_table(path, "manifest", &[heading_column])?;
        let headers = reader.headers()?.clone();
        let heading_index = headers
            .iter()
            .position(|h| h == heading_column)
            .ok_or_else(|| MeshNormError::schema("manifest", heading_column))?;
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        info!(path = %path.display(), publications = rows.len(), "Manifest loaded");
        Ok(Self {
            headers,
            rows,
            heading_index,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parsed heading list of every publication, row order.
    pub fn heading_lists(&self) -> Vec<Option<Vec<String>>> {
        self.rows
            .iter()
            .map(|row| parse_heading_list(row.get(self.heading_index).unwrap_or("")))
            .collect()
    }

    /// Write the manifest with annotation columns filled in.
    ///
    /// Existing columns of the same name are overwritten; new ones are
    /// appended.
    pub fn write_annotated(
        &self,
        path: &Path,
        results: &[AnnotationResult],
        output_column: &str,
        cui_column: Option<&str>,
    ) -> Result<()> {
        if results.len() != self.rows.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} results for {} publications", results.len(), self.rows.len()),
            )
            .into());
        }

        let mut headers: Vec<String> = self.headers.iter().map(str::to_string).collect();
        let mut column = |name: &str| match headers.iter().position(|h| h == name) {
            Some(i) => i,
            None => {
                headers.push(name.to_string());
                headers.len() - 1
            }
        };
        let names_at = column(output_column);
        let cuis_at = cui_column.map(&mut column);

        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .zip(results)
            .map(|(row, result)| {
                let mut out: Vec<String> = row.iter().map(str::to_string).collect();
                out.resize(headers.len(), String::new());
                out[names_at] = result.names_column();
                if let Some(i) = cuis_at {
                    out[i] = result.concepts_column();
                }
                out
            })
            .collect();

        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        write_rows(path, &headers, &rows)
    }
}
