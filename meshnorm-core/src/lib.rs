//! MeshNorm Core - MeSH heading normalization against UMLS concepts
//!
//! Two pipelines share this crate:
//!
//! - **build**: link every MeSH heading to its UMLS concept and rank the
//!   ICD-10-CM / NCI synonyms of that concept by edit distance
//! - **annotate**: reduce each publication's heading list to its most
//!   specific in-branch headings and map them to curated standard names
//!
//! Key design principles:
//!
//! - **One lookup per term**: hierarchy results are memoized for the run
//! - **Lock-free reads**: lookup tables sit in an ArcSwap snapshot
//! - **Diagnostics as data**: missing and ambiguous concepts never abort

#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::unnecessary_to_owned)]

pub mod annotate;
pub mod builder;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod nlp;
pub mod redundancy;
pub mod runtime;
pub mod store;
pub mod tables;
pub mod thesaurus;

pub use annotate::{AnnotationResolver, AnnotationResult, BatchReport, CurationReport};
pub use builder::{BuildReport, ConceptTableBuilder, ConceptTables};
pub use config::{AnnotateConfig, BuildConfig};
pub use error::{MeshNormError, Result};
pub use hierarchy::{HierarchyLookup, HierarchyResolver, TreeIndex};
pub use redundancy::{DuplicateCodePolicy, RedundancyFilter, TargetBranch};
pub use runtime::build_pool;
pub use store::VocabularyStore;
pub use thesaurus::{SourceVocab, ThesaurusRecord};
