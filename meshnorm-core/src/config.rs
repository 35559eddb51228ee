//! Build and annotation settings.
//!
//! Defaults match the standard pipeline (MeSH canonical, ICD-10-CM and NCI
//! alternates, English, disease branch). A few settings can be overridden
//! from the environment; CLI flags take precedence over both.

use std::env;

use tracing::warn;

use crate::annotate::NOT_SPECIFIED;
use crate::error::Result;
use crate::redundancy::{DuplicateCodePolicy, TargetBranch};
use crate::thesaurus::{RecordFilter, SourceVocab, ENGLISH};

/// Environment variable for the target branch
pub const ENV_BRANCH: &str = "MESHNORM_BRANCH";

/// Environment variable for annotation worker threads
pub const ENV_WORKER_THREADS: &str = "MESHNORM_WORKER_THREADS";

/// Settings for building concept tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Vocabulary whose terms are the headings
    pub canonical_source: SourceVocab,
    /// Vocabularies scanned for synonyms, in output order
    pub alternate_sources: Vec<SourceVocab>,
    /// Accepted LAT values
    pub languages: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            canonical_source: SourceVocab::Msh,
            alternate_sources: vec![SourceVocab::Icd10cm, SourceVocab::Nci],
            languages: vec![ENGLISH.to_string()],
        }
    }
}

impl BuildConfig {
    /// Row filter keeping the configured languages and vocabularies.
    pub fn record_filter(&self) -> RecordFilter {
        let mut sources = vec![self.canonical_source];
        for &source in &self.alternate_sources {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        RecordFilter {
            languages: self.languages.clone(),
            sources,
        }
    }
}

/// Settings for annotating a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotateConfig {
    pub branch: TargetBranch,
    /// Keep ancestor headings
    pub keep_nested: bool,
    pub duplicate_policy: DuplicateCodePolicy,
    /// Placeholder name dropped when other names are present
    pub not_specified: String,
    /// Manifest column holding the heading list
    pub heading_column: String,
    /// Column receiving the standard names
    pub output_column: String,
    /// Column receiving the CUIs, if any
    pub cui_column: Option<String>,
    /// 1 resolves on the calling thread
    pub worker_threads: usize,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            branch: TargetBranch::disease(),
            keep_nested: false,
            duplicate_policy: DuplicateCodePolicy::default(),
            not_specified: NOT_SPECIFIED.to_string(),
            heading_column: "mesh".to_string(),
            output_column: "Disease".to_string(),
            cui_column: None,
            worker_threads: 1,
        }
    }
}

impl AnnotateConfig {
    /// Defaults with environment overrides applied.
    ///
    /// An unparseable branch is an error; an unparseable thread count is
    /// logged and ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(branch) = env::var(ENV_BRANCH) {
            config.branch = branch.parse()?;
        }

        if let Ok(raw) = env::var(ENV_WORKER_THREADS) {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.worker_threads = n,
                _ => warn!(value = %raw, var = ENV_WORKER_THREADS, "Ignoring invalid worker count"),
            }
        }

        Ok(config)
    }

    /// Whether batches go through a worker pool.
    pub fn is_parallel(&self) -> bool {
        self.worker_threads > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.canonical_source, SourceVocab::Msh);
        assert_eq!(
            config.alternate_sources,
            vec![SourceVocab::Icd10cm, SourceVocab::Nci]
        );
        assert_eq!(config.record_filter(), RecordFilter::default());
    }

    #[test]
    fn test_record_filter_dedupes_sources() {
        let config = BuildConfig {
            alternate_sources: vec![SourceVocab::Nci, SourceVocab::Msh],
            ..Default::default()
        };
        assert_eq!(
            config.record_filter().sources,
            vec![SourceVocab::Msh, SourceVocab::Nci]
        );
    }

    #[test]
    fn test_annotate_defaults() {
        let config = AnnotateConfig::default();
        assert_eq!(config.branch, TargetBranch::disease());
        assert!(!config.keep_nested);
        assert_eq!(config.duplicate_policy, DuplicateCodePolicy::Collapse);
        assert_eq!(config.not_specified, "Not Specified");
        assert_eq!(config.output_column, "Disease");
        assert!(config.cui_column.is_none());
        assert!(!config.is_parallel());
    }

    // Environment is process-wide, so every override is checked in one test
    #[test]
    fn test_from_env() {
        env::set_var(ENV_BRANCH, "exp_strat");
        env::set_var(ENV_WORKER_THREADS, "4");
        let config = AnnotateConfig::from_env().unwrap();
        assert_eq!(config.branch, TargetBranch::exp_strat());
        assert_eq!(config.worker_threads, 4);

        env::set_var(ENV_WORKER_THREADS, "zero");
        assert_eq!(AnnotateConfig::from_env().unwrap().worker_threads, 1);

        env::set_var(ENV_BRANCH, "C+");
        assert!(AnnotateConfig::from_env().is_err());

        env::remove_var(ENV_BRANCH);
        env::remove_var(ENV_WORKER_THREADS);
        assert_eq!(AnnotateConfig::from_env().unwrap(), AnnotateConfig::default());
    }
}
