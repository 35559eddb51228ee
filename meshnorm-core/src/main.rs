//! MeshNorm - MeSH heading normalization
//!
//! # Usage
//!
//! ```bash
//! # Build the concept tables from MRCONSO and the MeSH tree table
//! meshnorm build --thesaurus MRCONSO.RRF --hierarchy mesh_tree.csv \
//!     --term-concepts mesh_to_cui.csv --equivalences cui_equivalences.csv
//!
//! # Annotate a manifest with disease names on four workers
//! MESHNORM_WORKER_THREADS=4 meshnorm annotate --manifest manifest.csv \
//!     --hierarchy mesh_tree.csv --term-concepts mesh_to_cui.csv \
//!     --equivalences cui_equivalences.csv --vocabulary diseases.csv \
//!     --output manifest_annotated.csv
//!
//! # Re-run against the edited vocabulary after each curation report
//! meshnorm annotate --await-curation ...
//!
//! # Experimental strategies instead of diseases
//! meshnorm annotate --branch exp_strat --output-column ExpStrategy ...
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meshnorm_core::annotate::{AnnotationResolver, CurationReport};
use meshnorm_core::builder::{BuildReport, ConceptTableBuilder};
use meshnorm_core::config::{AnnotateConfig, BuildConfig};
use meshnorm_core::hierarchy::{HierarchyResolver, TreeIndex};
use meshnorm_core::redundancy::{DuplicateCodePolicy, RedundancyFilter, TargetBranch};
use meshnorm_core::runtime::{build_pool, RuntimeConfig};
use meshnorm_core::store::VocabularyStore;
use meshnorm_core::tables::{self, Manifest, ThesaurusFormat};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meshnorm", version, about = "Normalize MeSH headings against UMLS concepts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the term → CUI and concept equivalence tables
    Build(BuildArgs),
    /// Annotate a publication manifest with standard names
    Annotate(AnnotateArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// MRCONSO table (.RRF or CSV with header)
    #[arg(long, value_name = "FILE")]
    thesaurus: PathBuf,

    /// Override the thesaurus format detected from the extension
    #[arg(long, value_name = "rrf|csv")]
    format: Option<ThesaurusFormat>,

    /// MeSH tree table with `tree` and `mesh` columns
    #[arg(long, value_name = "FILE")]
    hierarchy: PathBuf,

    /// Output path of the term → CUI table
    #[arg(long, value_name = "FILE", default_value = "mesh_to_cui.csv")]
    term_concepts: PathBuf,

    /// Output path of the concept equivalence table
    #[arg(long, value_name = "FILE", default_value = "cui_equivalences.csv")]
    equivalences: PathBuf,

    /// Write the build report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Publication manifest
    #[arg(long, value_name = "FILE")]
    manifest: PathBuf,

    /// Annotated manifest output
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// MeSH tree table with `tree` and `mesh` columns
    #[arg(long, value_name = "FILE")]
    hierarchy: PathBuf,

    /// Term → CUI table from `meshnorm build`
    #[arg(long, value_name = "FILE", default_value = "mesh_to_cui.csv")]
    term_concepts: PathBuf,

    /// Concept equivalence table from `meshnorm build`
    #[arg(long, value_name = "FILE", default_value = "cui_equivalences.csv")]
    equivalences: PathBuf,

    /// Controlled vocabulary with `UMLS_CUI` and `standard_name` columns
    #[arg(long, value_name = "FILE")]
    vocabulary: PathBuf,

    /// Candidate term per unmapped CUI
    #[arg(long, value_name = "FILE", default_value = "needed_cuis.csv")]
    needed_cuis: PathBuf,

    /// Also write every equivalence row of the unmapped CUIs
    #[arg(long, value_name = "FILE")]
    needed_rows: Option<PathBuf>,

    /// `disease`, `exp_strat`, or tree-number prefixes joined with `+`
    #[arg(short = 'p', long)]
    branch: Option<TargetBranch>,

    /// Keep ancestor headings
    #[arg(long)]
    keep_nested: bool,

    /// drop-both, keep-both or collapse
    #[arg(long)]
    duplicate_policy: Option<DuplicateCodePolicy>,

    /// Manifest column holding heading lists
    #[arg(long)]
    heading_column: Option<String>,

    /// Column receiving the standard names
    #[arg(long)]
    output_column: Option<String>,

    /// Column receiving the CUIs of the kept headings
    #[arg(long)]
    cui_column: Option<String>,

    /// Worker threads (1 resolves on the main thread)
    #[arg(short, long)]
    workers: Option<usize>,

    /// After each curation report, wait for the vocabulary to be edited,
    /// reload it and annotate again
    #[arg(long)]
    await_curation: bool,
}

impl AnnotateArgs {
    /// Apply flags over the environment-derived config.
    fn apply(&self, mut config: AnnotateConfig) -> AnnotateConfig {
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        config.keep_nested |= self.keep_nested;
        if let Some(policy) = self.duplicate_policy {
            config.duplicate_policy = policy;
        }
        if let Some(column) = &self.heading_column {
            config.heading_column = column.clone();
        }
        if let Some(column) = &self.output_column {
            config.output_column = column.clone();
        }
        if self.cui_column.is_some() {
            config.cui_column = self.cui_column.clone();
        }
        if let Some(workers) = self.workers {
            config.worker_threads = workers.max(1);
        }
        config
    }
}

fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Build(args) => run_build(args),
        Command::Annotate(args) => run_annotate(args),
    }
}

/// Initialize the tracing subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meshnorm_core=info,info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Serialize)]
struct BuildSummary<'a> {
    fingerprint: String,
    term_concepts: usize,
    equivalences: usize,
    #[serde(flatten)]
    report: &'a BuildReport,
}

fn run_build(args: BuildArgs) -> Result<()> {
    let config = BuildConfig::default();
    let format = args
        .format
        .unwrap_or_else(|| ThesaurusFormat::detect(&args.thesaurus));

    let load = tables::read_thesaurus(&args.thesaurus, format, &config.record_filter())
        .with_context(|| format!("reading thesaurus {}", args.thesaurus.display()))?;
    let index = load_tree_index(&args.hierarchy)?;

    let mut built = ConceptTableBuilder::new(&config, &load.records).build(index.headings());
    built.report.rejected_records = load.rejected;

    tables::write_term_concepts(&args.term_concepts, &built.term_concepts)
        .with_context(|| format!("writing {}", args.term_concepts.display()))?;
    tables::write_equivalences(&args.equivalences, &built.equivalences)
        .with_context(|| format!("writing {}", args.equivalences.display()))?;

    let fingerprint = built.fingerprint();
    if let Some(path) = &args.report {
        let summary = BuildSummary {
            fingerprint: fingerprint.to_string(),
            term_concepts: built.term_concepts.len(),
            equivalences: built.equivalences.len(),
            report: &built.report,
        };
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &summary)
            .with_context(|| format!("writing {}", path.display()))?;
        writer.flush()?;
    }

    info!(
        fingerprint = %fingerprint,
        missing = built.report.missing.len(),
        ambiguous = built.report.ambiguous.len(),
        rejected = built.report.rejected_records,
        "Build finished"
    );
    Ok(())
}

fn load_tree_index(path: &Path) -> Result<TreeIndex> {
    let rows = tables::read_hierarchy(path)
        .with_context(|| format!("reading hierarchy {}", path.display()))?;
    let index = TreeIndex::from_rows(rows);
    info!(headings = index.len(), "Hierarchy indexed");
    Ok(index)
}

fn run_annotate(args: AnnotateArgs) -> Result<()> {
    let config = args.apply(AnnotateConfig::from_env().context("reading environment")?);
    info!(
        branch = %config.branch,
        keep_nested = config.keep_nested,
        workers = config.worker_threads,
        "Annotating"
    );

    let resolver = HierarchyResolver::new(load_tree_index(&args.hierarchy)?);
    let store = VocabularyStore::from_tables(
        tables::read_term_concepts(&args.term_concepts)
            .with_context(|| format!("reading {}", args.term_concepts.display()))?,
        tables::read_vocabulary(&args.vocabulary)
            .with_context(|| format!("reading {}", args.vocabulary.display()))?,
        tables::read_equivalences(&args.equivalences)
            .with_context(|| format!("reading {}", args.equivalences.display()))?,
    );
    info!(
        terms = store.snapshot().term_count(),
        standard_names = store.snapshot().vocabulary_len(),
        "Vocabulary store loaded"
    );

    let manifest = Manifest::read(&args.manifest, &config.heading_column)
        .with_context(|| format!("reading manifest {}", args.manifest.display()))?;

    let filter = RedundancyFilter::new(&resolver, config.branch.clone())
        .keep_nested(config.keep_nested)
        .with_policy(config.duplicate_policy);
    let annotator = AnnotationResolver::new(filter, &store).with_not_specified(&config.not_specified);

    let publications = manifest.heading_lists();
    let pool = if config.is_parallel() {
        let pool = build_pool(RuntimeConfig::with_workers(config.worker_threads))
            .context("building worker pool")?;
        Some(pool)
    } else {
        None
    };

    loop {
        let outcome = match &pool {
            Some(pool) => annotator.resolve_batch_parallel(pool, &publications),
            None => annotator.resolve_batch(&publications),
        };

        manifest
            .write_annotated(
                &args.output,
                &outcome.results,
                &config.output_column,
                config.cui_column.as_deref(),
            )
            .with_context(|| format!("writing {}", args.output.display()))?;

        let curation = CurationReport::build(&outcome.report.unmapped, store.snapshot().equivalences());
        if curation.is_empty() {
            break;
        }
        write_curation(&args, &curation)?;

        if !args.await_curation || !wait_for_curation(&args.vocabulary)? {
            break;
        }
        let vocabulary = tables::read_vocabulary(&args.vocabulary)
            .with_context(|| format!("reading {}", args.vocabulary.display()))?;
        let version = store.replace_vocabulary(vocabulary);
        info!(
            version,
            standard_names = store.snapshot().vocabulary_len(),
            "Vocabulary reloaded"
        );
    }

    let unresolved = resolver.unresolved();
    if !unresolved.is_empty() {
        warn!(count = unresolved.len(), "Headings without tree numbers");
    }

    Ok(())
}

fn write_curation(args: &AnnotateArgs, curation: &CurationReport) -> Result<()> {
    println!("CUIs without a standard name:");
    for (cui, term) in &curation.candidates {
        println!("{cui}\t{term}");
    }
    tables::write_curation_report(&args.needed_cuis, curation)
        .with_context(|| format!("writing {}", args.needed_cuis.display()))?;
    if let Some(path) = &args.needed_rows {
        tables::write_curation_rows(path, curation)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    info!(
        cuis = curation.candidates.len(),
        path = %args.needed_cuis.display(),
        "Curation report written"
    );
    Ok(())
}

/// Block until the curator is done; `false` on `q` or end of input.
fn wait_for_curation(vocabulary: &Path) -> Result<bool> {
    println!(
        "Add standard names to {} and press Enter to re-run (q to stop)",
        vocabulary.display()
    );
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(line.trim() != "q")
}
