//! End-to-end seed pipeline: sources → merge → validate → build → persist.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use lexsync_loaders::{LoaderRegistry, write_audit_snapshot};
use lexsync_shared::{AggregatedWord, AppConfig, LexsyncError, Result, verbose_warnings_from_env};
use lexsync_storage::{BatchOptions, Storage};

use crate::delta::{DeltaSynchronizer, SyncOutcome};
use crate::lexeme::{BuildOptions, build_lexeme};
use crate::merge::merge_batches;
use crate::pack::{PackOptions, PackSummary, build_packs};
use crate::reconcile::{ReconcileReport, SeedSet, reconcile};
use crate::templates::{TaskTypeRegistry, generate_tasks_with};
use crate::validate::{approval_warnings, validate_word};

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub language: String,
    pub batch_size: usize,
    pub source_revision: String,
    pub write_audit_snapshot: bool,
    pub write_packs: bool,
    pub restrict_to_canonical: bool,
    pub verbose_warnings: bool,
    pub loader_order: Vec<String>,
}

impl SeedConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.defaults.data_dir),
            database_path: PathBuf::from(&config.defaults.database_path),
            output_dir: PathBuf::from(&config.defaults.output_dir),
            language: config.defaults.language.clone(),
            batch_size: config.pipeline.batch_size,
            source_revision: config.pipeline.source_revision.clone(),
            write_audit_snapshot: config.pipeline.write_audit_snapshot,
            write_packs: config.pipeline.write_packs,
            restrict_to_canonical: config.pipeline.restrict_to_canonical,
            verbose_warnings: config.pipeline.verbose_warnings || verbose_warnings_from_env(),
            loader_order: config.loaders.order.clone(),
        }
    }

    pub fn audit_path(&self) -> PathBuf {
        self.output_dir.join("audit").join("aggregated_words.csv")
    }
}

/// A word that produced no lexeme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedWord {
    pub key: String,
    pub reason: String,
}

/// Result of [`run_seed`].
#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub aggregated_words: usize,
    pub lexemes: usize,
    pub inflections: usize,
    pub task_specs: usize,
    pub skipped: Vec<SkippedWord>,
    pub reconcile: ReconcileReport,
    pub packs: Vec<PackSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_path: Option<PathBuf>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each word is built.
    fn word_built(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &SeedResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn word_built(&self, _current: usize, _total: usize) {}
    fn done(&self, _result: &SeedResult) {}
}

/// Load every source and merge into aggregated words, sorted by key.
#[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
pub async fn collect_words(
    config: &SeedConfig,
    registry: &LoaderRegistry,
) -> Result<Vec<AggregatedWord>> {
    let batches = registry.load_all(&config.data_dir).await?;
    let merged = merge_batches(&batches);

    let total = merged.len();
    let words: Vec<AggregatedWord> = merged
        .into_values()
        .filter(|w| !config.restrict_to_canonical || w.canonical)
        .collect();
    if config.restrict_to_canonical {
        info!(kept = words.len(), dropped = total - words.len(), "restricted to canonical words");
    }
    Ok(words)
}

/// Run the seed pipeline with the built-in loaders in configured order.
pub async fn run_seed(
    config: &SeedConfig,
    progress: &dyn ProgressReporter,
    cancel: CancellationToken,
) -> Result<SeedResult> {
    let registry = LoaderRegistry::from_order(&config.loader_order)?;
    run_seed_with(config, &registry, progress, cancel).await
}

/// Run the seed pipeline with an explicit loader registry.
///
/// 1. Load and merge sources
/// 2. Validate, build lexemes and inflections, expand task templates
/// 3. Write the audit snapshot
/// 4. Reconcile with the database
/// 5. Rebuild content packs
#[instrument(skip_all, fields(db = %config.database_path.display()))]
pub async fn run_seed_with(
    config: &SeedConfig,
    registry: &LoaderRegistry,
    progress: &dyn ProgressReporter,
    cancel: CancellationToken,
) -> Result<SeedResult> {
    let start = Instant::now();
    info!(loaders = ?registry.names(), "starting seed pipeline");

    // --- Phase 1: Sources ---
    progress.phase("Loading sources");
    let words = collect_words(config, registry).await?;
    if cancel.is_cancelled() {
        return Err(LexsyncError::Cancelled);
    }

    // --- Phase 2: Build ---
    progress.phase("Building lexemes");
    let task_types = TaskTypeRegistry::standard();
    let (seeds, skipped) = build_seed_set(config, words, &task_types, progress)?;

    // --- Phase 3: Audit snapshot ---
    let audit_path = if config.write_audit_snapshot {
        let path = config.audit_path();
        write_audit_snapshot(&path, &seeds.words)?;
        Some(path)
    } else {
        None
    };

    // --- Phase 4: Persist ---
    progress.phase("Reconciling database");
    let storage = Storage::open(&config.database_path).await?;
    let batch = BatchOptions::new(config.batch_size, cancel);
    let report = reconcile(&storage, &seeds, &batch).await?;

    // --- Phase 5: Packs ---
    let packs = if config.write_packs {
        progress.phase("Building content packs");
        let options = PackOptions {
            language: config.language.clone(),
            output_dir: Some(config.output_dir.clone()),
        };
        build_packs(&storage, &options, &batch).await?
    } else {
        Vec::new()
    };

    let result = SeedResult {
        aggregated_words: seeds.words.len(),
        lexemes: seeds.lexemes.len(),
        inflections: seeds.inflections.len(),
        task_specs: seeds.tasks.len(),
        skipped,
        reconcile: report,
        packs,
        audit_path,
        elapsed: start.elapsed(),
    };

    info!(
        words = result.aggregated_words,
        lexemes = result.lexemes,
        inflections = result.inflections,
        tasks = result.task_specs,
        skipped = result.skipped.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "seed pipeline complete"
    );
    progress.done(&result);
    Ok(result)
}

/// Validate and expand every word. Per-word failures land in the skipped
/// list; an unsupported part of speech reaching the builder is fatal.
fn build_seed_set(
    config: &SeedConfig,
    words: Vec<AggregatedWord>,
    task_types: &TaskTypeRegistry,
    progress: &dyn ProgressReporter,
) -> Result<(SeedSet, Vec<SkippedWord>)> {
    let options = BuildOptions {
        language: config.language.clone(),
        source_revision: config.source_revision.clone(),
    };
    let mut seeds = SeedSet::default();
    let mut skipped = Vec::new();
    let mut warned = 0usize;
    let total = words.len();

    for (i, word) in words.iter().enumerate() {
        progress.word_built(i + 1, total);
        let key = word.key();
        let report = validate_word(word);

        let mut warnings = report.warnings.clone();
        warnings.extend(approval_warnings(word));
        if !warnings.is_empty() {
            warned += 1;
            if config.verbose_warnings {
                warn!(%key, ?warnings, "validation warnings");
            }
        }

        if !report.is_complete() {
            debug!(%key, errors = ?report.errors, "word skipped");
            skipped.push(SkippedWord {
                key,
                reason: format!("missing required fields: {}", report.errors.join(", ")),
            });
            continue;
        }

        let (lexeme, inflections) = build_lexeme(word, &options)?;
        let tasks = match generate_tasks_with(task_types, word, &lexeme.id) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(%key, error = %e, "task generation failed, word skipped");
                skipped.push(SkippedWord {
                    key,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        seeds.lexemes.push(lexeme);
        seeds.inflections.extend(inflections);
        seeds.tasks.extend(tasks);
    }

    if warned > 0 && !config.verbose_warnings {
        info!(words = warned, "words with validation warnings (set verbose warnings to list them)");
    }
    seeds.words = words;
    Ok((seeds, skipped))
}

/// Marker-driven task synchronization against the configured database.
#[instrument(skip_all, fields(force_full = force_full, reset = reset))]
pub async fn run_sync(
    config: &SeedConfig,
    force_full: bool,
    reset: bool,
    cancel: CancellationToken,
) -> Result<SyncOutcome> {
    let storage = Storage::open(&config.database_path).await?;
    let batch = BatchOptions::new(config.batch_size, cancel);
    let mut sync = DeltaSynchronizer::new(&storage, &storage, batch);
    if reset {
        sync.reset().await?;
    }
    sync.run(force_full).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{Auxiliary, DEFAULT_LOADER_ORDER, Gender, PartOfSpeech, Renderer};

    fn word(lemma: &str, pos: PartOfSpeech) -> AggregatedWord {
        let mut w = AggregatedWord {
            lemma: lemma.into(),
            pos: pos.into(),
            approved: true,
            complete: true,
            sources: vec!["curated-jsonl".into()],
            ..AggregatedWord::default()
        };
        w.fields.level = Some("A1".into());
        w
    }

    #[test]
    fn seed_config_from_defaults() {
        let config = SeedConfig::from_app_config(&AppConfig::default());
        assert_eq!(config.language, "de");
        assert_eq!(config.batch_size, 500);
        assert!(config.write_packs);
        assert_eq!(config.loader_order.len(), DEFAULT_LOADER_ORDER.len());
        assert!(config.audit_path().ends_with("audit/aggregated_words.csv"));
    }

    #[test]
    fn template_failure_skips_only_that_word() {
        let mut gehen = word("gehen", PartOfSpeech::Verb);
        gehen.fields.praeteritum = Some("ging".into());
        gehen.fields.partizip_ii = Some("gegangen".into());
        gehen.fields.auxiliary = Some(Auxiliary::Sein);
        gehen.fields.translations = vec!["to go".into()];

        let mut haus = word("Haus", PartOfSpeech::Noun);
        haus.fields.gender = Some(Gender::Neuter);
        haus.fields.plural = Some("Häuser".into());

        // Article tasks carry options, not a cloze text.
        let mut task_types = TaskTypeRegistry::standard();
        task_types.register("noun_article", Renderer::Cloze);

        let config = SeedConfig::from_app_config(&AppConfig::default());
        let (seeds, skipped) =
            build_seed_set(&config, vec![gehen, haus], &task_types, &SilentProgress).unwrap();

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].key, "haus::noun");
        assert!(skipped[0].reason.contains("noun-article"));

        assert_eq!(seeds.words.len(), 2);
        assert_eq!(seeds.lexemes.len(), 1);
        let gehen_id = &seeds.lexemes[0].id;
        assert!(gehen_id.starts_with("de:verb:gehen:"));
        assert!(!seeds.inflections.is_empty());
        assert!(seeds.inflections.iter().all(|i| &i.lexeme_id == gehen_id));
        assert!(!seeds.tasks.is_empty());
        assert!(seeds.tasks.iter().all(|t| &t.lexeme_id == gehen_id));
    }
}
