//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lexsync_core::attribution::summarize;
use lexsync_core::delta::{MarkerStore, SyncOutcome};
use lexsync_core::pipeline::{
    ProgressReporter, SeedConfig, SeedResult, collect_words, run_seed, run_sync,
};
use lexsync_loaders::LoaderRegistry;
use lexsync_shared::{
    AppConfig, LexsyncError, config_file_path, init_config, load_config, load_config_from,
};
use lexsync_storage::{Entity, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lexsync: seed and synchronize German lexical content.
#[derive(Parser)]
#[command(
    name = "lexsync",
    version,
    about = "Seed and synchronize German vocabulary, inflections and practice tasks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.lexsync/lexsync.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every validation warning.
    #[arg(long, env = "LEXSYNC_VERBOSE_WARNINGS", global = true)]
    pub verbose_warnings: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Path overrides shared by commands that touch sources or the database.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct PathArgs {
    /// Root of the raw source files.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// libSQL database file.
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Output directory for audit snapshots and content packs.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full seed pipeline once.
    Seed {
        #[command(flatten)]
        paths: PathArgs,

        /// Keep only words on the canonical list.
        #[arg(long)]
        canonical_only: bool,

        /// Skip the audit CSV snapshot.
        #[arg(long)]
        no_audit: bool,

        /// Skip content pack generation.
        #[arg(long)]
        no_packs: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Regenerate tasks for lexemes changed since the last sync.
    Sync {
        #[command(flatten)]
        paths: PathArgs,

        /// Ignore the stored marker and regenerate every lexeme.
        #[arg(long)]
        full: bool,

        /// Clear the stored marker before running.
        #[arg(long)]
        reset: bool,
    },

    /// Print per-source attribution for the merged vocabulary.
    Attribution {
        #[command(flatten)]
        paths: PathArgs,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show database contents and sync state.
    Status {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lexsync=info",
        1 => "lexsync=debug",
        _ => "lexsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let app_config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Seed {
            paths,
            canonical_only,
            no_audit,
            no_packs,
            json,
        } => {
            let mut config = resolve(&app_config, &paths, cli.verbose_warnings);
            config.restrict_to_canonical |= canonical_only;
            config.write_audit_snapshot &= !no_audit;
            config.write_packs &= !no_packs;
            cmd_seed(&config, json).await
        }
        Command::Sync { paths, full, reset } => {
            let config = resolve(&app_config, &paths, cli.verbose_warnings);
            cmd_sync(&config, full, reset).await
        }
        Command::Attribution { paths, json } => {
            let config = resolve(&app_config, &paths, cli.verbose_warnings);
            cmd_attribution(&config, json).await
        }
        Command::Status { paths } => {
            let config = resolve(&app_config, &paths, cli.verbose_warnings);
            cmd_status(&config).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&app_config).await,
        },
    }
}

/// CLI flags override config file values, which override defaults.
fn resolve(app_config: &AppConfig, paths: &PathArgs, verbose_warnings: bool) -> SeedConfig {
    let mut config = SeedConfig::from_app_config(app_config);
    if let Some(dir) = &paths.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(db) = &paths.database {
        config.database_path = db.clone();
    }
    if let Some(out) = &paths.out {
        config.output_dir = out.clone();
    }
    config.verbose_warnings |= verbose_warnings;
    config
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            child.cancel();
        }
    });
    token
}

fn interrupted(err: LexsyncError) -> color_eyre::Report {
    match err {
        LexsyncError::Cancelled => eyre!("interrupted; committed batches were kept"),
        other => other.into(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_seed(config: &SeedConfig, json: bool) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        db = %config.database_path.display(),
        "seeding"
    );

    let reporter = CliProgress::new();
    let result = run_seed(config, &reporter, cancel_on_ctrl_c())
        .await
        .map_err(interrupted)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("  Seed complete");
    println!("  Aggregated words: {}", result.aggregated_words);
    println!("  Lexemes:          {}", result.lexemes);
    println!("  Inflections:      {}", result.inflections);
    println!("  Task specs:       {}", result.task_specs);
    println!("  Skipped words:    {}", result.skipped.len());
    for skipped in &result.skipped {
        println!("    - {} ({})", skipped.key, skipped.reason);
    }
    println!(
        "  Written/removed:  lexemes {}/{}, inflections {}/{}, tasks {}/{}",
        result.reconcile.lexemes_written,
        result.reconcile.lexemes_removed,
        result.reconcile.inflections_written,
        result.reconcile.inflections_removed,
        result.reconcile.tasks_written,
        result.reconcile.tasks_removed,
    );
    for pack in &result.packs {
        let marker = if pack.changed { " (new)" } else { "" };
        println!(
            "  Pack:             {} v{} [{} lexemes]{marker}",
            pack.slug, pack.version, pack.lexeme_count
        );
    }
    if let Some(path) = &result.audit_path {
        println!("  Audit snapshot:   {}", path.display());
    }
    println!("  Time:             {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_sync(config: &SeedConfig, full: bool, reset: bool) -> Result<()> {
    info!(full, reset, db = %config.database_path.display(), "synchronizing tasks");

    let outcome: SyncOutcome = run_sync(config, full, reset, cancel_on_ctrl_c())
        .await
        .map_err(interrupted)?;

    println!();
    println!("  Sync complete ({})", outcome.mode.as_str());
    println!("  Lexemes:   {}", outcome.lexemes);
    println!("  Written:   {}", outcome.tasks_written);
    println!("  Removed:   {}", outcome.tasks_removed);
    if !outcome.failed.is_empty() {
        println!("  Failed:    {}", outcome.failed.join(", "));
    }
    match &outcome.latest_touched_at {
        Some(marker) => println!("  Marker:    {marker}"),
        None => println!("  Marker:    unchanged (nothing to do)"),
    }
    println!();

    Ok(())
}

async fn cmd_attribution(config: &SeedConfig, json: bool) -> Result<()> {
    let registry = LoaderRegistry::from_order(&config.loader_order)?;
    let words = collect_words(config, &registry).await?;
    let entries = summarize(&words);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{} [{}]", entry.label, entry.id);
        println!("  license: {}", entry.license);
        if let Some(url) = &entry.url {
            println!("  url:     {url}");
        }
        println!(
            "  words:   {} ({})",
            entry.lexeme_count,
            entry.parts_of_speech.join(", ")
        );
    }
    Ok(())
}

async fn cmd_status(config: &SeedConfig) -> Result<()> {
    let storage = Storage::open_readonly(&config.database_path).await?;

    println!();
    println!("  Database:    {}", config.database_path.display());
    println!("  Schema:      v{}", storage.get_schema_version().await);
    println!("  Words:       {}", storage.count_words().await?);
    println!("  Lexemes:     {}", storage.count(Entity::Lexeme).await?);
    println!("  Inflections: {}", storage.count(Entity::Inflection).await?);
    println!("  Task specs:  {}", storage.count(Entity::TaskSpec).await?);
    for pack in storage.list_packs().await? {
        println!("  Pack:        {} v{} [{} lexemes]", pack.slug, pack.version, pack.lexeme_count);
    }
    match storage.get_marker().await? {
        Some(marker) => println!("  Last sync:   {marker}"),
        None => println!("  Last sync:   never"),
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    if let Ok(path) = config_file_path() {
        println!("# {}", path.display());
    }
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn word_built(&self, current: usize, total: usize) {
        if current % 100 == 0 || current == total {
            self.spinner
                .set_message(format!("Building lexemes [{current}/{total}]"));
        }
    }

    fn done(&self, _result: &SeedResult) {
        self.spinner.finish_and_clear();
    }
}
