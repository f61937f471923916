//! Source loaders that turn raw lexical files into [`RawWordRow`]s.
//!
//! This crate provides:
//! - [`SourceLoader`]: one implementation per raw source format
//! - [`LoaderRegistry`]: the explicit, ordered list of loaders; its order is
//!   the merge precedence (earlier loaders win scalar conflicts)
//! - [`vocab`]: normalization of POS tags, genders, auxiliaries and cases
//! - [`write_audit_snapshot`]: CSV side channel of aggregated rows

mod audit;
mod community;
mod enrichment;
mod jsonl;
mod legacy;
mod record;
pub mod vocab;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use lexsync_shared::{LexsyncError, RawWordRow, Result};

pub use audit::write_audit_snapshot;
pub use community::CommunityLoader;
pub use enrichment::EnrichmentSnapshotLoader;
pub use jsonl::CuratedJsonlLoader;
pub use legacy::{CanonicalCsvLoader, ManualCsvLoader};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A loader for one raw source format.
///
/// Loaders must treat an absent source file as empty and propagate every
/// other I/O error; [`read_optional`] encodes that rule.
pub trait SourceLoader: Send + Sync {
    /// Stable loader name, referenced by `[loaders] order`.
    fn name(&self) -> &str;

    /// Read every record this source has under `root`.
    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>>;
}

/// Rows produced by one loader, tagged with the loader name.
#[derive(Debug, Clone)]
pub struct LoadedBatch {
    pub loader: String,
    pub rows: Vec<RawWordRow>,
}

/// Read a file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LexsyncError::io(path, e)),
    }
}

/// Files in `dir` with the given extension, sorted by name. A missing
/// directory yields an empty list.
pub(crate) fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LexsyncError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LexsyncError::io(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds loaders in merge precedence order.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn SourceLoader>>,
}

impl LoaderRegistry {
    /// All built-in loaders in default precedence order.
    pub fn new() -> Self {
        Self {
            loaders: builtin_loaders(),
        }
    }

    /// Built-in loaders arranged by name. An empty order and unknown or
    /// repeated names are errors.
    pub fn from_order(order: &[String]) -> Result<Self> {
        if order.is_empty() {
            return Err(LexsyncError::config("loader order must name at least one loader"));
        }
        let available = builtin_loaders();
        let mut loaders: Vec<Arc<dyn SourceLoader>> = Vec::with_capacity(order.len());

        for name in order {
            if loaders.iter().any(|l| l.name() == name) {
                return Err(LexsyncError::config(format!("loader '{name}' listed twice")));
            }
            let loader = available
                .iter()
                .find(|l| l.name() == name)
                .ok_or_else(|| LexsyncError::config(format!("unknown loader '{name}'")))?;
            loaders.push(Arc::clone(loader));
        }

        Ok(Self { loaders })
    }

    /// Registry from caller-supplied loaders, in the given order.
    pub fn with_loaders(loaders: Vec<Arc<dyn SourceLoader>>) -> Self {
        Self { loaders }
    }

    /// Loader names in precedence order.
    pub fn names(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    /// Run every loader against `root`.
    ///
    /// Loaders run concurrently on the blocking pool; batches come back in
    /// registry order regardless of which loader finishes first.
    #[instrument(skip_all, fields(root = %root.display(), loaders = self.loaders.len()))]
    pub async fn load_all(&self, root: &Path) -> Result<Vec<LoadedBatch>> {
        let handles: Vec<_> = self
            .loaders
            .iter()
            .map(|loader| {
                let loader = Arc::clone(loader);
                let root = root.to_path_buf();
                tokio::task::spawn_blocking(move || {
                    let rows = loader.load(&root)?;
                    Ok::<_, LexsyncError>(LoadedBatch {
                        loader: loader.name().to_string(),
                        rows,
                    })
                })
            })
            .collect();

        let mut batches = Vec::with_capacity(handles.len());
        for handle in handles {
            let batch = handle
                .await
                .map_err(|e| LexsyncError::validation(format!("loader task failed: {e}")))??;
            info!(loader = %batch.loader, rows = batch.rows.len(), "source loaded");
            batches.push(batch);
        }
        Ok(batches)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_loaders() -> Vec<Arc<dyn SourceLoader>> {
    vec![
        Arc::new(CuratedJsonlLoader),
        Arc::new(ManualCsvLoader),
        Arc::new(CanonicalCsvLoader),
        Arc::new(CommunityLoader),
        Arc::new(EnrichmentSnapshotLoader),
    ]
}
