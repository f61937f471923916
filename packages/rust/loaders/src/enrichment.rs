//! Persisted enrichment-provider snapshots (`<root>/enrichment/*.json`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use lexsync_shared::{EnrichmentProvenance, LexsyncError, RawWordRow, Result};

use crate::record::WordRecord;
use crate::{SourceLoader, list_files, read_optional};

/// Loads every snapshot file, in file-name order.
pub struct EnrichmentSnapshotLoader;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    provider: String,
    generated_at: DateTime<Utc>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    entries: Vec<WordRecord>,
}

impl SourceLoader for EnrichmentSnapshotLoader {
    fn name(&self) -> &str {
        "enrichment"
    }

    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>> {
        let dir = root.join("enrichment");
        let mut rows = Vec::new();
        for path in list_files(&dir, "json")? {
            let Some(content) = read_optional(&path)? else {
                continue;
            };
            rows.extend(parse_snapshot(&content, &path.display().to_string())?);
        }
        Ok(rows)
    }
}

fn parse_snapshot(content: &str, source_name: &str) -> Result<Vec<RawWordRow>> {
    let snapshot: Snapshot = serde_json::from_str(content)
        .map_err(|e| LexsyncError::parse(source_name, None, e.to_string()))?;

    let provider = snapshot.provider.trim().to_lowercase();
    let source_id = format!("enrichment:{provider}");
    let provenance = EnrichmentProvenance {
        provider: provider.clone(),
        enriched_at: snapshot.generated_at,
        model: snapshot.model,
    };

    let mut rows = Vec::with_capacity(snapshot.entries.len());
    for (idx, record) in snapshot.entries.into_iter().enumerate() {
        let mut row = record
            .into_row(&source_id, None)
            .map_err(|msg| LexsyncError::parse(source_name, None, format!("entry {idx}: {msg}")))?;
        // Provider output is never pre-approved.
        row.approved = None;
        row.enrichment = Some(provenance.clone());
        rows.push(row);
    }

    debug!(source = source_name, %provider, rows = rows.len(), "parsed enrichment snapshot");
    Ok(rows)
}
