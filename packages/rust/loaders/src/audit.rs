//! Combined CSV audit snapshot of aggregated words.
//!
//! Side channel for reviewers; nothing downstream reads it back.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use lexsync_shared::{AggregatedWord, LexsyncError, Result, format_timestamp};

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    key: String,
    lemma: &'a str,
    pos: &'a str,
    level: &'a str,
    translations: String,
    gender: &'a str,
    plural: &'a str,
    auxiliary: &'a str,
    praeteritum: &'a str,
    partizip_ii: &'a str,
    perfekt: &'a str,
    comparative: &'a str,
    superlative: &'a str,
    cases: String,
    approved: bool,
    canonical: bool,
    complete: bool,
    sources: String,
    enriched_at: String,
}

impl<'a> From<&'a AggregatedWord> for AuditRow<'a> {
    fn from(word: &'a AggregatedWord) -> Self {
        let f = &word.fields;
        Self {
            key: word.key(),
            lemma: &word.lemma,
            pos: word.pos.code(),
            level: f.level.as_deref().unwrap_or(""),
            translations: f.translations.join("; "),
            gender: f.gender.map(|g| g.as_str()).unwrap_or(""),
            plural: f.plural.as_deref().unwrap_or(""),
            auxiliary: f.auxiliary.map(|a| a.as_str()).unwrap_or(""),
            praeteritum: f.praeteritum.as_deref().unwrap_or(""),
            partizip_ii: f.partizip_ii.as_deref().unwrap_or(""),
            perfekt: f.perfekt.as_deref().unwrap_or(""),
            comparative: f.comparative.as_deref().unwrap_or(""),
            superlative: f.superlative.as_deref().unwrap_or(""),
            cases: f
                .cases
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("/"),
            approved: word.approved,
            canonical: word.canonical,
            complete: word.complete,
            sources: word.sources.join("; "),
            enriched_at: word
                .enrichment
                .as_ref()
                .map(|e| format_timestamp(&e.enriched_at))
                .unwrap_or_default(),
        }
    }
}

/// Write `words` as CSV to `path` (temp file + rename). Returns the row count.
pub fn write_audit_snapshot(path: &Path, words: &[AggregatedWord]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LexsyncError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for word in words {
        writer
            .serialize(AuditRow::from(word))
            .map_err(|e| LexsyncError::validation(format!("audit row for {}: {e}", word.key())))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| LexsyncError::validation(format!("audit snapshot flush: {e}")))?;

    let temp = path.with_extension("csv.tmp");
    std::fs::write(&temp, &bytes).map_err(|e| LexsyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LexsyncError::io(path, e))?;

    info!(path = %path.display(), rows = words.len(), "wrote audit snapshot");
    Ok(words.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{GovernedCase, PartOfSpeech};

    #[test]
    fn snapshot_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("aggregated_words.csv");

        let mut word = AggregatedWord {
            lemma: "mit".into(),
            pos: PartOfSpeech::Preposition.into(),
            sources: vec!["manual-csv".into(), "community".into()],
            ..AggregatedWord::default()
        };
        word.fields.cases = vec![GovernedCase::Dative];

        let n = write_audit_snapshot(&path, &[word]).unwrap();
        assert_eq!(n, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("key,lemma,pos"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("mit::preposition,mit,preposition"));
        assert!(row.contains("dative"));
        assert!(row.contains("manual-csv; community"));
    }
}
