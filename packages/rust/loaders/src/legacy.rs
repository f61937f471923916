//! Legacy flat CSV word lists: the manually curated list and the canonical list.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use lexsync_shared::{LexsyncError, RawWordRow, Result, WordFields};

use crate::vocab::{self, clean};
use crate::{SourceLoader, read_optional};

/// Loads `<root>/legacy/manual_words.csv`. Bad rows are skipped with a warning.
pub struct ManualCsvLoader;

impl SourceLoader for ManualCsvLoader {
    fn name(&self) -> &str {
        "manual-csv"
    }

    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>> {
        let path = root.join("legacy").join("manual_words.csv");
        match read_optional(&path)? {
            Some(content) => parse_legacy_csv(&content, &LegacyOptions {
                source_id: self.name(),
                source_name: &path.display().to_string(),
                canonical: false,
                strict: false,
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Loads `<root>/legacy/canonical_words.csv`. Malformed records are fatal.
pub struct CanonicalCsvLoader;

impl SourceLoader for CanonicalCsvLoader {
    fn name(&self) -> &str {
        "canonical-csv"
    }

    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>> {
        let path = root.join("legacy").join("canonical_words.csv");
        match read_optional(&path)? {
            Some(content) => parse_legacy_csv(&content, &LegacyOptions {
                source_id: self.name(),
                source_name: &path.display().to_string(),
                canonical: true,
                strict: true,
            }),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) struct LegacyOptions<'a> {
    pub source_id: &'a str,
    pub source_name: &'a str,
    /// Mark rows as members of the canonical list.
    pub canonical: bool,
    /// Fail on the first malformed record instead of skipping it.
    pub strict: bool,
}

/// One row of the legacy flat table. Every column is optional text.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyRecord {
    #[serde(alias = "word")]
    lemma: Option<String>,
    #[serde(alias = "type")]
    pos: Option<String>,
    level: Option<String>,
    #[serde(alias = "translation")]
    english: Option<String>,
    #[serde(alias = "article")]
    gender: Option<String>,
    plural: Option<String>,
    aux: Option<String>,
    separable: Option<String>,
    praesens_ich: Option<String>,
    praesens_er: Option<String>,
    praeteritum: Option<String>,
    partizip_ii: Option<String>,
    perfekt: Option<String>,
    comparative: Option<String>,
    superlative: Option<String>,
    cases: Option<String>,
    notes: Option<String>,
    examples: Option<String>,
    approved: Option<String>,
    frequency: Option<String>,
}

impl LegacyRecord {
    fn into_row(self, opts: &LegacyOptions<'_>) -> std::result::Result<RawWordRow, String> {
        let lemma = clean(self.lemma).ok_or("missing lemma")?;
        let pos = clean(self.pos)
            .map(|p| vocab::parse_pos(&p))
            .ok_or_else(|| format!("missing pos for '{lemma}'"))?;

        let frequency_rank = match clean(self.frequency) {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|_| format!("invalid frequency '{raw}' for '{lemma}'"))?,
            ),
            None => None,
        };

        let perfekt = clean(self.perfekt);
        let auxiliary = clean(self.aux)
            .and_then(|a| vocab::parse_auxiliary(&a))
            .or_else(|| perfekt.as_deref().and_then(vocab::auxiliary_from_perfekt));

        Ok(RawWordRow {
            source_id: opts.source_id.to_string(),
            lemma,
            pos,
            fields: WordFields {
                level: clean(self.level),
                translations: clean(self.english)
                    .map(|e| vocab::split_list(&e))
                    .unwrap_or_default(),
                examples: clean(self.examples)
                    .map(|e| vocab::split_list(&e))
                    .unwrap_or_default(),
                gender: clean(self.gender).and_then(|g| vocab::parse_gender(&g)),
                plural: clean(self.plural),
                auxiliary,
                separable: clean(self.separable).and_then(|s| vocab::parse_bool(&s)),
                praesens_ich: clean(self.praesens_ich),
                praesens_er: clean(self.praesens_er),
                praeteritum: clean(self.praeteritum),
                partizip_ii: clean(self.partizip_ii),
                perfekt,
                comparative: clean(self.comparative),
                superlative: clean(self.superlative),
                cases: clean(self.cases)
                    .map(|c| vocab::parse_cases(&c))
                    .unwrap_or_default(),
                usage_notes: clean(self.notes),
                frequency_rank,
            },
            approved: clean(self.approved).and_then(|a| vocab::parse_bool(&a)),
            canonical: opts.canonical,
            enrichment: None,
        })
    }
}

pub(crate) fn parse_legacy_csv(content: &str, opts: &LegacyOptions<'_>) -> Result<Vec<RawWordRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| LexsyncError::parse(opts.source_name, Some(1), e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let outcome = result
            .map_err(|e| {
                let line = e.position().map(|p| p.line() as usize);
                (line, e.to_string())
            })
            .and_then(|record| {
                let line = record.position().map(|p| p.line() as usize);
                record
                    .deserialize::<LegacyRecord>(Some(&headers))
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.into_row(opts))
                    .map_err(|msg| (line, msg))
            });

        match outcome {
            Ok(row) => rows.push(row),
            Err((line, msg)) if opts.strict => {
                return Err(LexsyncError::parse(opts.source_name, line, msg));
            }
            Err((line, msg)) => {
                warn!(source = opts.source_name, ?line, error = %msg, "skipping malformed legacy row");
                skipped += 1;
            }
        }
    }

    debug!(source = opts.source_name, rows = rows.len(), skipped, "parsed legacy csv");
    Ok(rows)
}
