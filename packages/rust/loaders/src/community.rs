//! Community vocabulary dataset (`<root>/community/vocabulary.json`).

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use lexsync_shared::{LexsyncError, RawWordRow, Result, WordFields};

use crate::vocab::{self, clean};
use crate::{SourceLoader, read_optional};

/// Loads the community vocabulary module.
pub struct CommunityLoader;

/// Either a bare entry array or a named dataset wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommunityFile {
    Entries(Vec<CommunityEntry>),
    Dataset(CommunityDataset),
}

#[derive(Debug, Deserialize)]
struct CommunityDataset {
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    entries: Vec<CommunityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommunityEntry {
    word: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    translation: Option<String>,
    #[serde(default)]
    article: Option<String>,
    #[serde(default)]
    plural: Option<String>,
    #[serde(default)]
    example: Option<String>,
    #[serde(default)]
    rank: Option<u32>,
}

impl SourceLoader for CommunityLoader {
    fn name(&self) -> &str {
        "community"
    }

    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>> {
        let path = root.join("community").join("vocabulary.json");
        let Some(content) = read_optional(&path)? else {
            return Ok(Vec::new());
        };
        parse_community(&content, &path.display().to_string())
    }
}

fn parse_community(content: &str, source_name: &str) -> Result<Vec<RawWordRow>> {
    let file: CommunityFile = serde_json::from_str(content)
        .map_err(|e| LexsyncError::parse(source_name, None, e.to_string()))?;

    let (name, entries) = match file {
        CommunityFile::Entries(entries) => (None, entries),
        CommunityFile::Dataset(dataset) => (dataset.dataset, dataset.entries),
    };
    let source_id = match clean(name) {
        Some(name) => format!("community:{name}"),
        None => "community".to_string(),
    };

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(lemma) = clean(Some(entry.word)) else {
            warn!(source = source_name, "community entry without word, skipping");
            continue;
        };
        rows.push(RawWordRow {
            source_id: source_id.clone(),
            lemma,
            pos: vocab::parse_pos(&entry.kind),
            fields: WordFields {
                level: clean(entry.level),
                translations: clean(entry.translation)
                    .map(|t| vocab::split_list(&t))
                    .unwrap_or_default(),
                examples: clean(entry.example).into_iter().collect(),
                gender: clean(entry.article).and_then(|a| vocab::parse_gender(&a)),
                plural: clean(entry.plural),
                frequency_rank: entry.rank,
                ..WordFields::default()
            },
            approved: None,
            canonical: false,
            enrichment: None,
        });
    }

    debug!(source = source_name, rows = rows.len(), "parsed community dataset");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{Gender, PartOfSpeech, PosTag};

    #[test]
    fn entries_normalize_articles() {
        let json = r#"{
            "dataset": "goethe-a1",
            "entries": [
                {"word": "Tisch", "type": "Nomen", "level": "A1", "translation": "table", "article": "der", "plural": "Tische"},
                {"word": "  ", "type": "Nomen"},
                {"word": "schnell", "type": "Adjektiv", "rank": 300}
            ]
        }"#;
        let rows = parse_community(json, "vocabulary.json").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source_id, "community:goethe-a1");
        assert_eq!(rows[0].fields.gender, Some(Gender::Masculine));
        assert_eq!(rows[1].pos, PosTag::Known(PartOfSpeech::Adjective));
        assert_eq!(rows[1].fields.frequency_rank, Some(300));
    }

    #[test]
    fn bare_array_is_accepted() {
        let json = r#"[
            {"word": "Tisch", "type": "Nomen", "level": "A1", "translation": "table", "article": "der", "plural": "Tische"},
            {"word": "gehen", "type": "Verb", "translation": "to go; to walk"}
        ]"#;
        let rows = parse_community(json, "vocabulary.json").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source_id, "community");
        assert_eq!(rows[0].fields.gender, Some(Gender::Masculine));
        assert_eq!(rows[0].fields.plural.as_deref(), Some("Tische"));
        assert_eq!(rows[1].pos, PosTag::Known(PartOfSpeech::Verb));
        assert_eq!(rows[1].fields.translations, vec!["to go", "to walk"]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_community("[1,2", "vocabulary.json").is_err());
    }
}
