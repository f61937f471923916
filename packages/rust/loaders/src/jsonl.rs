//! Curated per-category JSONL files under `<root>/jsonl/`.

use std::path::Path;

use tracing::debug;

use lexsync_shared::{LexsyncError, RawWordRow, Result};

use crate::record::WordRecord;
use crate::{SourceLoader, list_files, read_optional, vocab};

/// Loads `<root>/jsonl/*.jsonl`; the file stem names the category.
pub struct CuratedJsonlLoader;

impl SourceLoader for CuratedJsonlLoader {
    fn name(&self) -> &str {
        "curated-jsonl"
    }

    fn load(&self, root: &Path) -> Result<Vec<RawWordRow>> {
        let dir = root.join("jsonl");
        let mut rows = Vec::new();

        for path in list_files(&dir, "jsonl")? {
            let Some(content) = read_optional(&path)? else {
                continue;
            };
            let category = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("misc")
                .to_string();
            let parsed = parse_jsonl(&content, &category, &path.display().to_string())?;
            debug!(file = %path.display(), rows = parsed.len(), "loaded jsonl category");
            rows.extend(parsed);
        }

        Ok(rows)
    }
}

/// Parse one JSONL document. Records without `pos` take it from `category`.
pub(crate) fn parse_jsonl(content: &str, category: &str, source_name: &str) -> Result<Vec<RawWordRow>> {
    let source_id = format!("jsonl:{category}");
    let category_pos = vocab::parse_pos(category);
    let fallback = category_pos.known().map(|_| &category_pos);

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: WordRecord = serde_json::from_str(line)
            .map_err(|e| LexsyncError::parse(source_name, Some(idx + 1), e.to_string()))?;
        let row = record
            .into_row(&source_id, fallback)
            .map_err(|msg| LexsyncError::parse(source_name, Some(idx + 1), msg))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{PartOfSpeech, PosTag};

    #[test]
    fn category_supplies_pos() {
        let content = "{\"lemma\":\"Haus\",\"gender\":\"n\",\"plural\":\"Häuser\"}\n\n{\"lemma\":\"Tisch\",\"article\":\"der\"}\n";
        let rows = parse_jsonl(content, "nouns", "nouns.jsonl").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.pos == PosTag::Known(PartOfSpeech::Noun)));
        assert_eq!(rows[0].source_id, "jsonl:nouns");
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let content = "{\"lemma\":\"gehen\",\"pos\":\"V\"}\n{not json\n";
        let err = parse_jsonl(content, "verbs", "verbs.jsonl").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rows = CuratedJsonlLoader.load(dir.path()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn loads_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = dir.path().join("jsonl");
        std::fs::create_dir_all(&jsonl).unwrap();
        std::fs::write(jsonl.join("verbs.jsonl"), "{\"lemma\":\"gehen\"}\n").unwrap();
        std::fs::write(jsonl.join("adjectives.jsonl"), "{\"lemma\":\"gut\"}\n").unwrap();
        std::fs::write(jsonl.join("README.md"), "ignored").unwrap();

        let rows = CuratedJsonlLoader.load(dir.path()).unwrap();
        let lemmas: Vec<_> = rows.iter().map(|r| r.lemma.as_str()).collect();
        assert_eq!(lemmas, vec!["gut", "gehen"]);
    }
}
