//! Per-source attribution rollup.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use lexsync_shared::{AggregatedWord, AttributionEntry};

/// Catalog metadata for one source id.
struct SourceInfo {
    label: String,
    license: String,
    url: Option<String>,
    notes: Option<String>,
}

fn known_source(id: &str) -> Option<SourceInfo> {
    let (label, license, url, notes) = match id {
        "curated-jsonl" => (
            "Curated vocabulary lists",
            "CC BY-SA 4.0",
            None,
            Some("Hand-curated JSON Lines files, one per part of speech."),
        ),
        "manual-csv" => (
            "Manual word list",
            "Proprietary (internal)",
            None,
            Some("Editor-maintained legacy CSV."),
        ),
        "canonical-csv" => (
            "Canonical word list",
            "Proprietary (internal)",
            None,
            Some("Authoritative list of words approved for publication."),
        ),
        "community" => (
            "Community vocabulary",
            "CC BY-SA 4.0",
            Some("https://creativecommons.org/licenses/by-sa/4.0/"),
            None,
        ),
        _ => return None,
    };
    Some(SourceInfo {
        label: label.into(),
        license: license.into(),
        url: url.map(Into::into),
        notes: notes.map(Into::into),
    })
}

static PREFIXED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(enrichment|community|jsonl):([A-Za-z0-9][A-Za-z0-9._-]*)$")
        .expect("valid regex")
});

fn prefixed_source(id: &str) -> Option<SourceInfo> {
    let caps = PREFIXED_ID.captures(id)?;
    let name = caps.get(2)?.as_str();
    let info = match caps.get(1)?.as_str() {
        "enrichment" => SourceInfo {
            label: format!("Enrichment: {name}"),
            license: "Provider terms".into(),
            url: None,
            notes: Some("Machine-enriched; unapproved until reviewed.".into()),
        },
        "community" => SourceInfo {
            label: format!("Community vocabulary ({name})"),
            license: "CC BY-SA 4.0".into(),
            url: Some("https://creativecommons.org/licenses/by-sa/4.0/".into()),
            notes: None,
        },
        _ => SourceInfo {
            label: format!("Curated list: {name}"),
            license: "CC BY-SA 4.0".into(),
            url: None,
            notes: None,
        },
    };
    Some(info)
}

fn pending_source(id: &str) -> SourceInfo {
    warn!(source = id, "unknown attribution source");
    SourceInfo {
        label: id.to_string(),
        license: "pending review".into(),
        url: None,
        notes: Some("Source not in the attribution catalog.".into()),
    }
}

fn describe(id: &str) -> SourceInfo {
    known_source(id)
        .or_else(|| prefixed_source(id))
        .unwrap_or_else(|| pending_source(id))
}

/// Count contributed words and parts of speech per source, sorted by label.
pub fn summarize(words: &[AggregatedWord]) -> Vec<AttributionEntry> {
    let mut usage: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();
    for word in words {
        for source in &word.sources {
            let entry = usage.entry(source.as_str()).or_default();
            entry.0 += 1;
            entry.1.insert(word.pos.code());
        }
    }

    let mut entries: Vec<AttributionEntry> = usage
        .into_iter()
        .map(|(id, (count, pos))| {
            let info = describe(id);
            AttributionEntry {
                id: id.to_string(),
                label: info.label,
                license: info.license,
                url: info.url,
                notes: info.notes,
                lexeme_count: count,
                parts_of_speech: pos.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();

    entries.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::PartOfSpeech;

    fn word(lemma: &str, pos: PartOfSpeech, sources: &[&str]) -> AggregatedWord {
        AggregatedWord {
            lemma: lemma.into(),
            pos: pos.into(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            ..AggregatedWord::default()
        }
    }

    #[test]
    fn counts_and_pos_per_source() {
        let words = vec![
            word("Haus", PartOfSpeech::Noun, &["manual-csv", "community"]),
            word("gehen", PartOfSpeech::Verb, &["manual-csv"]),
            word("gut", PartOfSpeech::Adjective, &["enrichment:wiktionary"]),
        ];
        let entries = summarize(&words);
        assert_eq!(entries.len(), 3);

        let manual = entries.iter().find(|e| e.id == "manual-csv").unwrap();
        assert_eq!(manual.lexeme_count, 2);
        assert_eq!(manual.parts_of_speech, vec!["noun", "verb"]);

        let enrichment = entries.iter().find(|e| e.id == "enrichment:wiktionary").unwrap();
        assert_eq!(enrichment.label, "Enrichment: wiktionary");
    }

    #[test]
    fn sorted_by_label() {
        let words = vec![word(
            "x",
            PartOfSpeech::Particle,
            &["manual-csv", "community", "canonical-csv", "jsonl:verbs"],
        )];
        let labels: Vec<String> = summarize(&words).into_iter().map(|e| e.label).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }

    #[test]
    fn unknown_source_gets_placeholder() {
        let entries = summarize(&[word("x", PartOfSpeech::Particle, &["mystery feed"])]);
        assert_eq!(entries[0].license, "pending review");
        assert_eq!(entries[0].label, "mystery feed");
    }

    #[test]
    fn community_dataset_matches_prefix() {
        let entries = summarize(&[word("x", PartOfSpeech::Noun, &["community:goethe-a1"])]);
        assert_eq!(entries[0].label, "Community vocabulary (goethe-a1)");
        assert!(entries[0].url.is_some());
    }
}
