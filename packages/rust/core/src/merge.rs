//! Merge loader batches into one [`AggregatedWord`] per `(lemma, pos)`.
//!
//! Batches arrive in loader precedence order. Scalars keep the first
//! non-empty value, list fields union, CEFR prefers the easier recognized
//! level and enrichment keeps the newest provenance.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use lexsync_loaders::LoadedBatch;
use lexsync_shared::{AggregatedWord, CefrLevel, RawWordRow, normalize_text};

use crate::validate::validate_word;

struct Accumulator {
    word: AggregatedWord,
    approved: Option<bool>,
}

/// Merge every row of `batches`, then mark completeness.
///
/// A word is canonical when any of its rows came from a canonical source.
pub fn merge_batches(batches: &[LoadedBatch]) -> BTreeMap<String, AggregatedWord> {
    let mut acc: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut dropped = 0usize;

    for batch in batches {
        for row in &batch.rows {
            if row.lemma.trim().is_empty() {
                dropped += 1;
                continue;
            }
            let key = row.key();
            match acc.get_mut(&key) {
                Some(existing) => merge_row(existing, row),
                None => {
                    acc.insert(key, start(row));
                }
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, "rows with empty lemma dropped");
    }

    acc.into_iter()
        .map(|(key, Accumulator { mut word, approved })| {
            word.approved = approved.unwrap_or(false);
            word.complete = validate_word(&word).is_complete();
            debug!(%key, sources = word.sources.len(), complete = word.complete, "merged word");
            (key, word)
        })
        .collect()
}

fn start(row: &RawWordRow) -> Accumulator {
    let word = AggregatedWord {
        lemma: row.lemma.trim().to_string(),
        pos: row.pos.clone(),
        ..AggregatedWord::default()
    };
    let mut acc = Accumulator {
        word,
        approved: None,
    };
    merge_row(&mut acc, row);
    acc
}

fn merge_row(acc: &mut Accumulator, row: &RawWordRow) {
    let word = &mut acc.word;
    let target = &mut word.fields;
    let incoming = &row.fields;

    fill(&mut target.gender, &incoming.gender);
    fill(&mut target.plural, &incoming.plural);
    fill(&mut target.auxiliary, &incoming.auxiliary);
    fill(&mut target.separable, &incoming.separable);
    fill(&mut target.praesens_ich, &incoming.praesens_ich);
    fill(&mut target.praesens_er, &incoming.praesens_er);
    fill(&mut target.praeteritum, &incoming.praeteritum);
    fill(&mut target.partizip_ii, &incoming.partizip_ii);
    fill(&mut target.perfekt, &incoming.perfekt);
    fill(&mut target.comparative, &incoming.comparative);
    fill(&mut target.superlative, &incoming.superlative);
    fill(&mut target.usage_notes, &incoming.usage_notes);
    fill(&mut target.frequency_rank, &incoming.frequency_rank);
    fill(&mut acc.approved, &row.approved);

    target.level = merge_level(target.level.take(), incoming.level.as_deref());
    union_text(&mut target.translations, &incoming.translations);
    union_text(&mut target.examples, &incoming.examples);
    for case in &incoming.cases {
        if !target.cases.contains(case) {
            target.cases.push(*case);
        }
    }

    if !word.sources.iter().any(|s| s == &row.source_id) {
        word.sources.push(row.source_id.clone());
    }
    word.canonical |= row.canonical;

    if let Some(incoming) = &row.enrichment {
        let newer = word
            .enrichment
            .as_ref()
            .is_none_or(|current| incoming.enriched_at > current.enriched_at);
        if newer {
            word.enrichment = Some(incoming.clone());
        }
    }
}

fn fill<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if target.is_none() {
        target.clone_from(incoming);
    }
}

/// Easier recognized level wins; an unrecognized label never overrides.
fn merge_level(current: Option<String>, incoming: Option<&str>) -> Option<String> {
    let Some(incoming) = incoming.map(str::trim).filter(|l| !l.is_empty()) else {
        return current;
    };
    let Some(current) = current else {
        return Some(incoming.to_string());
    };

    match (
        CefrLevel::parse(&current),
        CefrLevel::parse(incoming),
    ) {
        (Some(a), Some(b)) => Some(a.min(b).as_str().to_string()),
        (None, Some(b)) => Some(b.as_str().to_string()),
        (Some(a), None) => Some(a.as_str().to_string()),
        (None, None) => Some(current),
    }
}

fn union_text(target: &mut Vec<String>, incoming: &[String]) {
    let mut seen: BTreeSet<String> = target.iter().map(|t| normalize_text(t)).collect();
    for value in incoming {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(normalize_text(trimmed)) {
            target.push(trimmed.to_string());
        }
    }
}
