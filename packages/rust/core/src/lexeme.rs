//! Lexeme identity and inflection expansion.
//!
//! Ids are content-derived so repeated runs over the same sources produce
//! the same rows:
//! - lexeme: `{language}:{pos}:{slug}:{hash8}` with
//!   `hash8 = sha256("{pos}:{slug}:{primary_source}")[..8]`
//! - inflection: first 16 hex of the SHA-256 over `{lexemeId, features, form}`

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Value, json};

use lexsync_shared::{
    AggregatedWord, Auxiliary, Features, Gender, GovernedCase, InflectionSeed, LexemeSeed,
    LexsyncError, PartOfSpeech, Result, checksum_json, short_hash, slugify,
};

/// Source id used when a word carries no attribution.
const UNATTRIBUTED_SOURCE: &str = "unattributed";

/// Settings stamped on every built lexeme.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub language: String,
    pub source_revision: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            language: lexsync_shared::DEFAULT_LANGUAGE.into(),
            source_revision: "seed-v1".into(),
        }
    }
}

/// Deterministic lexeme id for a lemma, part of speech and primary source.
pub fn lexeme_id(language: &str, pos: PartOfSpeech, lemma: &str, primary_source: &str) -> String {
    let slug = slugify(lemma);
    let hash = short_hash(&format!("{}:{slug}:{primary_source}", pos.code()), 8);
    format!("{language}:{}:{slug}:{hash}", pos.code())
}

/// Build the lexeme row and its inflections for one complete word.
///
/// Fails with [`LexsyncError::UnsupportedPos`] when the part of speech was
/// never recognized.
pub fn build_lexeme(
    word: &AggregatedWord,
    options: &BuildOptions,
) -> Result<(LexemeSeed, Vec<InflectionSeed>)> {
    let pos = word.pos.known().ok_or_else(|| LexsyncError::UnsupportedPos {
        lemma: word.lemma.clone(),
        pos: word.pos.code().to_string(),
    })?;

    let primary = word.primary_source().unwrap_or(UNATTRIBUTED_SOURCE);
    let id = lexeme_id(&options.language, pos, &word.lemma, primary);

    let mut lexeme = LexemeSeed {
        id,
        lemma: word.lemma.clone(),
        language: options.language.clone(),
        pos,
        gender: (pos == PartOfSpeech::Noun).then_some(word.fields.gender).flatten(),
        metadata: lexeme_metadata(word),
        frequency_rank: word.fields.frequency_rank,
        source_ids: word.sources.clone(),
        checksum: String::new(),
    };
    lexeme.checksum = lexeme_checksum(&lexeme);

    let inflections = build_inflections(&lexeme.id, pos, word, &options.source_revision);
    Ok((lexeme, inflections))
}

fn lexeme_metadata(word: &AggregatedWord) -> Value {
    let f = &word.fields;
    let mut meta = json!({
        "approved": word.approved,
        "canonical": word.canonical,
        "translations": f.translations,
        "examples": f.examples,
    });
    if let Some(level) = &f.level {
        meta["level"] = json!(level);
    }
    if let Some(gloss) = word.gloss() {
        meta["gloss"] = json!(gloss);
    }
    if let Some(separable) = f.separable {
        meta["separable"] = json!(separable);
    }
    if let Some(notes) = &f.usage_notes {
        meta["usageNotes"] = json!(notes);
    }
    if let Some(enrichment) = &word.enrichment {
        meta["enrichment"] = json!({
            "provider": enrichment.provider,
            "model": enrichment.model,
        });
    }
    meta
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LexemeContent<'a> {
    id: &'a str,
    lemma: &'a str,
    language: &'a str,
    pos: &'a str,
    gender: Option<&'a str>,
    metadata: &'a Value,
    frequency_rank: Option<u32>,
    source_ids: &'a [String],
}

fn lexeme_checksum(lexeme: &LexemeSeed) -> String {
    checksum_json(&LexemeContent {
        id: &lexeme.id,
        lemma: &lexeme.lemma,
        language: &lexeme.language,
        pos: lexeme.pos.code(),
        gender: lexeme.gender.map(|g| g.as_str()),
        metadata: &lexeme.metadata,
        frequency_rank: lexeme.frequency_rank,
        source_ids: &lexeme.source_ids,
    })
}

// ---------------------------------------------------------------------------
// Inflections
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InflectionKey<'a> {
    lexeme_id: &'a str,
    features: &'a Features,
    form: &'a str,
}

#[derive(Serialize)]
struct InflectionContent<'a> {
    form: &'a str,
    features: &'a Features,
}

fn features(pairs: &[(&str, &str)]) -> Features {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn build_inflections(
    lexeme_id: &str,
    pos: PartOfSpeech,
    word: &AggregatedWord,
    source_revision: &str,
) -> Vec<InflectionSeed> {
    let f = &word.fields;
    let mut forms: Vec<(String, Features)> = Vec::new();
    let mut push = |form: Option<&String>, feats: Features| {
        if let Some(form) = form.map(|s| s.trim()).filter(|s| !s.is_empty()) {
            forms.push((form.to_string(), feats));
        }
    };

    match pos {
        PartOfSpeech::Verb => {
            let aux = f.auxiliary.map(|a| a.as_str());
            push(Some(&word.lemma), features(&[("mood", "infinitive")]));
            push(
                f.praesens_ich.as_ref(),
                features(&[("tense", "present"), ("person", "1"), ("number", "singular")]),
            );
            push(
                f.praesens_er.as_ref(),
                features(&[("tense", "present"), ("person", "3"), ("number", "singular")]),
            );
            push(
                f.praeteritum.as_ref(),
                features(&[("tense", "past"), ("person", "3"), ("number", "singular")]),
            );
            let mut participle = features(&[("mood", "participle"), ("tense", "past")]);
            let mut perfect = features(&[("tense", "perfect"), ("person", "3"), ("number", "singular")]);
            if let Some(aux) = aux {
                participle.insert("aux".into(), aux.into());
                perfect.insert("aux".into(), aux.into());
            }
            push(f.partizip_ii.as_ref(), participle);
            push(f.perfekt.as_ref(), perfect);
        }
        PartOfSpeech::Noun => {
            let gender = f.gender.map(|g| g.as_str());
            let mut singular = features(&[("number", "singular"), ("case", "nominative")]);
            let mut plural = features(&[("number", "plural"), ("case", "nominative")]);
            if let Some(gender) = gender {
                singular.insert("gender".into(), gender.into());
                plural.insert("gender".into(), gender.into());
            }
            push(Some(&word.lemma), singular);
            push(f.plural.as_ref(), plural);
        }
        PartOfSpeech::Adjective | PartOfSpeech::Adverb => {
            push(Some(&word.lemma), features(&[("degree", "positive")]));
            push(f.comparative.as_ref(), features(&[("degree", "comparative")]));
            push(f.superlative.as_ref(), features(&[("degree", "superlative")]));
        }
        PartOfSpeech::Preposition => {
            let mut feats = Features::new();
            if !f.cases.is_empty() {
                let cases: Vec<&str> = f.cases.iter().map(|c| c.as_str()).collect();
                feats.insert("cases".into(), cases.join("/"));
            }
            push(Some(&word.lemma), feats);
        }
        PartOfSpeech::Conjunction
        | PartOfSpeech::Pronoun
        | PartOfSpeech::Article
        | PartOfSpeech::Numeral
        | PartOfSpeech::Interjection
        | PartOfSpeech::Particle => {
            push(Some(&word.lemma), Features::new());
        }
    }

    let mut seen = BTreeSet::new();
    forms
        .into_iter()
        .filter_map(|(form, features)| {
            let mut id = checksum_json(&InflectionKey {
                lexeme_id,
                features: &features,
                form: &form,
            });
            id.truncate(16);
            if !seen.insert(id.clone()) {
                return None;
            }
            let checksum = checksum_json(&InflectionContent {
                form: &form,
                features: &features,
            });
            Some(InflectionSeed {
                id,
                lexeme_id: lexeme_id.to_string(),
                form,
                features,
                checksum,
                source_revision: source_revision.to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reverse mapping
// ---------------------------------------------------------------------------

/// Rebuild the aggregated view of a persisted lexeme from its row and
/// inflections. Used to regenerate tasks without re-reading sources.
pub fn word_from_persisted(lexeme: &LexemeSeed, inflections: &[InflectionSeed]) -> AggregatedWord {
    let meta = &lexeme.metadata;
    let strings = |key: &str| -> Vec<String> {
        meta.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let string = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);

    let mut word = AggregatedWord {
        lemma: lexeme.lemma.clone(),
        pos: lexeme.pos.into(),
        approved: meta.get("approved").and_then(Value::as_bool).unwrap_or(false),
        canonical: meta.get("canonical").and_then(Value::as_bool).unwrap_or(false),
        complete: true,
        sources: lexeme.source_ids.clone(),
        ..AggregatedWord::default()
    };

    let f = &mut word.fields;
    f.level = string("level");
    f.translations = strings("translations");
    f.examples = strings("examples");
    f.usage_notes = string("usageNotes");
    f.separable = meta.get("separable").and_then(Value::as_bool);
    f.frequency_rank = lexeme.frequency_rank;
    f.gender = lexeme.gender;

    for inflection in inflections {
        let feat = |key: &str| inflection.features.get(key).map(String::as_str);
        let form = Some(inflection.form.clone());

        if let Some(aux) = feat("aux").and_then(Auxiliary::from_str_code) {
            f.auxiliary = Some(aux);
        }
        if f.gender.is_none() {
            f.gender = feat("gender").and_then(Gender::from_str_code);
        }

        match (feat("mood"), feat("tense"), feat("person"), feat("number"), feat("degree")) {
            (Some("participle"), ..) => f.partizip_ii = form,
            (_, Some("present"), Some("1"), ..) => f.praesens_ich = form,
            (_, Some("present"), Some("3"), ..) => f.praesens_er = form,
            (_, Some("past"), Some("3"), ..) => f.praeteritum = form,
            (_, Some("perfect"), ..) => f.perfekt = form,
            (_, _, _, Some("plural"), _) => f.plural = form,
            (.., Some("comparative")) => f.comparative = form,
            (.., Some("superlative")) => f.superlative = form,
            _ => {}
        }

        if let Some(cases) = feat("cases") {
            f.cases = cases.split('/').filter_map(GovernedCase::from_str_code).collect();
        }
    }

    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::PosTag;

    fn gehen() -> AggregatedWord {
        let mut w = AggregatedWord {
            lemma: "gehen".into(),
            pos: PartOfSpeech::Verb.into(),
            approved: true,
            complete: true,
            sources: vec!["curated-jsonl".into(), "manual-csv".into()],
            ..AggregatedWord::default()
        };
        w.fields.level = Some("A1".into());
        w.fields.translations = vec!["to go".into(), "to walk".into()];
        w.fields.praesens_ich = Some("gehe".into());
        w.fields.praesens_er = Some("geht".into());
        w.fields.praeteritum = Some("ging".into());
        w.fields.partizip_ii = Some("gegangen".into());
        w.fields.perfekt = Some("ist gegangen".into());
        w.fields.auxiliary = Some(Auxiliary::Sein);
        w
    }

    #[test]
    fn lexeme_id_shape() {
        let (lexeme, _) = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        let parts: Vec<&str> = lexeme.id.split(':').collect();
        assert_eq!(&parts[..3], &["de", "verb", "gehen"]);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(lexeme.id, lexeme_id("de", PartOfSpeech::Verb, "gehen", "curated-jsonl"));
    }

    #[test]
    fn ids_are_deterministic() {
        let a = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        let b = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn primary_source_changes_identity() {
        let mut other = gehen();
        other.sources.reverse();
        let (a, _) = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        let (b, _) = build_lexeme(&other, &BuildOptions::default()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn verb_inflections_carry_aux() {
        let (_, inflections) = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        assert_eq!(inflections.len(), 6);
        let perfekt = inflections.iter().find(|i| i.form == "ist gegangen").unwrap();
        assert_eq!(perfekt.features.get("aux").map(String::as_str), Some("sein"));
        assert!(inflections.iter().all(|i| i.id.len() == 16));
        assert!(inflections.iter().all(|i| i.source_revision == "seed-v1"));
    }

    #[test]
    fn noun_inflections_and_slug() {
        let mut w = AggregatedWord {
            lemma: "Straße".into(),
            pos: PartOfSpeech::Noun.into(),
            sources: vec!["manual-csv".into()],
            ..AggregatedWord::default()
        };
        w.fields.gender = Some(Gender::Feminine);
        w.fields.plural = Some("Straßen".into());

        let (lexeme, inflections) = build_lexeme(&w, &BuildOptions::default()).unwrap();
        assert!(lexeme.id.starts_with("de:noun:strasse:"));
        assert_eq!(inflections.len(), 2);
        assert!(inflections
            .iter()
            .all(|i| i.features.get("gender").map(String::as_str) == Some("feminine")));
    }

    #[test]
    fn gender_is_kept_for_nouns_only() {
        let mut w = gehen();
        w.lemma = "laufen".into();
        w.fields.gender = Some(Gender::Neuter);
        let (lexeme, inflections) = build_lexeme(&w, &BuildOptions::default()).unwrap();
        assert_eq!(lexeme.gender, None);
        assert!(inflections.iter().all(|i| !i.features.contains_key("gender")));

        let mut plain = gehen();
        plain.lemma = "laufen".into();
        let (without, _) = build_lexeme(&plain, &BuildOptions::default()).unwrap();
        assert_eq!(lexeme.checksum, without.checksum);
    }

    #[test]
    fn other_pos_yields_bare_lemma() {
        let mut w = AggregatedWord {
            lemma: "gut".into(),
            pos: PartOfSpeech::Conjunction.into(),
            ..AggregatedWord::default()
        };
        w.fields.comparative = Some("besser".into());
        let (_, inflections) = build_lexeme(&w, &BuildOptions::default()).unwrap();
        assert_eq!(inflections.len(), 1);
        assert!(inflections[0].features.is_empty());
    }

    #[test]
    fn unrecognized_pos_is_fatal() {
        let w = AggregatedWord {
            lemma: "foo".into(),
            pos: PosTag::Unrecognized("gerund".into()),
            ..AggregatedWord::default()
        };
        let err = build_lexeme(&w, &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, LexsyncError::UnsupportedPos { .. }));
    }

    #[test]
    fn checksum_tracks_content() {
        let (a, _) = build_lexeme(&gehen(), &BuildOptions::default()).unwrap();
        let mut changed = gehen();
        changed.fields.translations.push("to leave".into());
        let (b, _) = build_lexeme(&changed, &BuildOptions::default()).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.checksum, b.checksum);
    }

    #[test]
    fn persisted_roundtrip_restores_task_fields() {
        let original = gehen();
        let (lexeme, inflections) = build_lexeme(&original, &BuildOptions::default()).unwrap();
        let restored = word_from_persisted(&lexeme, &inflections);

        assert_eq!(restored.fields.praeteritum, original.fields.praeteritum);
        assert_eq!(restored.fields.partizip_ii, original.fields.partizip_ii);
        assert_eq!(restored.fields.praesens_ich, original.fields.praesens_ich);
        assert_eq!(restored.fields.praesens_er, original.fields.praesens_er);
        assert_eq!(restored.fields.perfekt, original.fields.perfekt);
        assert_eq!(restored.fields.auxiliary, Some(Auxiliary::Sein));
        assert_eq!(restored.fields.translations, original.fields.translations);
        assert_eq!(restored.fields.level.as_deref(), Some("A1"));
        assert_eq!(restored.sources, original.sources);
    }

    #[test]
    fn persisted_preposition_restores_cases() {
        let mut w = AggregatedWord {
            lemma: "in".into(),
            pos: PartOfSpeech::Preposition.into(),
            sources: vec!["manual-csv".into()],
            ..AggregatedWord::default()
        };
        w.fields.cases = vec![GovernedCase::Accusative, GovernedCase::Dative];
        let (lexeme, inflections) = build_lexeme(&w, &BuildOptions::default()).unwrap();
        let restored = word_from_persisted(&lexeme, &inflections);
        assert_eq!(restored.fields.cases, w.fields.cases);
    }
}
