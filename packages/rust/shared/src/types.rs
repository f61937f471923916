//! Core domain types for the lexical database.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LexsyncError, Result};

/// Current schema version for content pack files.
pub const CURRENT_PACK_SCHEMA_VERSION: u32 = 1;

/// Language code used when none is configured.
pub const DEFAULT_LANGUAGE: &str = "de";

// ---------------------------------------------------------------------------
// Grammatical vocabularies
// ---------------------------------------------------------------------------

/// Closed set of supported parts of speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfSpeech {
    Verb,
    Noun,
    Adjective,
    Adverb,
    Preposition,
    Conjunction,
    Pronoun,
    Article,
    Numeral,
    Interjection,
    Particle,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 11] = [
        Self::Verb,
        Self::Noun,
        Self::Adjective,
        Self::Adverb,
        Self::Preposition,
        Self::Conjunction,
        Self::Pronoun,
        Self::Article,
        Self::Numeral,
        Self::Interjection,
        Self::Particle,
    ];

    /// Canonical lowercase code, used in keys, ids and storage.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Verb => "verb",
            Self::Noun => "noun",
            Self::Adjective => "adjective",
            Self::Adverb => "adverb",
            Self::Preposition => "preposition",
            Self::Conjunction => "conjunction",
            Self::Pronoun => "pronoun",
            Self::Article => "article",
            Self::Numeral => "numeral",
            Self::Interjection => "interjection",
            Self::Particle => "particle",
        }
    }

    /// Parse a canonical code. Source synonyms are handled by the loaders.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A part of speech as reported by a source, after synonym normalization.
///
/// Unrecognized tags are carried through merging so validation can report
/// them instead of silently dropping the word.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PosTag {
    Known(PartOfSpeech),
    Unrecognized(String),
}

impl PosTag {
    pub fn code(&self) -> &str {
        match self {
            Self::Known(pos) => pos.code(),
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }

    pub fn known(&self) -> Option<PartOfSpeech> {
        match self {
            Self::Known(pos) => Some(*pos),
            Self::Unrecognized(_) => None,
        }
    }
}

impl Default for PosTag {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<PartOfSpeech> for PosTag {
    fn from(pos: PartOfSpeech) -> Self {
        Self::Known(pos)
    }
}

impl From<String> for PosTag {
    fn from(code: String) -> Self {
        match PartOfSpeech::from_code(&code) {
            Some(pos) => Self::Known(pos),
            None => Self::Unrecognized(code),
        }
    }
}

impl From<PosTag> for String {
    fn from(tag: PosTag) -> Self {
        tag.code().to_string()
    }
}

impl fmt::Display for PosTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Grammatical gender of a noun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Masculine,
    Feminine,
    Neuter,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Masculine => "masculine",
            Self::Feminine => "feminine",
            Self::Neuter => "neuter",
        }
    }

    /// Nominative singular definite article.
    pub fn article(&self) -> &'static str {
        match self {
            Self::Masculine => "der",
            Self::Feminine => "die",
            Self::Neuter => "das",
        }
    }

    pub fn from_str_code(s: &str) -> Option<Self> {
        match s {
            "masculine" => Some(Self::Masculine),
            "feminine" => Some(Self::Feminine),
            "neuter" => Some(Self::Neuter),
            _ => None,
        }
    }
}

/// Perfect-tense auxiliary verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Auxiliary {
    Haben,
    Sein,
}

impl Auxiliary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Haben => "haben",
            Self::Sein => "sein",
        }
    }

    pub fn from_str_code(s: &str) -> Option<Self> {
        match s {
            "haben" => Some(Self::Haben),
            "sein" => Some(Self::Sein),
            _ => None,
        }
    }
}

/// Case governed by a preposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernedCase {
    Nominative,
    Accusative,
    Dative,
    Genitive,
}

impl GovernedCase {
    pub const ALL: [GovernedCase; 4] = [
        Self::Nominative,
        Self::Accusative,
        Self::Dative,
        Self::Genitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nominative => "nominative",
            Self::Accusative => "accusative",
            Self::Dative => "dative",
            Self::Genitive => "genitive",
        }
    }

    /// German case name shown to learners.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nominative => "Nominativ",
            Self::Accusative => "Akkusativ",
            Self::Dative => "Dativ",
            Self::Genitive => "Genitiv",
        }
    }

    pub fn from_str_code(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Common European Framework proficiency tier. Ordering is easiest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    /// Parse labels like `a1`, `A2`, ` B1.2 ` or `C1+`.
    pub fn parse(label: &str) -> Option<Self> {
        let upper = label.trim().to_ascii_uppercase();
        match upper.get(..2)? {
            "A1" => Some(Self::A1),
            "A2" => Some(Self::A2),
            "B1" => Some(Self::B1),
            "B2" => Some(Self::B2),
            "C1" => Some(Self::C1),
            "C2" => Some(Self::C2),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw and aggregated words
// ---------------------------------------------------------------------------

/// Where an enrichment-provider value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentProvenance {
    pub provider: String,
    pub enriched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Lexical attributes shared by raw rows and aggregated words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Auxiliary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub praesens_ich: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub praesens_er: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub praeteritum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partizip_ii: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perfekt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superlative: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<GovernedCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_rank: Option<u32>,
}

/// One source's view of a lemma + part of speech.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWordRow {
    /// Attribution id of the contributing source.
    pub source_id: String,
    pub lemma: String,
    pub pos: PosTag,
    #[serde(flatten)]
    pub fields: WordFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Row came from the canonical word list.
    #[serde(default)]
    pub canonical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentProvenance>,
}

impl RawWordRow {
    pub fn new(source_id: impl Into<String>, lemma: impl Into<String>, pos: impl Into<PosTag>) -> Self {
        Self {
            source_id: source_id.into(),
            lemma: lemma.into(),
            pos: pos.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        word_key(&self.lemma, &self.pos)
    }
}

/// Merge key: `lowercase(lemma)::pos`.
pub fn word_key(lemma: &str, pos: &PosTag) -> String {
    format!("{}::{}", lemma.trim().to_lowercase(), pos.code())
}

/// Canonical merged view of one (lemma, part of speech).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedWord {
    pub lemma: String,
    pub pos: PosTag,
    #[serde(flatten)]
    pub fields: WordFields,
    pub approved: bool,
    pub canonical: bool,
    /// Zero validation errors for this part of speech.
    pub complete: bool,
    /// Contributing source ids, in precedence order.
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentProvenance>,
}

impl AggregatedWord {
    pub fn key(&self) -> String {
        word_key(&self.lemma, &self.pos)
    }

    /// First translation, used as the learner-facing gloss.
    pub fn gloss(&self) -> Option<&str> {
        self.fields.translations.first().map(String::as_str)
    }

    pub fn primary_source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    pub fn cefr_level(&self) -> Option<CefrLevel> {
        self.fields.level.as_deref().and_then(CefrLevel::parse)
    }
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// Canonical lexeme identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexemeSeed {
    /// `{language}:{pos}:{slug}:{hash8}`.
    pub id: String,
    pub lemma: String,
    pub language: String,
    pub pos: PartOfSpeech,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Free-form metadata bag (level, gloss, examples, flags).
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_rank: Option<u32>,
    pub source_ids: Vec<String>,
    /// SHA-256 of the content fields above.
    pub checksum: String,
}

/// Sorted feature bag; ordering keeps hashes stable.
pub type Features = BTreeMap<String, String>;

/// One surface form of a lexeme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflectionSeed {
    pub id: String,
    pub lexeme_id: String,
    pub form: String,
    pub features: Features,
    /// SHA-256 of `(form, features)`.
    pub checksum: String,
    pub source_revision: String,
}

/// Renderer that displays a task to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Renderer {
    Cloze,
    MultipleChoice,
    FreeText,
}

impl Renderer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloze => "cloze",
            Self::MultipleChoice => "multiple_choice",
            Self::FreeText => "free_text",
        }
    }

    pub fn from_str_code(s: &str) -> Option<Self> {
        match s {
            "cloze" => Some(Self::Cloze),
            "multiple_choice" => Some(Self::MultipleChoice),
            "free_text" => Some(Self::FreeText),
            _ => None,
        }
    }
}

/// A generated practice task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpecSeed {
    pub id: String,
    pub lexeme_id: String,
    pub pos: PartOfSpeech,
    pub task_type: String,
    pub renderer: Renderer,
    pub prompt: serde_json::Value,
    pub solution: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    pub metadata: serde_json::Value,
    pub revision: u32,
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// Derived reporting and packs
// ---------------------------------------------------------------------------

/// Per-source attribution rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionEntry {
    pub id: String,
    pub label: String,
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub lexeme_count: usize,
    pub parts_of_speech: Vec<String>,
}

/// Descriptor of a versioned content pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPack {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub version: u32,
    pub checksum: String,
    pub lexeme_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Ordered membership of a lexeme in a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackLexeme {
    pub pack_id: String,
    pub lexeme_id: String,
    pub position: u32,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 (microseconds, `Z`) so string order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LexsyncError::validation(format!("invalid timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_codes_roundtrip() {
        for pos in PartOfSpeech::ALL {
            assert_eq!(PartOfSpeech::from_code(pos.code()), Some(pos));
        }
        assert_eq!(PartOfSpeech::from_code("V"), None);
    }

    #[test]
    fn pos_tag_serializes_as_code() {
        let json = serde_json::to_string(&PosTag::Known(PartOfSpeech::Verb)).unwrap();
        assert_eq!(json, "\"verb\"");

        let tag: PosTag = serde_json::from_str("\"gerund\"").unwrap();
        assert_eq!(tag, PosTag::Unrecognized("gerund".into()));
    }

    #[test]
    fn cefr_parsing_and_order() {
        assert_eq!(CefrLevel::parse(" a1 "), Some(CefrLevel::A1));
        assert_eq!(CefrLevel::parse("B1.2"), Some(CefrLevel::B1));
        assert_eq!(CefrLevel::parse("native"), None);
        assert_eq!(CefrLevel::parse("A"), None);
        assert!(CefrLevel::A2 < CefrLevel::B1);
    }

    #[test]
    fn word_key_lowercases_lemma() {
        let row = RawWordRow::new("manual-csv", "Haus", PartOfSpeech::Noun);
        assert_eq!(row.key(), "haus::noun");
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (sa, sb) = (format_timestamp(&a), format_timestamp(&b));
        assert_eq!(sa, "2024-05-01T10:00:00.000000Z");
        assert!(sa < sb);
        assert_eq!(parse_timestamp(&sb).unwrap(), b);
    }

    #[test]
    fn raw_row_flattens_fields() {
        let mut row = RawWordRow::new("curated-jsonl", "gehen", PartOfSpeech::Verb);
        row.fields.praeteritum = Some("ging".into());
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["praeteritum"], "ging");
        assert_eq!(json["pos"], "verb");
    }
}
