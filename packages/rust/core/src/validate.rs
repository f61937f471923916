//! Per-part-of-speech completeness rules.
//!
//! Each [`PartOfSpeech`] has one rule table: fields whose absence is an
//! error (the word cannot be seeded) and fields whose absence only warns.

use serde::Serialize;

use lexsync_shared::{AggregatedWord, PartOfSpeech, WordFields};

/// Outcome of validating one aggregated word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<&'static str>,
    pub warnings: Vec<&'static str>,
}

impl ValidationReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A checked attribute of [`WordFields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Praeteritum,
    PartizipIi,
    PraesensIch,
    PraesensEr,
    Perfekt,
    Gender,
    Plural,
    Comparative,
    Superlative,
    Cases,
    UsageNotes,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Self::Praeteritum => "praeteritum",
            Self::PartizipIi => "partizip_ii",
            Self::PraesensIch => "praesens_ich",
            Self::PraesensEr => "praesens_er",
            Self::Perfekt => "perfekt",
            Self::Gender => "gender",
            Self::Plural => "plural",
            Self::Comparative => "comparative",
            Self::Superlative => "superlative",
            Self::Cases => "cases",
            Self::UsageNotes => "usage_notes",
        }
    }

    fn present(self, f: &WordFields) -> bool {
        match self {
            Self::Praeteritum => filled(&f.praeteritum),
            Self::PartizipIi => filled(&f.partizip_ii),
            Self::PraesensIch => filled(&f.praesens_ich),
            Self::PraesensEr => filled(&f.praesens_er),
            Self::Perfekt => filled(&f.perfekt),
            Self::Gender => f.gender.is_some(),
            Self::Plural => filled(&f.plural),
            Self::Comparative => filled(&f.comparative),
            Self::Superlative => filled(&f.superlative),
            Self::Cases => !f.cases.is_empty(),
            Self::UsageNotes => filled(&f.usage_notes),
        }
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

struct RuleTable {
    required: &'static [Field],
    recommended: &'static [Field],
}

const VERB: RuleTable = RuleTable {
    required: &[Field::Praeteritum, Field::PartizipIi],
    recommended: &[Field::PraesensIch, Field::PraesensEr, Field::Perfekt],
};

const NOUN: RuleTable = RuleTable {
    required: &[Field::Gender],
    recommended: &[Field::Plural],
};

const ADJECTIVE: RuleTable = RuleTable {
    required: &[Field::Comparative, Field::Superlative],
    recommended: &[],
};

const PREPOSITION: RuleTable = RuleTable {
    required: &[],
    recommended: &[Field::Cases, Field::UsageNotes],
};

const UNCHECKED: RuleTable = RuleTable {
    required: &[],
    recommended: &[],
};

fn rules_for(pos: PartOfSpeech) -> &'static RuleTable {
    match pos {
        PartOfSpeech::Verb => &VERB,
        PartOfSpeech::Noun => &NOUN,
        PartOfSpeech::Adjective => &ADJECTIVE,
        PartOfSpeech::Preposition => &PREPOSITION,
        PartOfSpeech::Adverb
        | PartOfSpeech::Conjunction
        | PartOfSpeech::Pronoun
        | PartOfSpeech::Article
        | PartOfSpeech::Numeral
        | PartOfSpeech::Interjection
        | PartOfSpeech::Particle => &UNCHECKED,
    }
}

/// Check a word against the rule table of its part of speech.
pub fn validate_word(word: &AggregatedWord) -> ValidationReport {
    let Some(pos) = word.pos.known() else {
        return ValidationReport {
            errors: vec!["pos"],
            warnings: Vec::new(),
        };
    };

    let rules = rules_for(pos);
    ValidationReport {
        errors: missing(rules.required, &word.fields),
        warnings: missing(rules.recommended, &word.fields),
    }
}

fn missing(fields: &[Field], values: &WordFields) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|f| !f.present(values))
        .map(|f| f.name())
        .collect()
}

/// Review-state warnings. These never affect completeness.
pub fn approval_warnings(word: &AggregatedWord) -> Vec<&'static str> {
    if word.approved {
        Vec::new()
    } else {
        vec!["approval_pending"]
    }
}
