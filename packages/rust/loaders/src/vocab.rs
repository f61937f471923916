//! Normalization of source-specific vocabularies into the shared enums.
//!
//! Every loader funnels its POS tags, gender markers, auxiliaries and case
//! lists through these functions so merging compares like with like.

use lexsync_shared::{Auxiliary, Gender, GovernedCase, PartOfSpeech, PosTag};

/// Map a source POS label (STTS tags, German or English names, plurals
/// used as category names) onto a [`PosTag`].
pub fn parse_pos(raw: &str) -> PosTag {
    let key = raw.trim().trim_end_matches('.').to_lowercase();
    let pos = match key.as_str() {
        "v" | "vb" | "verb" | "verbs" | "verben" | "vvfin" | "vvinf" | "zeitwort" => {
            PartOfSpeech::Verb
        }
        "n" | "nn" | "noun" | "nouns" | "nomen" | "substantiv" | "substantive" | "subst" => {
            PartOfSpeech::Noun
        }
        "adj" | "adja" | "adjd" | "adjective" | "adjectives" | "adjektiv" | "adjektive" => {
            PartOfSpeech::Adjective
        }
        "adv" | "adverb" | "adverbs" | "adverbien" => PartOfSpeech::Adverb,
        "prep" | "appr" | "präp" | "praep" | "preposition" | "prepositions" | "präposition"
        | "praeposition" | "präpositionen" => PartOfSpeech::Preposition,
        "conj" | "kon" | "konj" | "conjunction" | "conjunctions" | "konjunktion" => {
            PartOfSpeech::Conjunction
        }
        "pron" | "pper" | "pronoun" | "pronouns" | "pronomen" => PartOfSpeech::Pronoun,
        "art" | "article" | "articles" | "artikel" => PartOfSpeech::Article,
        "num" | "card" | "numeral" | "numerals" | "zahlwort" => PartOfSpeech::Numeral,
        "itj" | "intj" | "interjection" | "interjections" | "interjektion" => {
            PartOfSpeech::Interjection
        }
        "ptk" | "part" | "particle" | "particles" | "partikel" => PartOfSpeech::Particle,
        _ => return PosTag::Unrecognized(key),
    };
    PosTag::Known(pos)
}

/// Gender from `m/f/n`, articles, or English/German names.
pub fn parse_gender(raw: &str) -> Option<Gender> {
    match raw.trim().trim_end_matches('.').to_lowercase().as_str() {
        "m" | "masc" | "masculine" | "maskulin" | "maskulinum" | "der" | "r" => {
            Some(Gender::Masculine)
        }
        "f" | "fem" | "feminine" | "feminin" | "femininum" | "die" | "e" => Some(Gender::Feminine),
        "n" | "nt" | "neut" | "neuter" | "neutrum" | "das" | "s" => Some(Gender::Neuter),
        _ => None,
    }
}

/// Perfect auxiliary from `haben`/`sein` and their common abbreviations.
pub fn parse_auxiliary(raw: &str) -> Option<Auxiliary> {
    match raw.trim().to_lowercase().as_str() {
        "haben" | "h" | "hat" => Some(Auxiliary::Haben),
        "sein" | "s" | "ist" => Some(Auxiliary::Sein),
        _ => None,
    }
}

/// Read the auxiliary off a perfect form such as `ist gegangen`.
pub fn auxiliary_from_perfekt(perfekt: &str) -> Option<Auxiliary> {
    match perfekt.split_whitespace().next()?.to_lowercase().as_str() {
        "hat" | "haben" => Some(Auxiliary::Haben),
        "ist" | "sein" => Some(Auxiliary::Sein),
        _ => None,
    }
}

/// Split a case list like `akk/dat`, `Dativ; Genitiv` or `acc+dat`.
///
/// Unknown tokens are dropped; duplicates keep their first position.
pub fn parse_cases(raw: &str) -> Vec<GovernedCase> {
    let mut cases = Vec::new();
    for token in raw.split(['/', ',', ';', '+', '|']) {
        let case = match token.trim().trim_end_matches('.').to_lowercase().as_str() {
            "nom" | "nominativ" | "nominative" => GovernedCase::Nominative,
            "akk" | "acc" | "akkusativ" | "accusative" => GovernedCase::Accusative,
            "dat" | "dativ" | "dative" => GovernedCase::Dative,
            "gen" | "genitiv" | "genitive" => GovernedCase::Genitive,
            _ => continue,
        };
        if !cases.contains(&case) {
            cases.push(case);
        }
    }
    cases
}

/// Split `a; b | c` into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([';', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Loose boolean used by spreadsheet exports (`x`, `ja`, `yes`, `1`).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "ja" | "x" => Some(true),
        "0" | "false" | "no" | "n" | "nein" => Some(false),
        _ => None,
    }
}

/// Trim and drop empty strings.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_synonyms() {
        assert_eq!(parse_pos("V"), PosTag::Known(PartOfSpeech::Verb));
        assert_eq!(parse_pos("Substantiv"), PosTag::Known(PartOfSpeech::Noun));
        assert_eq!(parse_pos("ADJ"), PosTag::Known(PartOfSpeech::Adjective));
        assert_eq!(parse_pos("APPR"), PosTag::Known(PartOfSpeech::Preposition));
        assert_eq!(parse_pos("Präposition"), PosTag::Known(PartOfSpeech::Preposition));
        assert_eq!(parse_pos("prepositions"), PosTag::Known(PartOfSpeech::Preposition));
        assert_eq!(parse_pos("adv."), PosTag::Known(PartOfSpeech::Adverb));
        assert_eq!(parse_pos(" Gerund "), PosTag::Unrecognized("gerund".into()));
    }

    #[test]
    fn gender_markers() {
        assert_eq!(parse_gender("der"), Some(Gender::Masculine));
        assert_eq!(parse_gender("F"), Some(Gender::Feminine));
        assert_eq!(parse_gender("neutrum"), Some(Gender::Neuter));
        assert_eq!(parse_gender("plural"), None);
    }

    #[test]
    fn auxiliaries() {
        assert_eq!(parse_auxiliary("Sein"), Some(Auxiliary::Sein));
        assert_eq!(parse_auxiliary("h"), Some(Auxiliary::Haben));
        assert_eq!(parse_auxiliary("werden"), None);
        assert_eq!(auxiliary_from_perfekt("ist gegangen"), Some(Auxiliary::Sein));
        assert_eq!(auxiliary_from_perfekt("hat gemacht"), Some(Auxiliary::Haben));
        assert_eq!(auxiliary_from_perfekt("gemacht"), None);
    }

    #[test]
    fn case_lists() {
        assert_eq!(
            parse_cases("akk/dat"),
            vec![GovernedCase::Accusative, GovernedCase::Dative]
        );
        assert_eq!(parse_cases("Dativ; dat"), vec![GovernedCase::Dative]);
        assert_eq!(parse_cases("Genitiv, whatever"), vec![GovernedCase::Genitive]);
        assert!(parse_cases("").is_empty());
    }

    #[test]
    fn lists_and_bools() {
        assert_eq!(split_list("to go; to walk | "), vec!["to go", "to walk"]);
        assert_eq!(parse_bool("Ja"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(clean(Some("  ".into())), None);
    }
}
