//! JSON record shape shared by the curated JSONL files and enrichment snapshots.

use serde::Deserialize;

use lexsync_shared::{PosTag, RawWordRow, WordFields};

use crate::vocab::{self, clean};

/// A single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vocab::split_list(&s),
            Self::Many(items) => items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// camelCase word record as written by content editors and providers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WordRecord {
    pub lemma: Option<String>,
    pub pos: Option<String>,
    pub level: Option<String>,
    pub english: Option<OneOrMany>,
    pub translations: Option<OneOrMany>,
    pub examples: Option<OneOrMany>,
    pub gender: Option<String>,
    pub article: Option<String>,
    pub plural: Option<String>,
    pub aux: Option<String>,
    pub separable: Option<bool>,
    pub praesens_ich: Option<String>,
    pub praesens_er: Option<String>,
    pub praeteritum: Option<String>,
    pub partizip_ii: Option<String>,
    pub perfekt: Option<String>,
    pub comparative: Option<String>,
    pub superlative: Option<String>,
    pub cases: Option<OneOrMany>,
    pub notes: Option<String>,
    pub approved: Option<bool>,
    pub frequency_rank: Option<u32>,
}

impl WordRecord {
    /// Convert into a [`RawWordRow`]. `fallback_pos` applies when the record
    /// has no `pos` of its own (e.g. the category named by the file).
    pub(crate) fn into_row(
        self,
        source_id: &str,
        fallback_pos: Option<&PosTag>,
    ) -> std::result::Result<RawWordRow, String> {
        let lemma = clean(self.lemma).ok_or("record has no lemma")?;
        let pos = match clean(self.pos) {
            Some(raw) => vocab::parse_pos(&raw),
            None => fallback_pos
                .cloned()
                .ok_or_else(|| format!("record '{lemma}' has no pos"))?,
        };

        let mut translations = Vec::new();
        for list in [self.english, self.translations].into_iter().flatten() {
            translations.extend(list.into_vec());
        }

        let perfekt = clean(self.perfekt);
        let auxiliary = clean(self.aux)
            .and_then(|a| vocab::parse_auxiliary(&a))
            .or_else(|| perfekt.as_deref().and_then(vocab::auxiliary_from_perfekt));

        let gender = clean(self.gender)
            .or(clean(self.article))
            .and_then(|g| vocab::parse_gender(&g));

        let cases = self
            .cases
            .map(|c| c.into_vec().join("/"))
            .map(|joined| vocab::parse_cases(&joined))
            .unwrap_or_default();

        Ok(RawWordRow {
            source_id: source_id.to_string(),
            lemma,
            pos,
            fields: WordFields {
                level: clean(self.level),
                translations,
                examples: self.examples.map(OneOrMany::into_vec).unwrap_or_default(),
                gender,
                plural: clean(self.plural),
                auxiliary,
                separable: self.separable,
                praesens_ich: clean(self.praesens_ich),
                praesens_er: clean(self.praesens_er),
                praeteritum: clean(self.praeteritum),
                partizip_ii: clean(self.partizip_ii),
                perfekt,
                comparative: clean(self.comparative),
                superlative: clean(self.superlative),
                cases,
                usage_notes: clean(self.notes),
                frequency_rank: self.frequency_rank,
            },
            approved: self.approved,
            canonical: false,
            enrichment: None,
        })
    }
}
