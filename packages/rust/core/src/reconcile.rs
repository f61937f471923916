//! Reconcile generated seeds with the database.
//!
//! Upserts run parents first (lexemes, inflections, tasks); stale rows are
//! removed children first (tasks, inflections, lexemes) so foreign keys
//! hold at every batch boundary.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, instrument};

use lexsync_shared::{AggregatedWord, InflectionSeed, LexemeSeed, Result, TaskSpecSeed};
use lexsync_storage::{BatchOptions, Entity, Storage};

/// Everything one seed run produced.
#[derive(Debug, Clone, Default)]
pub struct SeedSet {
    pub words: Vec<AggregatedWord>,
    pub lexemes: Vec<LexemeSeed>,
    pub inflections: Vec<InflectionSeed>,
    pub tasks: Vec<TaskSpecSeed>,
}

/// Rows written and removed per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub words_written: u64,
    pub words_removed: u64,
    pub lexemes_written: u64,
    pub lexemes_removed: u64,
    pub inflections_written: u64,
    pub inflections_removed: u64,
    pub tasks_written: u64,
    pub tasks_removed: u64,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Ids present in `existing` but absent from `incoming`.
pub(crate) fn stale_ids<'a>(
    existing: Vec<String>,
    incoming: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let keep: HashSet<&str> = incoming.into_iter().collect();
    existing
        .into_iter()
        .filter(|id| !keep.contains(id.as_str()))
        .collect()
}

/// Bring storage in line with `seeds`.
#[instrument(skip_all, fields(
    words = seeds.words.len(),
    lexemes = seeds.lexemes.len(),
    tasks = seeds.tasks.len(),
))]
pub async fn reconcile(
    storage: &Storage,
    seeds: &SeedSet,
    options: &BatchOptions,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    // Flat words table.
    report.words_written = storage.upsert_words(&seeds.words, options).await?;
    let incoming_keys: HashSet<(&str, &str)> = seeds
        .words
        .iter()
        .map(|w| (w.lemma.as_str(), w.pos.code()))
        .collect();
    let stale_words: Vec<(String, String)> = storage
        .word_keys()
        .await?
        .into_iter()
        .filter(|(lemma, pos)| !incoming_keys.contains(&(lemma.as_str(), pos.as_str())))
        .collect();
    report.words_removed = storage.delete_words(&stale_words, options).await?;

    // Upserts, parents first.
    report.lexemes_written = storage.upsert_lexemes(&seeds.lexemes, options).await?;
    report.inflections_written = storage
        .upsert_inflections(&seeds.inflections, options)
        .await?;
    report.tasks_written = storage.upsert_tasks(&seeds.tasks, false, options).await?;

    // Deletes, children first.
    let stale_tasks = stale_ids(
        storage.list_ids(Entity::TaskSpec).await?,
        seeds.tasks.iter().map(|t| t.id.as_str()),
    );
    report.tasks_removed = storage
        .delete_ids(Entity::TaskSpec, &stale_tasks, options)
        .await?;

    let stale_inflections = stale_ids(
        storage.list_ids(Entity::Inflection).await?,
        seeds.inflections.iter().map(|i| i.id.as_str()),
    );
    report.inflections_removed = storage
        .delete_ids(Entity::Inflection, &stale_inflections, options)
        .await?;

    let stale_lexemes = stale_ids(
        storage.list_ids(Entity::Lexeme).await?,
        seeds.lexemes.iter().map(|l| l.id.as_str()),
    );
    report.lexemes_removed = storage
        .delete_ids(Entity::Lexeme, &stale_lexemes, options)
        .await?;

    info!(
        lexemes_written = report.lexemes_written,
        lexemes_removed = report.lexemes_removed,
        inflections_written = report.inflections_written,
        inflections_removed = report.inflections_removed,
        tasks_written = report.tasks_written,
        tasks_removed = report.tasks_removed,
        "reconciliation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{Auxiliary, LexsyncError, PartOfSpeech};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::lexeme::{BuildOptions, build_lexeme};
    use crate::templates::generate_tasks;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lexsync_reconcile_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn verb(lemma: &str, past: &str, participle: &str) -> AggregatedWord {
        let mut w = AggregatedWord {
            lemma: lemma.into(),
            pos: PartOfSpeech::Verb.into(),
            complete: true,
            sources: vec!["curated-jsonl".into()],
            ..AggregatedWord::default()
        };
        w.fields.praeteritum = Some(past.into());
        w.fields.partizip_ii = Some(participle.into());
        w.fields.auxiliary = Some(Auxiliary::Haben);
        w
    }

    fn seed_set(words: Vec<AggregatedWord>) -> SeedSet {
        let mut set = SeedSet::default();
        for word in &words {
            let (lexeme, inflections) = build_lexeme(word, &BuildOptions::default()).unwrap();
            set.tasks.extend(generate_tasks(word, &lexeme.id).unwrap());
            set.inflections.extend(inflections);
            set.lexemes.push(lexeme);
        }
        set.words = words;
        set
    }

    #[test]
    fn stale_ids_are_set_difference() {
        let stale = stale_ids(
            vec!["a".into(), "b".into(), "c".into()],
            ["b", "d"],
        );
        assert_eq!(stale, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        let seeds = seed_set(vec![verb("machen", "machte", "gemacht")]);

        let first = reconcile(&storage, &seeds, &opts).await.unwrap();
        assert_eq!(first.lexemes_written, 1);
        assert!(first.tasks_written >= 3);

        let second = reconcile(&storage, &seeds, &opts).await.unwrap();
        assert!(second.is_noop(), "{second:?}");
    }

    #[tokio::test]
    async fn removed_word_is_cleaned_up() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        let both = seed_set(vec![
            verb("machen", "machte", "gemacht"),
            verb("sagen", "sagte", "gesagt"),
        ]);
        reconcile(&storage, &both, &opts).await.unwrap();

        let only_one = seed_set(vec![verb("machen", "machte", "gemacht")]);
        let report = reconcile(&storage, &only_one, &opts).await.unwrap();
        assert_eq!(report.lexemes_removed, 1);
        assert_eq!(report.words_removed, 1);
        assert!(report.tasks_removed > 0);

        assert_eq!(storage.count(Entity::Lexeme).await.unwrap(), 1);
        assert_eq!(
            storage.count(Entity::TaskSpec).await.unwrap(),
            only_one.tasks.len() as u64
        );
        assert_eq!(
            storage.count(Entity::Inflection).await.unwrap(),
            only_one.inflections.len() as u64
        );
    }

    #[tokio::test]
    async fn changed_form_replaces_inflection() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        reconcile(&storage, &seed_set(vec![verb("backen", "backte", "gebacken")]), &opts)
            .await
            .unwrap();

        let updated = seed_set(vec![verb("backen", "buk", "gebacken")]);
        let report = reconcile(&storage, &updated, &opts).await.unwrap();
        assert_eq!(report.inflections_written, 1);
        assert_eq!(report.inflections_removed, 1);
        assert_eq!(report.lexemes_written, 0);

        let lexeme_id = &updated.lexemes[0].id;
        let forms: Vec<String> = storage
            .inflections_for(lexeme_id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.form)
            .collect();
        assert!(forms.contains(&"buk".to_string()));
        assert!(!forms.contains(&"backte".to_string()));
    }

    #[tokio::test]
    async fn cancellation_surfaces() {
        let storage = test_storage().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = BatchOptions::new(10, cancel);
        let seeds = seed_set(vec![verb("machen", "machte", "gemacht")]);
        let err = reconcile(&storage, &seeds, &opts).await.unwrap_err();
        assert!(matches!(err, LexsyncError::Cancelled));
    }
}
