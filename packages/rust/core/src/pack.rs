//! Versioned content packs grouped by CEFR level.
//!
//! Packs are derived from persisted rows, so they reflect exactly what the
//! database holds after reconciliation. A pack's version only moves when
//! its checksum does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use lexsync_shared::{
    CURRENT_PACK_SCHEMA_VERSION, CefrLevel, ContentPack, InflectionSeed, LexemeSeed, LexsyncError,
    PackLexeme, Result, TaskSpecSeed, checksum_json,
};
use lexsync_storage::{BatchOptions, Entity, Storage};

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub language: String,
    /// Where `packs/` is written; `None` only updates the database.
    pub output_dir: Option<PathBuf>,
}

/// Result for one pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub slug: String,
    pub version: u32,
    pub lexeme_count: usize,
    pub checksum: String,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// One lexeme with everything it owns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackEntry {
    position: u32,
    lexeme: LexemeSeed,
    inflections: Vec<InflectionSeed>,
    tasks: Vec<TaskSpecSeed>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PackDocument<'a> {
    schema_version: u32,
    pack: &'a ContentPack,
    lexemes: &'a [PackEntry],
}

pub fn pack_slug(language: &str, level: Option<CefrLevel>) -> String {
    match level {
        Some(level) => format!("{language}-{}", level.as_str().to_ascii_lowercase()),
        None => format!("{language}-unleveled"),
    }
}

fn pack_name(language: &str, level: Option<CefrLevel>) -> String {
    let language = match language {
        "de" => "German",
        other => other,
    };
    match level {
        Some(level) => format!("{language} {}", level.as_str()),
        None => format!("{language} (unleveled)"),
    }
}

fn lexeme_level(lexeme: &LexemeSeed) -> Option<CefrLevel> {
    lexeme
        .metadata
        .get("level")
        .and_then(serde_json::Value::as_str)
        .and_then(CefrLevel::parse)
}

/// Frequency rank first (unranked last), then lemma, then id.
fn order_members(members: &mut [LexemeSeed]) {
    members.sort_by(|a, b| {
        let rank = |l: &LexemeSeed| l.frequency_rank.unwrap_or(u32::MAX);
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.lemma.cmp(&b.lemma))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Serialize)]
struct EntryDigest<'a> {
    lexeme: &'a str,
    inflections: Vec<&'a str>,
    tasks: Vec<&'a str>,
}

fn pack_checksum(entries: &[PackEntry]) -> String {
    let digest: Vec<EntryDigest<'_>> = entries
        .iter()
        .map(|e| EntryDigest {
            lexeme: &e.lexeme.checksum,
            inflections: e.inflections.iter().map(|i| i.checksum.as_str()).collect(),
            tasks: e.tasks.iter().map(|t| t.checksum.as_str()).collect(),
        })
        .collect();
    checksum_json(&digest)
}

/// Rebuild every pack from storage, bump versions that changed, write the
/// pack files and drop packs that no longer have members.
#[instrument(skip_all, fields(language = %options.language))]
pub async fn build_packs(
    storage: &Storage,
    options: &PackOptions,
    batch: &BatchOptions,
) -> Result<Vec<PackSummary>> {
    let mut groups: BTreeMap<Option<CefrLevel>, Vec<LexemeSeed>> = BTreeMap::new();
    for lexeme in storage.list_lexemes().await? {
        if lexeme.language != options.language {
            continue;
        }
        groups.entry(lexeme_level(&lexeme)).or_default().push(lexeme);
    }

    let mut summaries = Vec::with_capacity(groups.len());
    let mut live_ids = Vec::with_capacity(groups.len());

    for (level, mut members) in groups {
        if batch.cancel.is_cancelled() {
            return Err(LexsyncError::Cancelled);
        }
        order_members(&mut members);

        let slug = pack_slug(&options.language, level);
        let id = format!("pack:{slug}");
        live_ids.push(id.clone());

        let mut entries = Vec::with_capacity(members.len());
        for (position, lexeme) in (0u32..).zip(members) {
            let inflections = storage.inflections_for(&lexeme.id).await?;
            let tasks = storage.tasks_for(&lexeme.id).await?;
            entries.push(PackEntry {
                position,
                lexeme,
                inflections,
                tasks,
            });
        }
        let checksum = pack_checksum(&entries);

        let stored = storage.get_pack(&slug).await?;
        let (pack, changed) = match stored {
            Some(existing) if existing.checksum == checksum => (existing, false),
            existing => {
                let version = existing.map_or(1, |p| p.version + 1);
                let pack = ContentPack {
                    id: id.clone(),
                    slug: slug.clone(),
                    name: pack_name(&options.language, level),
                    language: options.language.clone(),
                    level: level.map(|l| l.as_str().to_string()),
                    version,
                    checksum,
                    lexeme_count: entries.len(),
                    generated_at: Utc::now(),
                };
                let membership: Vec<PackLexeme> = entries
                    .iter()
                    .map(|e| PackLexeme {
                        pack_id: id.clone(),
                        lexeme_id: e.lexeme.id.clone(),
                        position: e.position,
                    })
                    .collect();
                storage.save_pack(&pack, &membership).await?;
                (pack, true)
            }
        };

        let path = match &options.output_dir {
            Some(dir) => {
                let path = dir
                    .join("packs")
                    .join(format!("{}.v{}.json", pack.slug, pack.version));
                if changed || !path.exists() {
                    write_pack_file(&path, &pack, &entries)?;
                }
                Some(path)
            }
            None => None,
        };

        debug!(slug = %pack.slug, version = pack.version, changed, "pack processed");
        summaries.push(PackSummary {
            slug: pack.slug,
            version: pack.version,
            lexeme_count: pack.lexeme_count,
            checksum: pack.checksum,
            changed,
            path,
        });
    }

    let stale: Vec<String> = storage
        .list_ids(Entity::ContentPack)
        .await?
        .into_iter()
        .filter(|id| !live_ids.contains(id))
        .collect();
    let removed = storage.delete_ids(Entity::ContentPack, &stale, batch).await?;
    summaries.sort_by(|a, b| a.slug.cmp(&b.slug));

    info!(
        packs = summaries.len(),
        changed = summaries.iter().filter(|s| s.changed).count(),
        removed,
        "content packs built"
    );
    Ok(summaries)
}

/// Write to a temp file next to the target, then rename.
fn write_pack_file(path: &Path, pack: &ContentPack, entries: &[PackEntry]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| LexsyncError::validation(format!("invalid pack path {}", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| LexsyncError::io(dir, e))?;

    let document = PackDocument {
        schema_version: CURRENT_PACK_SCHEMA_VERSION,
        pack,
        lexemes: entries,
    };
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| LexsyncError::validation(format!("pack serialization failed: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pack.slug.clone());
    let temp = dir.join(format!(".{file_name}.tmp"));
    std::fs::write(&temp, json).map_err(|e| LexsyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LexsyncError::io(path, e))?;

    debug!(path = %path.display(), "wrote pack file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{AggregatedWord, Gender, PartOfSpeech};
    use uuid::Uuid;

    use crate::lexeme::{BuildOptions, build_lexeme};
    use crate::reconcile::{SeedSet, reconcile};
    use crate::templates::generate_tasks;

    fn noun(lemma: &str, level: Option<&str>, rank: Option<u32>) -> AggregatedWord {
        let mut w = AggregatedWord {
            lemma: lemma.into(),
            pos: PartOfSpeech::Noun.into(),
            complete: true,
            sources: vec!["manual-csv".into()],
            ..AggregatedWord::default()
        };
        w.fields.gender = Some(Gender::Neuter);
        w.fields.plural = Some(format!("{lemma}e"));
        w.fields.level = level.map(Into::into);
        w.fields.frequency_rank = rank;
        w
    }

    async fn seeded(words: Vec<AggregatedWord>) -> Storage {
        let tmp = std::env::temp_dir().join(format!("lexsync_pack_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();
        reseed(&storage, words).await;
        storage
    }

    async fn reseed(storage: &Storage, words: Vec<AggregatedWord>) {
        let mut set = SeedSet::default();
        for word in &words {
            let (lexeme, inflections) = build_lexeme(word, &BuildOptions::default()).unwrap();
            set.tasks.extend(generate_tasks(word, &lexeme.id).unwrap());
            set.inflections.extend(inflections);
            set.lexemes.push(lexeme);
        }
        set.words = words;
        reconcile(storage, &set, &BatchOptions::default()).await.unwrap();
    }

    fn options(output_dir: Option<PathBuf>) -> PackOptions {
        PackOptions {
            language: "de".into(),
            output_dir,
        }
    }

    #[test]
    fn slugs() {
        assert_eq!(pack_slug("de", Some(CefrLevel::A1)), "de-a1");
        assert_eq!(pack_slug("de", None), "de-unleveled");
    }

    #[tokio::test]
    async fn groups_by_level_and_orders_by_rank() {
        let storage = seeded(vec![
            noun("Zug", Some("A1"), Some(5)),
            noun("Tisch", Some("a1"), Some(2)),
            noun("Ast", Some("A1"), None),
            noun("Bahn", Some("B2"), None),
            noun("Ding", None, None),
        ])
        .await;

        let summaries = build_packs(&storage, &options(None), &BatchOptions::default())
            .await
            .unwrap();
        let slugs: Vec<&str> = summaries.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["de-a1", "de-b2", "de-unleveled"]);
        assert!(summaries.iter().all(|s| s.version == 1 && s.changed));

        let members = storage.pack_lexemes("pack:de-a1").await.unwrap();
        let lemmas: Vec<String> = {
            let mut out = Vec::new();
            for m in &members {
                out.push(storage.get_lexeme(&m.lexeme_id).await.unwrap().unwrap().lemma);
            }
            out
        };
        assert_eq!(lemmas, vec!["Tisch", "Zug", "Ast"]);
    }

    #[tokio::test]
    async fn version_bumps_only_on_change() {
        let storage = seeded(vec![noun("Haus", Some("A1"), None)]).await;
        let out = std::env::temp_dir().join(format!("lexsync_pack_out_{}", Uuid::now_v7()));
        let opts = options(Some(out.clone()));

        let first = build_packs(&storage, &opts, &BatchOptions::default()).await.unwrap();
        assert_eq!(first[0].version, 1);
        assert!(out.join("packs/de-a1.v1.json").exists());

        let again = build_packs(&storage, &opts, &BatchOptions::default()).await.unwrap();
        assert_eq!(again[0].version, 1);
        assert!(!again[0].changed);

        reseed(&storage, vec![noun("Haus", Some("A1"), None), noun("Baum", Some("A1"), None)]).await;
        let bumped = build_packs(&storage, &opts, &BatchOptions::default()).await.unwrap();
        assert_eq!(bumped[0].version, 2);
        assert_eq!(bumped[0].lexeme_count, 2);

        let doc: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(out.join("packs/de-a1.v2.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["schemaVersion"], CURRENT_PACK_SCHEMA_VERSION);
        assert_eq!(doc["pack"]["version"], 2);
        assert_eq!(doc["lexemes"].as_array().unwrap().len(), 2);

        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn empty_level_pack_is_removed() {
        let storage = seeded(vec![
            noun("Haus", Some("A1"), None),
            noun("Bahn", Some("B1"), None),
        ])
        .await;
        build_packs(&storage, &options(None), &BatchOptions::default())
            .await
            .unwrap();

        reseed(&storage, vec![noun("Haus", Some("A1"), None)]).await;
        build_packs(&storage, &options(None), &BatchOptions::default())
            .await
            .unwrap();

        let slugs: Vec<String> = storage
            .list_packs()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        assert_eq!(slugs, vec!["de-a1"]);
    }
}
