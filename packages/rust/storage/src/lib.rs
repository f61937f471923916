//! libSQL storage layer for the lexical database (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding the flat
//! `words` table, lexemes, inflections, task specs, content packs and the
//! `sync_state` key/value table.
//!
//! **Write rules:**
//! - every upsert is guarded by `checksum <> excluded.checksum`, so replaying
//!   identical data changes nothing, `updated_at` included;
//! - bulk writes run in fixed-size batches, one transaction per batch, and
//!   check the [`CancellationToken`] before each batch;
//! - foreign keys are enforced; deleting a lexeme cascades to its
//!   inflections, tasks and pack memberships.

mod migrations;
mod rows;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use libsql::{Connection, Database, Value, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lexsync_shared::{
    AggregatedWord, ContentPack, InflectionSeed, LexemeSeed, LexsyncError, PackLexeme, Result,
    TaskSpecSeed, checksum_json, format_timestamp,
};

use rows::{
    INFLECTION_COLUMNS, LEXEME_COLUMNS, PACK_COLUMNS, TASK_COLUMNS, json_text, opt_text,
    row_to_inflection, row_to_lexeme, row_to_pack, row_to_task, text,
};

/// Default number of rows written per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Id-keyed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Lexeme,
    Inflection,
    TaskSpec,
    ContentPack,
}

impl Entity {
    fn table(&self) -> &'static str {
        match self {
            Self::Lexeme => "lexemes",
            Self::Inflection => "inflections",
            Self::TaskSpec => "task_specs",
            Self::ContentPack => "content_packs",
        }
    }
}

/// Batch size and cancellation for bulk writes.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub cancel: CancellationToken,
}

impl BatchOptions {
    pub fn new(batch_size: usize, cancel: CancellationToken) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cancel,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, CancellationToken::new())
    }
}

/// One parameterized statement of a batched write.
struct Statement {
    sql: &'static str,
    values: Vec<Value>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    last_write: Mutex<DateTime<Utc>>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LexsyncError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LexsyncError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LexsyncError::storage)?;
        let conn = db.connect().map_err(LexsyncError::storage)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(LexsyncError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly,
            last_write: Mutex::new(DateTime::<Utc>::MIN_UTC),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LexsyncError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LexsyncError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Write timestamp for this call. Strictly increases within the process
    /// so a forced touch always moves `updated_at` forward.
    fn next_timestamp(&self) -> String {
        let mut last = self
            .last_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now().trunc_subsecs(6);
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        format_timestamp(&now)
    }

    /// Execute `statements` in batches, one transaction per batch.
    /// Returns the number of rows changed.
    async fn run_batched(
        &self,
        label: &str,
        statements: Vec<Statement>,
        options: &BatchOptions,
    ) -> Result<u64> {
        self.check_writable()?;
        let mut changed = 0u64;

        for (index, batch) in statements.chunks(options.batch_size.max(1)).enumerate() {
            if options.cancel.is_cancelled() {
                warn!(label, batch = index, "write cancelled before batch");
                return Err(LexsyncError::Cancelled);
            }

            let tx = self.conn.transaction().await.map_err(LexsyncError::storage)?;
            for statement in batch {
                changed += tx
                    .execute(
                        statement.sql,
                        libsql::params_from_iter(statement.values.clone()),
                    )
                    .await
                    .map_err(|e| LexsyncError::Storage(format!("{label}: {e}")))?;
            }
            tx.commit().await.map_err(LexsyncError::storage)?;
            debug!(label, batch = index, rows = batch.len(), "batch committed");
        }

        Ok(changed)
    }

    /// Delete rows of `entity` by id. Absent ids are no-ops.
    pub async fn delete_ids(
        &self,
        entity: Entity,
        ids: &[String],
        options: &BatchOptions,
    ) -> Result<u64> {
        let sql = match entity {
            Entity::Lexeme => "DELETE FROM lexemes WHERE id = ?1",
            Entity::Inflection => "DELETE FROM inflections WHERE id = ?1",
            Entity::TaskSpec => "DELETE FROM task_specs WHERE id = ?1",
            Entity::ContentPack => "DELETE FROM content_packs WHERE id = ?1",
        };
        let statements = ids
            .iter()
            .map(|id| Statement {
                sql,
                values: vec![text(id.as_str())],
            })
            .collect();
        self.run_batched(entity.table(), statements, options).await
    }

    /// All ids of `entity`, sorted.
    pub async fn list_ids(&self, entity: Entity) -> Result<Vec<String>> {
        let sql = format!("SELECT id FROM {} ORDER BY id", entity.table());
        self.query_strings(&sql, Vec::new()).await
    }

    /// Row count of `entity`.
    pub async fn count(&self, entity: Entity) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        self.query_count(&sql).await
    }

    /// `updated_at` of one row, if present.
    pub async fn updated_at(&self, entity: Entity, id: &str) -> Result<Option<String>> {
        let sql = format!("SELECT updated_at FROM {} WHERE id = ?1", entity.table());
        Ok(self
            .query_strings(&sql, vec![text(id)])
            .await?
            .into_iter()
            .next())
    }

    async fn query_strings(&self, sql: &str, values: Vec<Value>) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(sql, libsql::params_from_iter(values))
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(row.get::<String>(0).map_err(LexsyncError::storage)?);
        }
        Ok(results)
    }

    async fn query_count(&self, sql: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(LexsyncError::storage)?;
        match rows.next().await.map_err(LexsyncError::storage)? {
            Some(row) => {
                let n = row.get::<i64>(0).map_err(LexsyncError::storage)?;
                Ok(u64::try_from(n).unwrap_or(0))
            }
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Words (flat aggregated table)
    // -----------------------------------------------------------------------

    /// Upsert aggregated words keyed by `(lemma, pos)`.
    pub async fn upsert_words(&self, words: &[AggregatedWord], options: &BatchOptions) -> Result<u64> {
        let now = self.next_timestamp();
        let mut statements = Vec::with_capacity(words.len());
        for word in words {
            statements.push(Statement {
                sql: "INSERT INTO words (lemma, pos, level, approved, canonical, complete,
                                         payload_json, checksum, created_at, updated_at)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                      ON CONFLICT(lemma, pos) DO UPDATE SET
                        level = excluded.level,
                        approved = excluded.approved,
                        canonical = excluded.canonical,
                        complete = excluded.complete,
                        payload_json = excluded.payload_json,
                        checksum = excluded.checksum,
                        updated_at = excluded.updated_at
                      WHERE words.checksum <> excluded.checksum",
                values: vec![
                    text(word.lemma.as_str()),
                    text(word.pos.code()),
                    opt_text(word.fields.level.as_deref()),
                    Value::Integer(i64::from(word.approved)),
                    Value::Integer(i64::from(word.canonical)),
                    Value::Integer(i64::from(word.complete)),
                    json_text(word)?,
                    text(checksum_json(word)),
                    text(now.as_str()),
                ],
            });
        }
        self.run_batched("words", statements, options).await
    }

    /// `(lemma, pos)` pairs of every stored word.
    pub async fn word_keys(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query("SELECT lemma, pos FROM words ORDER BY lemma, pos", params![])
            .await
            .map_err(LexsyncError::storage)?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            keys.push((
                row.get::<String>(0).map_err(LexsyncError::storage)?,
                row.get::<String>(1).map_err(LexsyncError::storage)?,
            ));
        }
        Ok(keys)
    }

    pub async fn delete_words(&self, keys: &[(String, String)], options: &BatchOptions) -> Result<u64> {
        let statements = keys
            .iter()
            .map(|(lemma, pos)| Statement {
                sql: "DELETE FROM words WHERE lemma = ?1 AND pos = ?2",
                values: vec![text(lemma.as_str()), text(pos.as_str())],
            })
            .collect();
        self.run_batched("words", statements, options).await
    }

    pub async fn count_words(&self) -> Result<u64> {
        self.query_count("SELECT COUNT(*) FROM words").await
    }

    // -----------------------------------------------------------------------
    // Lexemes
    // -----------------------------------------------------------------------

    pub async fn upsert_lexemes(&self, lexemes: &[LexemeSeed], options: &BatchOptions) -> Result<u64> {
        let now = self.next_timestamp();
        let mut statements = Vec::with_capacity(lexemes.len());
        for lexeme in lexemes {
            statements.push(Statement {
                sql: "INSERT INTO lexemes (id, lemma, language, pos, gender, metadata_json,
                                           frequency_rank, sources_json, checksum, created_at, updated_at)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                      ON CONFLICT(id) DO UPDATE SET
                        lemma = excluded.lemma,
                        language = excluded.language,
                        pos = excluded.pos,
                        gender = excluded.gender,
                        metadata_json = excluded.metadata_json,
                        frequency_rank = excluded.frequency_rank,
                        sources_json = excluded.sources_json,
                        checksum = excluded.checksum,
                        updated_at = excluded.updated_at
                      WHERE lexemes.checksum <> excluded.checksum",
                values: vec![
                    text(lexeme.id.as_str()),
                    text(lexeme.lemma.as_str()),
                    text(lexeme.language.as_str()),
                    text(lexeme.pos.code()),
                    opt_text(lexeme.gender.map(|g| g.as_str())),
                    json_text(&lexeme.metadata)?,
                    lexeme
                        .frequency_rank
                        .map_or(Value::Null, |r| Value::Integer(i64::from(r))),
                    json_text(&lexeme.source_ids)?,
                    text(lexeme.checksum.as_str()),
                    text(now.as_str()),
                ],
            });
        }
        self.run_batched("lexemes", statements, options).await
    }

    pub async fn get_lexeme(&self, id: &str) -> Result<Option<LexemeSeed>> {
        let sql = format!("SELECT {LEXEME_COLUMNS} FROM lexemes WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(LexsyncError::storage)?;
        match rows.next().await.map_err(LexsyncError::storage)? {
            Some(row) => Ok(Some(row_to_lexeme(&row)?)),
            None => Ok(None),
        }
    }

    /// Every lexeme, ordered by id.
    pub async fn list_lexemes(&self) -> Result<Vec<LexemeSeed>> {
        let sql = format!("SELECT {LEXEME_COLUMNS} FROM lexemes ORDER BY id");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(row_to_lexeme(&row)?);
        }
        Ok(results)
    }

    /// Ids of lexemes whose own row or any owned inflection was updated
    /// strictly after `since`.
    pub async fn lexeme_ids_changed_since(&self, since: &str) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT id FROM lexemes WHERE updated_at > ?1
             UNION
             SELECT lexeme_id FROM inflections WHERE updated_at > ?1
             ORDER BY 1",
            vec![text(since)],
        )
        .await
    }

    /// Latest `updated_at` across lexemes, inflections and task specs.
    pub async fn max_updated_at(&self) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT MAX(ts) FROM (
                    SELECT MAX(updated_at) AS ts FROM lexemes
                    UNION ALL SELECT MAX(updated_at) FROM inflections
                    UNION ALL SELECT MAX(updated_at) FROM task_specs
                 )",
                params![],
            )
            .await
            .map_err(LexsyncError::storage)?;
        match rows.next().await.map_err(LexsyncError::storage)? {
            Some(row) => Ok(row.get::<String>(0).ok()),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Inflections
    // -----------------------------------------------------------------------

    pub async fn upsert_inflections(
        &self,
        inflections: &[InflectionSeed],
        options: &BatchOptions,
    ) -> Result<u64> {
        let now = self.next_timestamp();
        let mut statements = Vec::with_capacity(inflections.len());
        for inflection in inflections {
            statements.push(Statement {
                sql: "INSERT INTO inflections (id, lexeme_id, form, features_json, checksum,
                                               source_revision, created_at, updated_at)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                      ON CONFLICT(id) DO UPDATE SET
                        lexeme_id = excluded.lexeme_id,
                        form = excluded.form,
                        features_json = excluded.features_json,
                        checksum = excluded.checksum,
                        source_revision = excluded.source_revision,
                        updated_at = excluded.updated_at
                      WHERE inflections.checksum <> excluded.checksum",
                values: vec![
                    text(inflection.id.as_str()),
                    text(inflection.lexeme_id.as_str()),
                    text(inflection.form.as_str()),
                    json_text(&inflection.features)?,
                    text(inflection.checksum.as_str()),
                    text(inflection.source_revision.as_str()),
                    text(now.as_str()),
                ],
            });
        }
        self.run_batched("inflections", statements, options).await
    }

    /// Inflections of one lexeme, ordered by id.
    pub async fn inflections_for(&self, lexeme_id: &str) -> Result<Vec<InflectionSeed>> {
        let sql = format!(
            "SELECT {INFLECTION_COLUMNS} FROM inflections WHERE lexeme_id = ?1 ORDER BY id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![lexeme_id])
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(row_to_inflection(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Task specs
    // -----------------------------------------------------------------------

    /// Upsert task specs. With `touch`, rows are rewritten and `updated_at`
    /// advances even when the checksum is unchanged.
    pub async fn upsert_tasks(
        &self,
        tasks: &[TaskSpecSeed],
        touch: bool,
        options: &BatchOptions,
    ) -> Result<u64> {
        const GUARDED: &str = "INSERT INTO task_specs (id, lexeme_id, pos, task_type, renderer,
                                  prompt_json, solution_json, hints_json, metadata_json,
                                  revision, checksum, created_at, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
              ON CONFLICT(id) DO UPDATE SET
                lexeme_id = excluded.lexeme_id,
                pos = excluded.pos,
                task_type = excluded.task_type,
                renderer = excluded.renderer,
                prompt_json = excluded.prompt_json,
                solution_json = excluded.solution_json,
                hints_json = excluded.hints_json,
                metadata_json = excluded.metadata_json,
                revision = excluded.revision,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at
              WHERE task_specs.checksum <> excluded.checksum";
        const TOUCH: &str = "INSERT INTO task_specs (id, lexeme_id, pos, task_type, renderer,
                                  prompt_json, solution_json, hints_json, metadata_json,
                                  revision, checksum, created_at, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
              ON CONFLICT(id) DO UPDATE SET
                lexeme_id = excluded.lexeme_id,
                pos = excluded.pos,
                task_type = excluded.task_type,
                renderer = excluded.renderer,
                prompt_json = excluded.prompt_json,
                solution_json = excluded.solution_json,
                hints_json = excluded.hints_json,
                metadata_json = excluded.metadata_json,
                revision = excluded.revision,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at";

        let now = self.next_timestamp();
        let sql = if touch { TOUCH } else { GUARDED };
        let mut statements = Vec::with_capacity(tasks.len());
        for task in tasks {
            statements.push(Statement {
                sql,
                values: vec![
                    text(task.id.as_str()),
                    text(task.lexeme_id.as_str()),
                    text(task.pos.code()),
                    text(task.task_type.as_str()),
                    text(task.renderer.as_str()),
                    json_text(&task.prompt)?,
                    json_text(&task.solution)?,
                    json_text(&task.hints)?,
                    json_text(&task.metadata)?,
                    Value::Integer(i64::from(task.revision)),
                    text(task.checksum.as_str()),
                    text(now.as_str()),
                ],
            });
        }
        self.run_batched("task_specs", statements, options).await
    }

    /// Task specs of one lexeme, ordered by revision.
    pub async fn tasks_for(&self, lexeme_id: &str) -> Result<Vec<TaskSpecSeed>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_specs WHERE lexeme_id = ?1 ORDER BY revision, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![lexeme_id])
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(row_to_task(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Content packs
    // -----------------------------------------------------------------------

    pub async fn get_pack(&self, slug: &str) -> Result<Option<ContentPack>> {
        let sql = format!("SELECT {PACK_COLUMNS} FROM content_packs WHERE slug = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![slug])
            .await
            .map_err(LexsyncError::storage)?;
        match rows.next().await.map_err(LexsyncError::storage)? {
            Some(row) => Ok(Some(row_to_pack(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_packs(&self) -> Result<Vec<ContentPack>> {
        let sql = format!("SELECT {PACK_COLUMNS} FROM content_packs ORDER BY slug");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(row_to_pack(&row)?);
        }
        Ok(results)
    }

    /// Store a pack descriptor and replace its membership, atomically.
    pub async fn save_pack(&self, pack: &ContentPack, members: &[PackLexeme]) -> Result<()> {
        self.check_writable()?;
        let now = self.next_timestamp();
        let tx = self.conn.transaction().await.map_err(LexsyncError::storage)?;

        tx.execute(
            "INSERT INTO content_packs (id, slug, name, language, level, version, checksum,
                                        lexeme_count, generated_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
               slug = excluded.slug,
               name = excluded.name,
               language = excluded.language,
               level = excluded.level,
               version = excluded.version,
               checksum = excluded.checksum,
               lexeme_count = excluded.lexeme_count,
               generated_at = excluded.generated_at,
               updated_at = excluded.updated_at
             WHERE content_packs.checksum <> excluded.checksum",
            params![
                pack.id.as_str(),
                pack.slug.as_str(),
                pack.name.as_str(),
                pack.language.as_str(),
                pack.level.as_deref(),
                i64::from(pack.version),
                pack.checksum.as_str(),
                pack.lexeme_count as i64,
                format_timestamp(&pack.generated_at),
                now.as_str(),
            ],
        )
        .await
        .map_err(LexsyncError::storage)?;

        tx.execute(
            "DELETE FROM pack_lexemes WHERE pack_id = ?1",
            params![pack.id.as_str()],
        )
        .await
        .map_err(LexsyncError::storage)?;

        for member in members {
            tx.execute(
                "INSERT INTO pack_lexemes (pack_id, lexeme_id, position) VALUES (?1, ?2, ?3)",
                params![
                    member.pack_id.as_str(),
                    member.lexeme_id.as_str(),
                    i64::from(member.position)
                ],
            )
            .await
            .map_err(LexsyncError::storage)?;
        }

        tx.commit().await.map_err(LexsyncError::storage)?;
        Ok(())
    }

    /// Members of one pack, in position order.
    pub async fn pack_lexemes(&self, pack_id: &str) -> Result<Vec<PackLexeme>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pack_id, lexeme_id, position FROM pack_lexemes
                 WHERE pack_id = ?1 ORDER BY position",
                params![pack_id],
            )
            .await
            .map_err(LexsyncError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LexsyncError::storage)? {
            results.push(PackLexeme {
                pack_id: row.get::<String>(0).map_err(LexsyncError::storage)?,
                lexeme_id: row.get::<String>(1).map_err(LexsyncError::storage)?,
                position: row.get::<u32>(2).map_err(LexsyncError::storage)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Sync state
    // -----------------------------------------------------------------------

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?1", params![key])
            .await
            .map_err(LexsyncError::storage)?;
        match rows.next().await.map_err(LexsyncError::storage)? {
            Some(row) => Ok(row.get::<String>(0).ok()),
            None => Ok(None),
        }
    }

    pub async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let now = self.next_timestamp();
        self.conn
            .execute(
                "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(LexsyncError::storage)?;
        Ok(())
    }

    pub async fn clear_state(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?1", params![key])
            .await
            .map_err(LexsyncError::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::{Features, Gender, PartOfSpeech, Renderer, parse_timestamp};
    use serde_json::json;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("lexsync_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn lexeme(id: &str, lemma: &str, checksum: &str) -> LexemeSeed {
        LexemeSeed {
            id: id.into(),
            lemma: lemma.into(),
            language: "de".into(),
            pos: PartOfSpeech::Noun,
            gender: Some(Gender::Neuter),
            metadata: json!({"level": "A1"}),
            frequency_rank: Some(12),
            source_ids: vec!["manual-csv".into()],
            checksum: checksum.into(),
        }
    }

    fn inflection(id: &str, lexeme_id: &str, form: &str) -> InflectionSeed {
        let mut features = Features::new();
        features.insert("number".into(), "singular".into());
        InflectionSeed {
            id: id.into(),
            lexeme_id: lexeme_id.into(),
            form: form.into(),
            features,
            checksum: format!("ck-{form}"),
            source_revision: "seed-v1".into(),
        }
    }

    fn task(id: &str, lexeme_id: &str) -> TaskSpecSeed {
        TaskSpecSeed {
            id: id.into(),
            lexeme_id: lexeme_id.into(),
            pos: PartOfSpeech::Noun,
            task_type: "noun_article".into(),
            renderer: Renderer::MultipleChoice,
            prompt: json!({"options": ["der", "die", "das"]}),
            solution: json!({"answer": "das"}),
            hints: vec![],
            metadata: json!({}),
            revision: 1,
            checksum: format!("task-{id}"),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn reopen_does_not_reapply_migrations() {
        let tmp = std::env::temp_dir().join(format!("lexsync_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        first.set_state("k", "v").await.unwrap();
        drop(first);

        let second = Storage::open(&tmp).await.unwrap();
        assert_eq!(second.get_state("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn identical_upsert_keeps_updated_at() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();

        let seed = lexeme("de:noun:haus:1", "Haus", "c1");
        assert_eq!(storage.upsert_lexemes(&[seed.clone()], &opts).await.unwrap(), 1);
        let before = storage.updated_at(Entity::Lexeme, &seed.id).await.unwrap();

        assert_eq!(storage.upsert_lexemes(&[seed.clone()], &opts).await.unwrap(), 0);
        let after = storage.updated_at(Entity::Lexeme, &seed.id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(storage.count(Entity::Lexeme).await.unwrap(), 1);

        let changed = LexemeSeed {
            checksum: "c2".into(),
            frequency_rank: None,
            ..seed.clone()
        };
        assert_eq!(storage.upsert_lexemes(&[changed], &opts).await.unwrap(), 1);
        let stored = storage.get_lexeme(&seed.id).await.unwrap().unwrap();
        assert_eq!(stored.checksum, "c2");
        assert_eq!(stored.frequency_rank, None);
        assert!(storage.updated_at(Entity::Lexeme, &seed.id).await.unwrap() > after);
    }

    #[tokio::test]
    async fn lexeme_roundtrips_all_columns() {
        let storage = test_storage().await;
        let seed = lexeme("de:noun:haus:1", "Haus", "c1");
        storage
            .upsert_lexemes(&[seed.clone()], &BatchOptions::default())
            .await
            .unwrap();
        assert_eq!(storage.list_lexemes().await.unwrap(), vec![seed]);
    }

    #[tokio::test]
    async fn deleting_lexeme_cascades() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        storage
            .upsert_lexemes(&[lexeme("lx1", "Haus", "c1"), lexeme("lx2", "Baum", "c2")], &opts)
            .await
            .unwrap();
        storage
            .upsert_inflections(&[inflection("i1", "lx1", "Haus"), inflection("i2", "lx2", "Baum")], &opts)
            .await
            .unwrap();
        storage
            .upsert_tasks(&[task("t1", "lx1"), task("t2", "lx2")], false, &opts)
            .await
            .unwrap();

        storage
            .delete_ids(Entity::Lexeme, &["lx1".to_string()], &opts)
            .await
            .unwrap();

        assert_eq!(storage.list_ids(Entity::Lexeme).await.unwrap(), vec!["lx2"]);
        assert_eq!(storage.list_ids(Entity::Inflection).await.unwrap(), vec!["i2"]);
        assert_eq!(storage.list_ids(Entity::TaskSpec).await.unwrap(), vec!["t2"]);

        // Absent ids are a no-op.
        let removed = storage
            .delete_ids(Entity::Lexeme, &["lx1".to_string()], &opts)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn inflection_requires_lexeme() {
        let storage = test_storage().await;
        let result = storage
            .upsert_inflections(&[inflection("i1", "missing", "Haus")], &BatchOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn touch_advances_task_timestamp() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        storage.upsert_lexemes(&[lexeme("lx1", "Haus", "c1")], &opts).await.unwrap();
        storage.upsert_tasks(&[task("t1", "lx1")], false, &opts).await.unwrap();
        let first = storage.updated_at(Entity::TaskSpec, "t1").await.unwrap().unwrap();

        assert_eq!(storage.upsert_tasks(&[task("t1", "lx1")], false, &opts).await.unwrap(), 0);
        assert_eq!(
            storage.updated_at(Entity::TaskSpec, "t1").await.unwrap().unwrap(),
            first
        );

        assert_eq!(storage.upsert_tasks(&[task("t1", "lx1")], true, &opts).await.unwrap(), 1);
        let touched = storage.updated_at(Entity::TaskSpec, "t1").await.unwrap().unwrap();
        assert!(touched > first);

        let tasks = storage.tasks_for("lx1").await.unwrap();
        assert_eq!(tasks, vec![task("t1", "lx1")]);
    }

    #[tokio::test]
    async fn changed_since_includes_inflection_updates() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        storage
            .upsert_lexemes(&[lexeme("lx1", "Haus", "c1"), lexeme("lx2", "Baum", "c2")], &opts)
            .await
            .unwrap();
        storage
            .upsert_inflections(&[inflection("i1", "lx1", "Haus"), inflection("i2", "lx2", "Baum")], &opts)
            .await
            .unwrap();

        let marker = storage.max_updated_at().await.unwrap().unwrap();
        assert!(storage.lexeme_ids_changed_since(&marker).await.unwrap().is_empty());

        storage
            .upsert_inflections(&[inflection("i2", "lx2", "Bäume")], &opts)
            .await
            .unwrap();
        assert_eq!(
            storage.lexeme_ids_changed_since(&marker).await.unwrap(),
            vec!["lx2"]
        );
        assert_eq!(storage.inflections_for("lx2").await.unwrap()[0].form, "Bäume");
    }

    #[tokio::test]
    async fn max_updated_at_empty_is_none() {
        let storage = test_storage().await;
        assert_eq!(storage.max_updated_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_batch() {
        let storage = test_storage().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = BatchOptions::new(1, cancel);

        let err = storage
            .upsert_lexemes(&[lexeme("lx1", "Haus", "c1")], &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, LexsyncError::Cancelled));
        assert_eq!(storage.count(Entity::Lexeme).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn writes_span_multiple_batches() {
        let storage = test_storage().await;
        let seeds: Vec<LexemeSeed> = (0..7)
            .map(|i| lexeme(&format!("lx{i}"), &format!("Wort{i}"), "c"))
            .collect();
        let written = storage
            .upsert_lexemes(&seeds, &BatchOptions::new(3, CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(storage.count(Entity::Lexeme).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn words_upsert_and_delete() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        let word = AggregatedWord {
            lemma: "Haus".into(),
            pos: PartOfSpeech::Noun.into(),
            complete: true,
            sources: vec!["manual-csv".into()],
            ..AggregatedWord::default()
        };
        assert_eq!(storage.upsert_words(&[word.clone()], &opts).await.unwrap(), 1);
        assert_eq!(storage.upsert_words(&[word], &opts).await.unwrap(), 0);
        assert_eq!(
            storage.word_keys().await.unwrap(),
            vec![("Haus".to_string(), "noun".to_string())]
        );

        storage
            .delete_words(&[("Haus".into(), "noun".into())], &opts)
            .await
            .unwrap();
        assert_eq!(storage.count_words().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pack_membership_is_replaced() {
        let storage = test_storage().await;
        let opts = BatchOptions::default();
        storage
            .upsert_lexemes(&[lexeme("lx1", "Haus", "c1"), lexeme("lx2", "Baum", "c2")], &opts)
            .await
            .unwrap();

        let pack = ContentPack {
            id: "pack:de-a1".into(),
            slug: "de-a1".into(),
            name: "German A1".into(),
            language: "de".into(),
            level: Some("A1".into()),
            version: 1,
            checksum: "p1".into(),
            lexeme_count: 2,
            generated_at: parse_timestamp("2024-05-01T10:00:00Z").unwrap(),
        };
        let member = |lexeme_id: &str, position| PackLexeme {
            pack_id: pack.id.clone(),
            lexeme_id: lexeme_id.into(),
            position,
        };
        storage
            .save_pack(&pack, &[member("lx2", 0), member("lx1", 1)])
            .await
            .unwrap();
        storage.save_pack(&pack, &[member("lx1", 0)]).await.unwrap();

        assert_eq!(storage.get_pack("de-a1").await.unwrap(), Some(pack.clone()));
        assert_eq!(storage.pack_lexemes(&pack.id).await.unwrap(), vec![member("lx1", 0)]);
        assert_eq!(storage.list_packs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sync_state_set_get_clear() {
        let storage = test_storage().await;
        assert_eq!(storage.get_state("marker").await.unwrap(), None);
        storage.set_state("marker", "a").await.unwrap();
        storage.set_state("marker", "b").await.unwrap();
        assert_eq!(storage.get_state("marker").await.unwrap().as_deref(), Some("b"));
        storage.clear_state("marker").await.unwrap();
        assert_eq!(storage.get_state("marker").await.unwrap(), None);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("lexsync_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.set_state("k", "v").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get_state("k").await.unwrap().as_deref(), Some("v"));
        let result = ro.set_state("k", "w").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("lexsync_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
