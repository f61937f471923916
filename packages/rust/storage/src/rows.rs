//! Row ↔ domain conversions.

use libsql::{Row, Value};

use lexsync_shared::{
    ContentPack, Features, Gender, InflectionSeed, LexemeSeed, LexsyncError, PartOfSpeech,
    Renderer, Result, TaskSpecSeed, parse_timestamp,
};

pub(crate) const LEXEME_COLUMNS: &str =
    "id, lemma, language, pos, gender, metadata_json, frequency_rank, sources_json, checksum";

pub(crate) const INFLECTION_COLUMNS: &str =
    "id, lexeme_id, form, features_json, checksum, source_revision";

pub(crate) const TASK_COLUMNS: &str = "id, lexeme_id, pos, task_type, renderer, prompt_json, \
     solution_json, hints_json, metadata_json, revision, checksum";

pub(crate) const PACK_COLUMNS: &str =
    "id, slug, name, language, level, version, checksum, lexeme_count, generated_at";

pub(crate) fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

pub(crate) fn json_text<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|e| LexsyncError::Storage(format!("serialize column: {e}")))
}

fn get_string(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(LexsyncError::storage)
}

fn get_json<T: serde::de::DeserializeOwned>(row: &Row, idx: i32) -> Result<T> {
    let raw = get_string(row, idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| LexsyncError::Storage(format!("invalid json in column {idx}: {e}")))
}

fn get_pos(row: &Row, idx: i32) -> Result<PartOfSpeech> {
    let code = get_string(row, idx)?;
    PartOfSpeech::from_code(&code)
        .ok_or_else(|| LexsyncError::Storage(format!("unknown part of speech '{code}'")))
}

pub(crate) fn row_to_lexeme(row: &Row) -> Result<LexemeSeed> {
    Ok(LexemeSeed {
        id: get_string(row, 0)?,
        lemma: get_string(row, 1)?,
        language: get_string(row, 2)?,
        pos: get_pos(row, 3)?,
        gender: row
            .get::<String>(4)
            .ok()
            .and_then(|g| Gender::from_str_code(&g)),
        metadata: get_json(row, 5)?,
        frequency_rank: row.get::<i64>(6).ok().and_then(|r| u32::try_from(r).ok()),
        source_ids: get_json(row, 7)?,
        checksum: get_string(row, 8)?,
    })
}

pub(crate) fn row_to_inflection(row: &Row) -> Result<InflectionSeed> {
    let features: Features = get_json(row, 3)?;
    Ok(InflectionSeed {
        id: get_string(row, 0)?,
        lexeme_id: get_string(row, 1)?,
        form: get_string(row, 2)?,
        features,
        checksum: get_string(row, 4)?,
        source_revision: get_string(row, 5)?,
    })
}

pub(crate) fn row_to_task(row: &Row) -> Result<TaskSpecSeed> {
    let renderer = get_string(row, 4)?;
    Ok(TaskSpecSeed {
        id: get_string(row, 0)?,
        lexeme_id: get_string(row, 1)?,
        pos: get_pos(row, 2)?,
        task_type: get_string(row, 3)?,
        renderer: Renderer::from_str_code(&renderer)
            .ok_or_else(|| LexsyncError::Storage(format!("unknown renderer '{renderer}'")))?,
        prompt: get_json(row, 5)?,
        solution: get_json(row, 6)?,
        hints: get_json(row, 7)?,
        metadata: get_json(row, 8)?,
        revision: row
            .get::<i64>(9)
            .map_err(LexsyncError::storage)
            .map(|r| u32::try_from(r).unwrap_or(u32::MAX))?,
        checksum: get_string(row, 10)?,
    })
}

pub(crate) fn row_to_pack(row: &Row) -> Result<ContentPack> {
    Ok(ContentPack {
        id: get_string(row, 0)?,
        slug: get_string(row, 1)?,
        name: get_string(row, 2)?,
        language: get_string(row, 3)?,
        level: row.get::<String>(4).ok(),
        version: row
            .get::<i64>(5)
            .map_err(LexsyncError::storage)
            .map(|v| u32::try_from(v).unwrap_or(0))?,
        checksum: get_string(row, 6)?,
        lexeme_count: row
            .get::<i64>(7)
            .map_err(LexsyncError::storage)
            .map(|n| usize::try_from(n).unwrap_or(0))?,
        generated_at: parse_timestamp(&get_string(row, 8)?)?,
    })
}
