//! Shared types, error model, and configuration for lexsync.
//!
//! This crate is the foundation depended on by all other lexsync crates.
//! It provides:
//! - [`LexsyncError`]: the unified error type
//! - Domain types ([`RawWordRow`], [`AggregatedWord`], [`LexemeSeed`], ...)
//! - Text helpers ([`slugify`], [`normalize_text`], content hashing)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_LOADER_ORDER, DefaultsConfig, LoadersConfig, PipelineSettings,
    VERBOSE_WARNINGS_ENV, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config, verbose_warnings_from_env,
};
pub use error::{LexsyncError, Result};
pub use text::{checksum_json, normalize_text, sha256_hex, short_hash, slugify};
pub use types::{
    AggregatedWord, AttributionEntry, Auxiliary, CURRENT_PACK_SCHEMA_VERSION, CefrLevel,
    ContentPack, DEFAULT_LANGUAGE, EnrichmentProvenance, Features, Gender, GovernedCase,
    InflectionSeed, LexemeSeed, PackLexeme, PartOfSpeech, PosTag, RawWordRow, Renderer,
    TaskSpecSeed, WordFields, format_timestamp, parse_timestamp, word_key,
};
