//! Core seeding and synchronization logic for lexsync.
//!
//! This crate turns loaded source rows into persisted lexemes, inflections
//! and practice tasks, and keeps derived tasks in step with the database
//! (e.g., [`pipeline::run_seed`], [`delta::DeltaSynchronizer`]).

pub mod attribution;
pub mod delta;
pub mod lexeme;
pub mod merge;
pub mod pack;
pub mod pipeline;
pub mod reconcile;
pub mod templates;
pub mod validate;
