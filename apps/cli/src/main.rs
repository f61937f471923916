//! lexsync CLI: seed and synchronize German lexical content.
//!
//! Loads vocabulary sources, builds lexemes, inflections and practice
//! tasks, and keeps them reconciled with a local libSQL database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
