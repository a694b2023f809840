//! ScholarScout CLI: discover open scholarships through LLM web search.
//!
//! Runs fetch cycles against the configured provider and inspects or curates
//! the stored corpus.

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
