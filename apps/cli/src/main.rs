//! WriterPack CLI: trend-aware research and drafting for editorial teams.
//!
//! Turns a topic into a reviewable Writer's Pack (article draft, sources,
//! internal links, social posts) and optionally files it as a CMS draft.

mod commands;
mod render;

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
