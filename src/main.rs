mod backend;
mod cli;
mod commands;
mod error;
mod mcp;
mod page_range;
mod pdf;
mod session;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use session::ControllerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP traffic, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagepick=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mcp { mode, scale } => {
            mcp::run_server(ControllerConfig { mode, scale }).await?;
        }
        Commands::Pick {
            path,
            pages,
            output_dir,
            preview_dir,
            mode,
            scale,
        } => {
            let config = ControllerConfig { mode, scale };
            commands::pick::run(&path, &pages, &output_dir, preview_dir, config).await?;
        }
        Commands::Preview {
            path,
            page,
            output_dir,
            scale,
        } => {
            commands::preview::run(&path, page, &output_dir, scale).await?;
        }
    }

    Ok(())
}
