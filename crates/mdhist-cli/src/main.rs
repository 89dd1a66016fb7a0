mod cli;
mod commands;
mod host;

use anyhow::Result;
use clap::Parser;
use mdhist_config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `view` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let workspace = match cli.workspace {
        Some(dir) => std::fs::canonicalize(dir)?,
        None => commands::find_workspace_root(&std::env::current_dir()?)?,
    };
    let config = Config::load_for_workspace(&workspace)?;
    tracing::debug!("Workspace: {}", workspace.display());

    commands::history::handle(cli.command, &workspace, &config).await
}
