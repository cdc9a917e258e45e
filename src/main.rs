mod cli;
mod config;
mod csv;
mod error;
mod git;
mod http;
mod identity;
mod migrate;
mod model;
mod output;
mod pacing;
mod providers;
mod source;
mod tree;
mod upsert;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting glmigrate");
    cli.execute().await?;

    Ok(())
}
