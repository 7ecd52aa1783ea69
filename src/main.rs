// src/main.rs

use clap::Parser;

use phasedag::cli::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    phasedag::logging::init_logging(args.log_level)?;
    phasedag::run(args).await
}
