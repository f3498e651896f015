mod cli;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vision_dispatch::dispatch;
use vision_dispatch::segmentation::SegmentationEngine;

fn main() -> ExitCode {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", cli::USAGE);
            eprintln!("{e}");
            return ExitCode::from(cli::USAGE_EXIT);
        }
    };

    // stdout belongs to the banner and the session protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let mode = dispatch::launch(
        &cli.config_path,
        &cli.target,
        SegmentationEngine::from_config_path,
        io::stdin().lock(),
        io::stdout().lock(),
    )
    .with_context(|| format!("{} failed (config {})", cli.target, cli.config_path.display()))?;

    tracing::debug!(?mode, "finished");
    Ok(())
}
