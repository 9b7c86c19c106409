// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File Forge — command-line host.
//
// Entry point. Initialises logging, loads the configuration, and dispatches
// one subcommand. Progress events go to stdout; logs go to stderr.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use forge_core::config::{ForgeConfig, default_data_dir};
use forge_core::error::{ForgeError, Result};
use forge_core::human_errors::humanize_error;
use forge_core::types::ProgressEvent;
use forge_pipeline::{Orchestrator, stream_events};

use cli::{Cli, Command, ConfigArgs, ReapArgs, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config = ForgeConfig::load(&data_dir);

    let outcome = match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::WarmUp => warm_up(config).await,
        Command::Reap(args) => reap(config, args),
        Command::Config(args) => show_config(config, args),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {}", humanize_error(&err).detail());
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ForgeConfig, args: RunArgs) -> Result<ExitCode> {
    let steps = cli::parse_steps(&args.steps)?;
    let orchestrator = Orchestrator::new(config)?;
    let input = orchestrator.store().ingest_file(&args.input)?;

    let handle = orchestrator.execute(input, steps)?;
    info!(run_id = %handle.run_id(), "run submitted");

    let mut stdout = tokio::io::stdout();
    match stream_events(handle, args.framing(), &mut stdout).await? {
        Some(ProgressEvent::Complete { filename, .. }) => {
            let path = orchestrator.store().resolve_download(&filename)?;
            info!(output = %path.display(), "run complete");
            Ok(ExitCode::SUCCESS)
        }
        Some(_) => Ok(ExitCode::FAILURE),
        None => Err(ForgeError::Internal(
            "event stream closed without a terminal event".into(),
        )),
    }
}

async fn warm_up(config: ForgeConfig) -> Result<ExitCode> {
    let orchestrator = Orchestrator::new(config)?;
    orchestrator.warm_up().await?;
    info!("recovery engine ready");
    Ok(ExitCode::SUCCESS)
}

fn reap(config: ForgeConfig, args: ReapArgs) -> Result<ExitCode> {
    let retention = match args.older_than {
        Some(secs) => std::time::Duration::from_secs(secs),
        None => config.retention(),
    };
    let store = forge_pipeline::ArtifactStore::open(&config.data_dir)?;
    let removed = store.reap_expired(retention)?;
    println!("{removed}");
    Ok(ExitCode::SUCCESS)
}

fn show_config(config: ForgeConfig, args: ConfigArgs) -> Result<ExitCode> {
    if args.save {
        config.save()?;
        info!(path = %config.data_dir.display(), "configuration saved");
    }
    if config.recovery.model_dir.is_some() && !cfg!(feature = "ocr") {
        warn!("recovery.model_dir is set but this build has no OCR support");
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}
