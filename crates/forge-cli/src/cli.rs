// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use forge_core::error::{ForgeError, Result};
use forge_core::types::StepDescriptor;
use forge_pipeline::Framing;

#[derive(Parser, Debug)]
#[command(
    name = "forge",
    version,
    about = "Run step-chained document and image conversions",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Data directory (defaults to $FORGE_DATA_DIR, then the XDG data dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a pipeline over one file and stream its progress to stdout
    Run(RunArgs),
    /// Build the layout recovery engine now
    WarmUp,
    /// Delete stored artifacts older than the retention period
    Reap(ReapArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// File to convert; it is copied into the store first
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Step list as JSON, or @path to a JSON file
    #[arg(long, value_name = "JSON|@FILE")]
    pub steps: String,

    /// Emit server-sent-event frames instead of JSON lines
    #[arg(long)]
    pub sse: bool,
}

impl RunArgs {
    pub fn framing(&self) -> Framing {
        if self.sse {
            Framing::Sse
        } else {
            Framing::JsonLines
        }
    }
}

#[derive(Args, Debug)]
pub struct ReapArgs {
    /// Override the configured retention, in seconds
    #[arg(long, value_name = "SECS")]
    pub older_than: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the effective configuration to <data-dir>/config.json
    #[arg(long)]
    pub save: bool,
}

/// Parse `--steps`: inline JSON, or `@file` holding JSON.
pub fn parse_steps(arg: &str) -> Result<Vec<StepDescriptor>> {
    let json = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path)).map_err(|err| {
            ForgeError::Validation(format!("cannot read step file {path}: {err}"))
        })?,
        None => arg.to_owned(),
    };
    StepDescriptor::parse_list(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use forge_core::types::StepKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "forge",
            "--data-dir",
            "/tmp/forge",
            "run",
            "doc.pdf",
            "--steps",
            r#"[{"type":"decrypt","config":{"password":"x"}}]"#,
            "--sse",
        ])
        .unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some(Path::new("/tmp/forge")));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.framing(), Framing::Sse);
                let steps = parse_steps(&args.steps).unwrap();
                assert_eq!(steps[0].resolve_kind(), Some(StepKind::Decrypt));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn steps_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.json");
        std::fs::write(
            &path,
            r#"[{"type":"resize_image","label":"Shrink","config":{"percentage":25}}]"#,
        )
        .unwrap();

        let steps = parse_steps(&format!("@{}", path.display())).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].display_label(), "Shrink");
        assert_eq!(steps[0].resolve_kind(), Some(StepKind::ResizeImage));
    }

    #[test]
    fn bad_step_json_is_a_validation_error() {
        assert!(matches!(
            parse_steps("{not json"),
            Err(ForgeError::Validation(_))
        ));
        assert!(matches!(
            parse_steps("@/definitely/not/here.json"),
            Err(ForgeError::Validation(_))
        ));
    }
}
