// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_dir;

/// Command-line arguments for `stagehand`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Run pipeline stages on remote compute endpoints.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory holding `config.toml` and `stages.toml`. Run state is kept
    /// in its `state/` subdirectory.
    #[arg(long, global = true, value_name = "DIR", default_value_os_t = default_config_dir())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `--debug`, then `STAGEHAND_LOG`, then `info` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Shorthand for `--log-level debug`.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute stages (and their dependencies) on the remote endpoints.
    Run(RunArgs),
    /// Print the logs remote jobs wrote for stages.
    Display(DisplayArgs),
    /// Print the resolved execution order without contacting anything.
    Plan(PlanArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Comma-separated stage names. Defaults to every defined stage.
    #[arg(long, value_delimiter = ',', value_name = "STAGES")]
    pub stages: Vec<String>,

    /// Discard saved state and start a new run.
    #[arg(long)]
    pub clean: bool,

    /// Wait for each stage's remote jobs and display their logs.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DisplayArgs {
    /// Comma-separated stage names, displayed in the order given. Defaults to
    /// every defined stage.
    #[arg(long, value_delimiter = ',', value_name = "STAGES")]
    pub stages: Vec<String>,

    /// Show logs of another run instead of the current one.
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Comma-separated stage names. Defaults to every defined stage.
    #[arg(long, value_delimiter = ',', value_name = "STAGES")]
    pub stages: Vec<String>,

    /// Print the whole stage graph in Graphviz DOT format instead.
    #[arg(long)]
    pub dot: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_comma_separated_stages() {
        let args = CliArgs::try_parse_from([
            "stagehand", "run", "--stages", "validate,style", "--wait",
        ])
        .unwrap();

        match args.command {
            Command::Run(run) => {
                assert_eq!(run.stages, vec!["validate", "style"]);
                assert!(run.wait);
                assert!(!run.clean);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(args.config, PathBuf::from("stagehand.d/default"));
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "stagehand", "display", "--run-id", "abc", "--config", "ci.d", "--debug",
        ])
        .unwrap();

        assert!(args.debug);
        assert_eq!(args.config, PathBuf::from("ci.d"));
        assert!(matches!(
            args.command,
            Command::Display(DisplayArgs { ref run_id, .. }) if run_id.as_deref() == Some("abc")
        ));
    }
}
