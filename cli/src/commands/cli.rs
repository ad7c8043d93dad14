use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "taskwave", version, about = "Run dependency graphs of tasks in bounded waves")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.taskwave/config.toml, then ./taskwave.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Plan file (.toml or .json).
    #[arg(long)]
    pub plan: PathBuf,

    /// Run only these task ids. Can be specified multiple times.
    #[arg(long = "only", action = clap::ArgAction::Append)]
    pub only: Vec<String>,

    /// Overrides `scheduler.concurrency_limit`.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Overrides `output.format`.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListArgs {
    #[arg(long)]
    pub agent: Option<String>,

    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a plan and run it.
    Run(RunArgs),
    /// Report unknown dependencies, cycles and the expected waves of a plan.
    Validate(ValidateArgs),
    /// List tasks held by the configured store.
    List(ListArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_repeated_only() {
        let args = Args::parse_from([
            "taskwave", "run", "--plan", "p.toml", "--only", "a", "--only", "b", "--format",
            "jsonl",
        ]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.only, vec!["a", "b"]);
                assert_eq!(run.format, Some(OutputFormat::Jsonl));
                assert!(run.concurrency.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_is_global() {
        let args = Args::parse_from(["taskwave", "list", "--config", "c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
    }
}
