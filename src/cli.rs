use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::commands::comments::FetchStrategy;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Which creation-date window to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// The last 30 days, including today
    #[default]
    #[value(name = "last30")]
    Last30,
    /// The previous calendar month
    #[value(name = "lastmonth")]
    LastMonth,
}

#[derive(Parser)]
#[command(name = "helpdesk-export")]
#[command(about = "Export helpdesk tickets and their comment threads to CSV", version)]
#[command(after_help = "EXAMPLES:
    helpdesk-export export                       Export the last 30 days
    helpdesk-export export --mode lastmonth      Export the previous calendar month
    helpdesk-export export --no-cache            Refresh user identities first
    helpdesk-export cache status                 Show identity cache age")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for reports (table, json)
    #[arg(long, short = 'o', global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Suppress progress and success messages
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Show debug logs and detailed error information
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export tickets with comments to a CSV file
    #[command(
        alias = "x",
        after_help = "EXAMPLES:
    helpdesk-export export --mode last30
    helpdesk-export export --mode lastmonth --strategy per-ticket
    helpdesk-export export --skip-report --output-dir ./exports"
    )]
    Export(ExportArgs),
    /// Inspect or clear the user identity cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Generate shell completions
    #[command(after_help = "EXAMPLES:
    helpdesk-export completions bash > ~/.bash_completion.d/helpdesk-export
    helpdesk-export completions zsh > ~/.zfunc/_helpdesk-export")]
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// Initialize configuration file interactively
    Init,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache location, size and age
    Status,
    /// Delete the cached identities
    Clear,
}

#[derive(Args, Clone)]
pub struct ExportArgs {
    /// Date range to export
    #[arg(long, value_enum, default_value = "last30")]
    pub mode: Mode,

    /// Ignore the identity cache and fetch users fresh
    #[arg(long)]
    pub no_cache: bool,

    /// Skip the API usage report at the end
    #[arg(long)]
    pub skip_report: bool,

    /// How comment threads are fetched (default from config, else bulk)
    #[arg(long, value_enum)]
    pub strategy: Option<FetchStrategy>,

    /// Directory for the CSV file (default from config, else current dir)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_defaults() {
        let cli = Cli::try_parse_from(["helpdesk-export", "export"]).unwrap();
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.mode, Mode::Last30);
                assert!(!args.no_cache);
                assert!(!args.skip_report);
                assert!(args.strategy.is_none());
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn export_flags_parse() {
        let cli = Cli::try_parse_from([
            "helpdesk-export",
            "export",
            "--mode",
            "lastmonth",
            "--no-cache",
            "--skip-report",
            "--strategy",
            "per-ticket",
        ])
        .unwrap();
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.mode, Mode::LastMonth);
                assert!(args.no_cache);
                assert!(args.skip_report);
                assert_eq!(args.strategy, Some(FetchStrategy::PerTicket));
            }
            _ => panic!("expected export"),
        }
    }
}
