mod auth;
mod cli;
mod client;
mod commands;
mod config;
mod csv;
mod error;
mod identity;
#[cfg(test)]
mod mock;
mod output;
mod record;
mod responses;
mod types;
mod usage;
mod window;

use std::error::Error;
use std::io;

use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, Level};

use cli::{CacheCommands, Cli, Commands, ExportArgs};
use client::HelpdeskClient;
use commands::comments::FetchOptions;
use commands::export::{self, ExportPlan};
use config::Config;
use error::Result;
use identity::IdentityCache;
use usage::UsageTracker;
use window::DateWindow;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        output::error(&e.to_string());

        // Show error chain if verbose flag was passed
        if std::env::args().any(|arg| arg == "--verbose" || arg == "-v") {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("Caused by: {cause}");
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    output::set_format(cli.format);
    output::set_quiet(cli.quiet);

    match cli.command {
        // Commands that don't need credentials
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "helpdesk-export", &mut io::stdout());
        }
        Commands::Init => {
            commands::init::run().await?;
        }
        Commands::Cache { action } => {
            let config = Config::load()?;
            let cache = IdentityCache::new(config.cache_dir()?);
            match action {
                CacheCommands::Status => commands::cache::status(&cache)?,
                CacheCommands::Clear => commands::cache::clear(&cache)?,
            }
        }
        Commands::Export(args) => {
            let config = Config::load()?;
            run_export(&config, args).await?;
        }
    }

    Ok(())
}

async fn run_export(config: &Config, args: ExportArgs) -> Result<()> {
    let credentials = config.credentials()?;
    debug!(email = credentials.email(), "loaded credentials");
    let client = HelpdeskClient::new(config.base_url()?, &credentials, config.request_timeout())?;
    let cache = IdentityCache::new(config.cache_dir()?);
    let tracker = UsageTracker::new();

    let plan = ExportPlan {
        window: DateWindow::for_mode(args.mode, Utc::now()),
        use_cache: !args.no_cache,
        skip_report: args.skip_report,
        fetch: FetchOptions {
            strategy: config.resolve_strategy(args.strategy),
            max_concurrency: config.max_concurrency(),
            unit_timeout: config.session_timeout(),
        },
        output_dir: config.resolve_output_dir(args.output_dir),
    };

    export::run(&client, &cache, &tracker, &plan).await;
    Ok(())
}
