mod commands;
mod config;
mod constants;
mod db;
mod progress;
mod schema;
mod update;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = constants::CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level) and full error reports
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending database updates (default)
    Apply {
        #[command(flatten)]
        database_args: config::DatabaseArgs,

        #[command(flatten)]
        update_args: config::UpdateArgs,
    },

    /// Show the recorded revision and the updates still pending
    Status {
        #[command(flatten)]
        database_args: config::DatabaseArgs,
    },

    /// Record the latest revision on a freshly installed database
    Seed {
        /// Overwrite a revision that is already recorded
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        database_args: config::DatabaseArgs,
    },

    /// Check whether a newer panel release is available
    Release {
        /// Reload the release descriptor even if the cached copy is fresh
        #[arg(long)]
        refresh: bool,

        /// Version to compare against instead of the installed one
        #[arg(long)]
        current_version: Option<String>,

        #[command(flatten)]
        release_args: config::ReleaseArgs,

        #[command(flatten)]
        database_args: config::DatabaseArgs,
    },
}

fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    if cli.debug && std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // SAFETY: no other thread exists yet; the runtime is built below
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "1") };
    }
    initialize_logging(&cli);

    let debug = cli.debug;
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
        .and_then(|runtime| runtime.block_on(run_main(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if debug {
                eprintln!("[ERROR] {:?}", e);
            } else {
                eprintln!("[ERROR] {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_main(cli: Cli) -> Result<()> {
    let (file_config, root_dir) = config::load_config(&cli.config_file)?;
    let command = cli.command.unwrap_or(Commands::Apply {
        database_args: config::DatabaseArgs::default(),
        update_args: config::UpdateArgs::default(),
    });

    match command {
        Commands::Apply {
            database_args,
            update_args,
        } => {
            let cli_config = config::ConfigInput {
                database: Some(database_args.into()),
                update: Some(update_args.into()),
                release: None,
                system: None,
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config)
                .with_cli_args(cli_config)
                .resolve()?;

            info!("Applying pending database updates");
            commands::cmd_apply(&config, &root_dir, !cli.quiet).await?;
            Ok(())
        }
        Commands::Status { database_args } => {
            let cli_config = config::ConfigInput {
                database: Some(database_args.into()),
                update: None,
                release: None,
                system: None,
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config)
                .with_cli_args(cli_config)
                .resolve()?;

            info!("Checking database revision");
            commands::cmd_status(&config).await
        }
        Commands::Seed {
            force,
            database_args,
        } => {
            let cli_config = config::ConfigInput {
                database: Some(database_args.into()),
                update: None,
                release: None,
                system: None,
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config)
                .with_cli_args(cli_config)
                .resolve()?;

            info!("Seeding database revision");
            commands::cmd_seed(&config, force).await
        }
        Commands::Release {
            refresh,
            current_version,
            release_args,
            database_args,
        } => {
            let cli_config = config::ConfigInput {
                database: Some(database_args.into()),
                update: None,
                release: Some(release_args.into()),
                system: None,
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config)
                .with_cli_args(cli_config)
                .resolve()?;

            info!("Checking for a newer release");
            commands::cmd_release(
                &config,
                &root_dir,
                commands::release::ReleaseArgs {
                    refresh,
                    current_version,
                },
            )
            .await
        }
    }
}
