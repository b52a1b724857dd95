mod candidates;
mod commands;
mod config;
mod diagnostics;
mod document;
mod encoding;
mod error;
mod locator;
mod logging;
mod package;
mod parser;
mod prompt;
mod reconcile;
mod scanner;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{FixOptions, Format};
use crate::config::Config;
use crate::logging::Verbosity;

#[derive(Parser)]
#[command(name = "dtxmend", version, about = "Repair drifted asset references in DTX song packages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Config file [default: ./dtxmend.toml when present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Only print errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Songs directory, overriding `songs_directory` from the config
    #[arg(long, global = true)]
    songs: Option<PathBuf>,
    /// Print debug events on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report broken references without changing anything
    Check {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Only this package (directory name under the songs directory)
        #[arg(long)]
        song: Option<String>,
    },
    /// Repair broken references, asking when several files could match
    Fix {
        /// Never prompt; ambiguous references stay unchanged
        #[arg(long)]
        no_prompt: bool,
        /// Rename each package directory to its song title
        #[arg(long)]
        rename_dirs: bool,
        /// Only this package (directory name under the songs directory)
        #[arg(long)]
        song: Option<String>,
    },
    /// List assets outside the directory their layout rule expects
    Layout {
        /// Only this package (directory name under the songs directory)
        #[arg(long)]
        song: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    return match run(cli) {
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
        Ok(code) => code,
    };
}

/// Load config, install logging, and dispatch to the command.
///
/// # Errors
///
/// Returns config, logging, and fatal command errors.
fn run(cli: Cli) -> Result<ExitCode, error::Error> {
    let config = Config::load(cli.config.as_deref())?.with_songs_directory(cli.songs);
    let log_file = Some(config.log_file.as_path()).filter(|p| return !p.as_os_str().is_empty());
    let session = logging::start(log_file, Verbosity::from_flags(cli.verbose, cli.quiet))?;
    tracing::debug!(songs = %config.songs_directory.display(), "starting");

    let result = match cli.command {
        Commands::Check { format, song } => commands::check(&config, song.as_deref(), format),
        Commands::Fix { no_prompt, rename_dirs, song } => {
            commands::fix(&config, song.as_deref(), FixOptions { no_prompt, rename_dirs })
        },
        Commands::Layout { song } => commands::layout(&config, song.as_deref()),
    };
    if let Err(e) = &result {
        tracing::error!("{e}");
    }

    session.finish()?;
    return result;
}
