use clap::Parser;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use unwound_core::{Config, FAILURE_EXIT_STATUS};
use unwound_scope::{Context, Detail};

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "unwound")]
#[command(about = "Exercise scoped resources that unwind on failure", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    // Parse command-line arguments
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", program_name());
            return ExitCode::from(FAILURE_EXIT_STATUS);
        }
    };

    if let Err(e) = unwound_utils::tracing::init(&config.log_filter) {
        eprintln!("{}: {e}", program_name());
        return ExitCode::from(FAILURE_EXIT_STATUS);
    }

    if config.ignore_sigpipe {
        // SAFETY: installing SIG_IGN has no handler to race with.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    }

    let mut ctx = Context::new(program_name());
    let outcome = ctx.catch_error(Detail::Message, |ctx| cli.command.execute(ctx, &config));
    match outcome {
        Ok(status) => ExitCode::from(status),
        Err(info) => {
            eprintln!("{info}");
            ExitCode::from(FAILURE_EXIT_STATUS)
        }
    }
}

/// Basename of argv[0], falling back to the default name.
fn program_name() -> String {
    env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| unwound_core::DEFAULT_PROGRAM_NAME.to_string())
}
