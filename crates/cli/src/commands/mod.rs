use clap::Subcommand;
use std::path::PathBuf;
use unwound_core::Config;
use unwound_scope::{Context, Result};

pub mod cat;
pub mod config;
pub mod dbg;
pub mod dup;
pub mod pipe;

#[derive(Subcommand)]
pub enum Commands {
    /// Open every file, then copy each to stdout
    ///
    /// All files are opened before anything is written, so a missing file
    /// fails the command with nothing printed.
    Cat {
        /// Files to concatenate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Send a message through a pipe and print what comes out
    Pipe {
        /// Message to send
        message: String,
    },

    /// Read a file through a duplicated descriptor that is closed on its own
    Dup {
        /// File to read
        file: PathBuf,
    },

    /// Print a message to stderr under the debug lock
    Dbg {
        /// Message to print
        message: String,
    },

    /// Show the effective configuration as JSON
    Config,
}

impl Commands {
    /// Runs the command and returns the process exit status.
    pub fn execute(&self, ctx: &mut Context, config: &Config) -> Result<u8> {
        match self {
            Commands::Cat { files } => cat::execute(ctx, files),
            Commands::Pipe { message } => pipe::execute(ctx, message),
            Commands::Dup { file } => dup::execute(ctx, file),
            Commands::Dbg { message } => dbg::execute(ctx, config, message),
            Commands::Config => config::execute(ctx, config),
        }
    }
}
