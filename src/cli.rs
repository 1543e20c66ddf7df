//! Command-line interface definitions for the `oops` tool.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Run a source file and get its errors explained
#[derive(Parser, Debug)]
#[command(name = "oops", version, about, long_about = None)]
#[command(
    after_help = "EXAMPLES:\n    oops run app.py\n    oops toggle\n    oops explain \"TypeError: undefined is not a function\"\n    oops explain --file build.log\n    oops session main.go"
)]
pub struct Cli {
    /// Show debug logs on stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Quiet mode - hide info and status lines
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run a file and explain anything it writes to stderr
    Run {
        /// File to run; its extension picks the toolchain
        file: Option<PathBuf>,
    },
    /// Turn error explanation on or off
    Toggle,
    /// Show explanation state, key source and config location
    Status,
    /// Explain an error message, or the last line of a file
    Explain {
        /// Explain the last non-empty line of this file
        #[arg(long, short = 'f', value_name = "PATH", conflicts_with = "error")]
        file: Option<PathBuf>,

        /// Error message to explain (reads stdin when piped and empty)
        #[arg(trailing_var_arg = true)]
        error: Vec<String>,
    },
    /// Interactive session: open, run and toggle without restarting
    Session {
        /// File to open at start
        file: Option<PathBuf>,
    },
    /// Enter and store the API key
    Key {
        /// Remove the stored key instead
        #[arg(long)]
        forget: bool,
    },
    /// Print the default configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
