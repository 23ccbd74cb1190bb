use clap::{ArgAction, Parser};

/// Balans: a tool-calling assistant for 1C ERP workflows.
/// Starts an interactive session by default, or runs a single turn non-interactively.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Run a single turn non-interactively.
    #[arg(short, long)]
    pub turn: Option<String>,
}
