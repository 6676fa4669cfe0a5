//! Quarry CLI
//!
//! Command-line tools for working with quarry criteria and diffs.
//!
//! # Commands
//!
//! - `compile` - Compile a criteria set against a SQL skeleton
//! - `diff` - Compute the diff between two row arrays
//! - `convert` - Re-encode a diff between JSON and CBOR

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Quarry criteria and diff tools.
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile criteria into SQL statements and parameter sets
    Compile {
        /// SQL skeleton with <<columns>>, <<values>>, <<condition>> markers
        #[arg(short, long)]
        skeleton: String,

        /// Statement verb (select, insert, update, delete, call)
        #[arg(long, default_value = "select")]
        verb: String,

        /// Criteria JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        criteria: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the diff that turns one row array into another
    Diff {
        /// JSON array of rows before
        before: PathBuf,

        /// JSON array of rows after
        after: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Re-encode a diff between JSON and CBOR
    Convert {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Output file, or `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Encoding to read (json, cbor)
        #[arg(long, default_value = "json")]
        from: String,

        /// Encoding to write (json, cbor)
        #[arg(long, default_value = "cbor")]
        to: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile {
            skeleton,
            verb,
            criteria,
            format,
        } => {
            let verb = verb.parse()?;
            let format = format.parse()?;
            commands::compile::run(&skeleton, verb, &criteria, format)?;
        }
        Commands::Diff {
            before,
            after,
            format,
        } => {
            commands::diff::run(&before, &after, format.parse()?)?;
        }
        Commands::Convert {
            input,
            output,
            from,
            to,
        } => {
            commands::convert::run(&input, &output, from.parse()?, to.parse()?)?;
        }
        Commands::Version => {
            println!("Quarry CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Quarry Core v{}", quarry_core::VERSION);
        }
    }

    Ok(())
}
