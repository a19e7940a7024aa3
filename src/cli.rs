use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Timetable ingestion and reconciliation service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the periodic sync service until interrupted (default)
    Serve,
    /// Run a single sync pass, or sync one group
    Sync {
        #[arg(long)]
        group: Option<String>,
    },
    /// Print a group's schedule as JSON
    Show {
        #[arg(long)]
        group: String,
        /// Show the exam session instead of the term schedule
        #[arg(long)]
        session: bool,
    },
    /// Replace one schedule row from a JSON request file
    Update {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

const fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
