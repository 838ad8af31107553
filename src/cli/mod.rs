//! CLI module for Veritas
//!
//! Provides command-line interface parsing for the veritas binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Veritas - source acquisition and reference consolidation
///
/// Finds, scores and filters web sources for research topics, and merges
/// per-chapter reference lists into one consistently numbered list.
#[derive(Parser, Debug)]
#[command(
    name = "veritas",
    version,
    about = "Veritas - source acquisition and reference consolidation",
    long_about = "Searches configured providers for a topic, evaluates every candidate source\n\
                  for authenticity, reliability, relevance and currency, and keeps the ones\n\
                  worth citing. Also merges chapter reference lists and audits citations.",
    after_help = "EXAMPLES:\n    \
                  veritas init                                   # Write a starter veritas.toml\n    \
                  veritas search \"grid battery storage\" -r market\n    \
                  veritas consolidate ch1.md ch2.md -o report.md\n    \
                  veritas validate-refs report.md\n    \
                  veritas cache stats"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "veritas.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter veritas.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files without prompting
        #[arg(short, long)]
        force: bool,

        /// Evaluation model backend (ollama or openai)
        #[arg(long, default_value = "ollama")]
        model_provider: String,

        /// Primary search provider (tavily or duckduckgo)
        #[arg(long, default_value = "tavily")]
        search_provider: String,
    },

    /// Acquire and evaluate sources for a topic
    Search {
        /// Research topic
        topic: String,

        /// Report type, used to pick the playbook (e.g. market, due_diligence)
        #[arg(short, long, default_value = "")]
        report_type: String,

        /// Search query (repeatable). Defaults to the topic itself
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON outcome to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge chapter files into one document with a global reference list
    Consolidate {
        /// Chapter markdown files, in document order
        #[arg(required = true)]
        chapters: Vec<PathBuf>,

        /// Write the merged document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reference style (ieee or generic). Defaults to the configured style
        #[arg(long)]
        style: Option<String>,
    },

    /// Audit the reference list of a finished document
    ValidateRefs {
        /// Markdown document to check
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the evaluation cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Show configuration information
    Config {
        /// Show the full configuration
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Evaluation cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry counts
    Stats,

    /// Remove every cached evaluation
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Remove expired evaluations
    Purge,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "veritas",
            "search",
            "battery recycling",
            "-r",
            "market",
            "-q",
            "battery recycling market size",
            "-q",
            "lithium recovery rates",
        ])
        .expect("parses");

        match cli.command {
            Commands::Search {
                topic,
                report_type,
                queries,
                json,
                ..
            } => {
                assert_eq!(topic, "battery recycling");
                assert_eq!(report_type, "market");
                assert_eq!(queries.len(), 2);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("veritas.toml"));
    }

    #[test]
    fn test_parse_cache_and_global_flags() {
        let cli = Cli::try_parse_from(["veritas", "cache", "clear", "--force", "-c", "other.toml"])
            .expect("parses");
        assert!(matches!(cli.command, Commands::Cache(CacheCommands::Clear { force: true })));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn test_consolidate_requires_chapters() {
        assert!(Cli::try_parse_from(["veritas", "consolidate"]).is_err());
    }
}
