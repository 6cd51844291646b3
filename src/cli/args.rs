//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    audit::AuditCommands, cache::CacheCommands, completions::CompletionsArgs,
    config::ConfigCommands, fingerprint::FingerprintArgs, init::InitArgs,
    validate::ValidateArgs,
};

#[derive(Parser)]
#[command(name = "widgetsmith")]
#[command(author, version, about = "Cache, repair and audit generated notebook widgets")]
#[command(long_about = "Inspect and maintain the artifact cache, audit reports and configuration of a widgetsmith project.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .widgetsmith/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new widgetsmith project
    Init(InitArgs),

    /// Compute the cache fingerprint of a widget request
    Fingerprint(FingerprintArgs),

    /// Inspect and maintain the artifact cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Inspect stored audit reports
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Check a widget file for common generation mistakes
    Validate(ValidateArgs),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables and summaries
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// JSON format (for programming)
    Json,
    /// Tab-separated values (for piping)
    Tsv,
}
