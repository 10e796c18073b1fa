//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Incremental build orchestrator
#[derive(Parser)]
#[command(
    name = "dirtyc",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rebuild only the build units whose sources changed",
    long_about = "Watch a source tree, track changed files and rebuild only the units that own them.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ dirtyc init                 # Create .dirtyc/settings.toml and units.toml\n  $ dirtyc units                # List configured build units\n  $ dirtyc build --dry-run      # Resolve and fake-build every unit\n  $ dirtyc watch --auto         # Rebuild as files change"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show build progress logs (same as logging.default = "info")
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .dirtyc directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .dirtyc/settings.toml")]
    Config,

    /// List build units or find the owner of a file
    #[command(
        about = "List build units from the unit manifest",
        after_help = "Examples:\n  dirtyc units\n  dirtyc units --json\n  dirtyc units --file Assets/Scripts/Player.cs"
    )]
    Units {
        /// Show which unit owns this source file
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build the units owning the given files, once
    #[command(
        about = "Rebuild units affected by the given files",
        long_about = "Mark the given files dirty, rebuild every unit that owns one of them and wait for the result. Without files, every unit is rebuilt.",
        after_help = "Examples:\n  dirtyc build Assets/Scripts/Player.cs\n  dirtyc build --dry-run"
    )]
    Build {
        /// Changed source files
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Resolve units but do not run the compiler
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch the source tree and rebuild on demand
    #[command(
        about = "Watch for changes and rebuild dirty units",
        after_help = "Commands on stdin:\n  b, build    rebuild dirty units now\n  r, reset    reload units and clear dirty state\n  s, status   print session status\n  q, quit     stop watching"
    )]
    Watch {
        /// Rebuild automatically once changes settle
        #[arg(long)]
        auto: bool,

        /// Resolve units but do not run the compiler
        #[arg(long)]
        dry_run: bool,
    },
}
