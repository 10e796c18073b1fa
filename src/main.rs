use clap::Parser;

use dirtyc::cli::commands::{build, init, units, watch};
use dirtyc::cli::{Cli, Commands};
use dirtyc::config::Settings;

fn load_settings(cli: &Cli) -> Settings {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = load_settings(&cli);
    if config.workspace_root.is_none() {
        // A custom config file anchors relative paths at its parent's parent
        // (`<root>/.dirtyc/settings.toml`)
        config.workspace_root = cli
            .config
            .as_ref()
            .and_then(|p| p.parent())
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .or_else(Settings::workspace_root);
    }

    dirtyc::logging::init_with_config(&config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&config),
        Commands::Units { file, json } => units::run(units::UnitsArgs { file, json }, &config),
        Commands::Build { files, dry_run } => {
            build::run(build::BuildArgs { files, dry_run }, &config).await
        }
        Commands::Watch { auto, dry_run } => {
            watch::run(watch::WatchArgs { auto, dry_run }, &config).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
