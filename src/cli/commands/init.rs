//! Init and Config commands.

use anyhow::{Context, anyhow};

use crate::config::Settings;

/// Run init command - create configuration file and sample unit manifest.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Describe your build units in .dirtyc/units.toml, then run 'dirtyc units'.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    let toml_str =
        toml::to_string_pretty(config).context("Failed to render configuration as TOML")?;
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{toml_str}");
    Ok(())
}
