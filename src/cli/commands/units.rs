//! Units command - list build units or find a file's owner.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::json;

use crate::config::Settings;
use crate::paths;
use crate::unit::{BuildUnit, UnitRegistry, UnitSource};

/// Arguments for the units command.
pub struct UnitsArgs {
    pub file: Option<PathBuf>,
    pub json: bool,
}

fn unit_json(unit: &BuildUnit) -> serde_json::Value {
    json!({
        "name": unit.name(),
        "sources": unit.sources(),
        "references": unit.references(),
        "defines": unit.defines(),
        "output": unit.output(),
    })
}

/// Run the units command.
pub fn run(args: UnitsArgs, settings: &Settings) -> anyhow::Result<()> {
    let UnitsArgs { file, json } = args;

    let source = super::unit_source(settings);
    let units = source
        .load_units()
        .with_context(|| format!("Failed to load units from {}", source.describe()))?;

    let mut registry = UnitRegistry::new(settings.units.ownership);
    let stats = registry
        .rebuild(units)
        .context("Unit manifest has conflicting ownership")?;

    if let Some(file) = file {
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        let path = paths::normalize(&cwd, &file);
        let owner = registry.resolve(&path);
        if json {
            let value = json!({
                "file": path,
                "unit": owner.as_ref().map(|u| u.name()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            match owner {
                Some(unit) => println!("{} -> {}", path.display(), unit.name()),
                None => println!("{} is not part of any build unit", path.display()),
            }
        }
        return Ok(());
    }

    if json {
        let units: Vec<_> = registry.units().map(|u| unit_json(u)).collect();
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No build units defined in {}", source.describe());
        return Ok(());
    }

    println!(
        "{} units, {} source files ({} ownership conflicts resolved)",
        stats.units, stats.files, stats.conflicts
    );
    println!("{}", "=".repeat(50));
    for unit in registry.units() {
        println!(
            "{:<24} {:>5} sources  -> {}",
            unit.name(),
            unit.sources().len(),
            unit.output().display()
        );
    }
    Ok(())
}
