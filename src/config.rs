//! Configuration for the build orchestrator.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file (`.dirtyc/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DIRTYC_` and use double
//! underscores to separate nested levels:
//! - `DIRTYC_BUILD__TIMEOUT_MS=60000` sets `build.timeout_ms`
//! - `DIRTYC_WATCH__EXTENSION=rs` sets `watch.extension`
//! - `DIRTYC_BUILD__AUTO_BUILD=true` sets `build.auto_build`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::orchestrator::FailurePolicy;
use crate::unit::OwnershipPolicy;

/// Directory holding settings and the unit manifest.
pub const CONFIG_DIR: &str = ".dirtyc";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .dirtyc is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub units: UnitsConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Source root, relative to the workspace root
    #[serde(default = "default_watch_root")]
    pub root: PathBuf,

    /// Only files with this extension are tracked
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UnitsConfig {
    /// Unit manifest, relative to the workspace root
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// What to do when two units claim the same source file
    #[serde(default)]
    pub ownership: OwnershipPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BuildConfig {
    /// How often the session drains its queue
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Give up on a unit that has not reported after this long (0 disables)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Trigger a build automatically once changes settle
    #[serde(default)]
    pub auto_build: bool,

    /// How long no new changes must arrive before an automatic build
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    #[serde(default)]
    pub command: CommandConfig,
}

/// External compiler invocation. See `backend::command` for placeholders.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct CommandConfig {
    #[serde(default)]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging configuration.
///
/// Controls log verbosity per module. `RUST_LOG` takes precedence.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `dirtyc::orchestrator = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_watch_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_extension() -> String {
    "cs".to_string()
}
fn default_manifest() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("units.toml")
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_timeout_ms() -> u64 {
    300_000
}
fn default_quiet_period_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            watch: WatchConfig::default(),
            units: UnitsConfig::default(),
            build: BuildConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            extension: default_extension(),
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            ownership: OwnershipPolicy::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            timeout_ms: default_timeout_ms(),
            failure_policy: FailurePolicy::default(),
            auto_build: false,
            quiet_period_ms: default_quiet_period_ms(),
            command: CommandConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn env_provider() -> Env {
    // Double underscore separates nested levels; single underscores stay
    // part of the field name.
    Env::prefixed("DIRTYC_").map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .dirtyc directory,
    /// from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .dirtyc is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Base directory relative paths in the settings resolve against.
    ///
    /// A relative `workspace_root` is taken from the current directory.
    pub fn base_dir(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match &self.workspace_root {
            Some(root) => crate::paths::normalize(&cwd, root),
            None => cwd,
        }
    }

    /// Absolute, normalized directory to watch.
    pub fn watch_root(&self) -> PathBuf {
        let base = self.base_dir();
        crate::paths::normalize(&base, &self.watch.root)
    }

    /// Absolute path of the unit manifest.
    pub fn manifest_path(&self) -> PathBuf {
        let base = self.base_dir();
        crate::paths::normalize(&base, &self.units.manifest)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file and a sample unit manifest in the
    /// current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let current_dir = std::env::current_dir()?;
        Self::init_config_file_in(&current_dir, force)
    }

    /// Create a default settings file and a sample unit manifest under `dir`.
    pub fn init_config_file_in(
        dir: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(dir.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Self::create_sample_manifest(&dir.join(&settings.units.manifest), force)?;

        Ok(config_path)
    }

    /// Write a commented sample manifest, unless one exists.
    fn create_sample_manifest(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
        if !force && path.exists() {
            crate::log_event!("config", "kept existing manifest", "{}", path.display());
            return Ok(());
        }

        let sample = r#"# Build units for dirtyc.
#
# Each [[unit]] owns a set of source files. A change to any of them rebuilds
# the unit. Sources are paths or glob patterns relative to the workspace root.
# A source file may belong to only one unit.
#
# [[unit]]
# name = "Game"
# sources = ["Assets/Scripts/**/*.cs"]
# references = ["Library/ScriptAssemblies/Core.dll"]
# defines = ["DEBUG"]
# output = "Library/ScriptAssemblies/Game.dll"
"#;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, sample)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.extension, "cs");
        assert_eq!(settings.units.manifest, PathBuf::from(".dirtyc/units.toml"));
        assert_eq!(settings.units.ownership, OwnershipPolicy::Reject);
        assert_eq!(settings.build.tick_interval_ms, 100);
        assert_eq!(settings.build.timeout_ms, 300_000);
        assert_eq!(settings.build.failure_policy, FailurePolicy::RetainFailed);
        assert!(!settings.build.auto_build);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watch]
root = "Assets"
extension = "cs"

[units]
ownership = "first_wins"

[build]
timeout_ms = 0
failure_policy = "clear_all"
auto_build = true

[build.command]
program = "csc"
args = ["-out:{output}", "{sources}"]

[logging.modules]
"dirtyc::orchestrator" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.root, PathBuf::from("Assets"));
        assert_eq!(settings.units.ownership, OwnershipPolicy::FirstWins);
        assert_eq!(settings.build.timeout_ms, 0);
        assert_eq!(settings.build.failure_policy, FailurePolicy::ClearAll);
        assert!(settings.build.auto_build);
        assert_eq!(settings.build.command.program, "csc");
        assert_eq!(settings.build.command.args.len(), 2);
        assert_eq!(settings.logging.modules["dirtyc::orchestrator"], "debug");
        // Unspecified values keep their defaults
        assert_eq!(settings.build.quiet_period_ms, 500);
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[units]\nownership = \"whoever\"\n").unwrap();

        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.build.tick_interval_ms = 250;
        settings.build.command.program = "mcs".to_string();

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.build.tick_interval_ms, 250);
        assert_eq!(loaded.build.command.program, "mcs");
    }

    #[test]
    fn test_watch_root_and_manifest_resolve_against_workspace() {
        let settings = Settings {
            workspace_root: Some(PathBuf::from("/work/game")),
            watch: WatchConfig {
                root: PathBuf::from("Assets/./Scripts"),
                extension: "cs".to_string(),
            },
            ..Settings::default()
        };

        assert_eq!(settings.watch_root(), PathBuf::from("/work/game/Assets/Scripts"));
        assert_eq!(
            settings.manifest_path(),
            PathBuf::from("/work/game/.dirtyc/units.toml")
        );
    }

    #[test]
    fn test_relative_workspace_root_is_made_absolute() {
        let settings = Settings {
            workspace_root: Some(PathBuf::from("game")),
            ..Settings::default()
        };

        let base = settings.base_dir();
        assert!(base.is_absolute());
        assert!(base.ends_with("game"));
        assert!(settings.manifest_path().is_absolute());
    }

    #[test]
    fn test_init_config_file_in() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(temp_dir.path().join(".dirtyc/units.toml").exists());

        // Second run refuses without force
        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.workspace_root.as_deref(), Some(temp_dir.path()));
    }
}
