//! # vchroot-config
//!
//! Configuration management for vchroot.
//!
//! Loads configuration from:
//! 1. `~/.vchroot/config.toml` (global)
//! 2. `.vchroot/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! The inception layer never reads these files. It only sees the environment
//! contract rendered by [`Config::shim_env`] (see [`env`]).

pub mod env;
pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

pub use env::ShimSettings;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root: RootConfig,
    pub paths: PathsConfig,
    pub shadow: ShadowConfig,
    pub shim: ShimConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.vchroot/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Load project config (.vchroot/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::load_file(&project_path)?;
            config.merge(project_config);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Parse a single config file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.vchroot/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vchroot/config.toml"))
    }

    /// Project config path: .vchroot/config.toml relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".vchroot/config.toml")
    }

    /// Merge another config (project overrides global).
    ///
    /// Options replace when set, lists replace when non-empty, flags always
    /// take the project value.
    pub fn merge(&mut self, other: Config) {
        if other.root.base.is_some() {
            self.root.base = other.root.base;
        }
        if other.root.cross.is_some() {
            self.root.cross = other.root.cross;
        }
        self.root.require_cross = other.root.require_cross;
        if !other.paths.exclude.is_empty() {
            self.paths.exclude = other.paths.exclude;
        }
        if !other.paths.own.is_empty() {
            self.paths.own = other.paths.own;
        }
        self.shadow.fake_privileged = other.shadow.fake_privileged;
        if other.shim.library.is_some() {
            self.shim.library = other.shim.library;
        }
        if other.log.level != LogConfig::default().level {
            self.log.level = other.log.level;
        }
    }

    /// Apply environment variable overrides.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(env::BASE).filter(|v| !v.is_empty()) {
            self.root.base = Some(PathBuf::from(base));
        }
        if let Some(cross) = lookup(env::CROSS).filter(|v| !v.is_empty()) {
            self.root.cross = Some(PathBuf::from(cross));
        }
        if let Some(flag) = lookup(env::REQUIRE_CROSS) {
            self.root.require_cross = env::parse_flag(&flag);
        }
        if let Some(list) = lookup(env::EXCLUDE_PATH) {
            self.paths.exclude = env::split_path_list(&list);
        }
        if let Some(list) = lookup(env::OWN_PATH) {
            self.paths.own = env::split_path_list(&list);
        }
        if let Some(flag) = lookup(env::FAKE_PRIVILEGED) {
            self.shadow.fake_privileged = env::parse_flag(&flag);
        }
        if let Some(library) = lookup(env::LIBRARY).filter(|v| !v.is_empty()) {
            self.shim.library = Some(PathBuf::from(library));
        }
        if let Some(level) = lookup(env::LOG).filter(|v| !v.is_empty()) {
            self.log.level = level;
        }
    }

    /// Environment variables a child process needs for the inception layer
    /// to pick up this configuration. `LD_PRELOAD` and `LD_LIBRARY_PATH` are
    /// composed by the launcher since they extend the caller's values.
    pub fn shim_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(base) = &self.root.base {
            vars.push((env::BASE.to_string(), path::display_root(base)));
        }
        if let Some(cross) = &self.root.cross {
            vars.push((env::CROSS.to_string(), path::display_root(cross)));
        }
        if self.root.require_cross {
            vars.push((env::REQUIRE_CROSS.to_string(), "1".to_string()));
        }
        if !self.paths.exclude.is_empty() {
            vars.push((env::EXCLUDE_PATH.to_string(), self.paths.exclude.join(":")));
        }
        if !self.paths.own.is_empty() {
            vars.push((env::OWN_PATH.to_string(), self.paths.own.join(":")));
        }
        if !self.shadow.fake_privileged {
            vars.push((env::FAKE_PRIVILEGED.to_string(), "0".to_string()));
        }
        if self.log.level != LogConfig::default().level {
            vars.push((env::LOG.to_string(), self.log.level.clone()));
        }
        vars
    }

    /// Generate config TOML string
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }
}

/// Virtual root selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Directory presented to the target as `/`
    pub base: Option<PathBuf>,
    /// Alternate root holding host libraries for foreign-architecture runs
    pub cross: Option<PathBuf>,
    /// Refuse `chroot()` emulation when no cross root is configured
    pub require_cross: bool,
}

/// Path classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Virtual prefixes that always address the host (never expanded)
    pub exclude: Vec<String>,
    /// Extra locations holding the inception layer's own components
    pub own: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["/proc".to_string(), "/sys".to_string(), "/dev".to_string()],
            own: Vec::new(),
        }
    }
}

/// Synthetic attribute behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Report success for ownership/device-node calls the kernel refuses with EPERM
    pub fake_privileged: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            fake_privileged: true,
        }
    }
}

/// Inception layer location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Path to `libvchroot_inception_layer.so`
    pub library: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.root.base.is_none());
        assert!(config.shadow.fake_privileged);
        assert!(config.paths.exclude.contains(&"/proc".to_string()));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[paths]"));
        assert!(toml_str.contains("[shadow]"));
        assert!(toml_str.contains("fake_privileged = true"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::BASE, "/srv/chroot"),
            (env::EXCLUDE_PATH, "/proc::/dev/"),
            (env::FAKE_PRIVILEGED, "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.root.base, Some(PathBuf::from("/srv/chroot")));
        assert_eq!(config.paths.exclude, vec!["/proc", "/dev"]);
        assert!(!config.shadow.fake_privileged);
    }

    #[test]
    fn test_shim_env_renders_contract() {
        let mut config = Config::default();
        config.root.base = Some(PathBuf::from("/srv/chroot/"));
        config.root.cross = Some(PathBuf::from("/opt/cross"));
        config.shadow.fake_privileged = false;

        let vars: HashMap<String, String> = config.shim_env().into_iter().collect();
        assert_eq!(vars[env::BASE], "/srv/chroot");
        assert_eq!(vars[env::CROSS], "/opt/cross");
        assert_eq!(vars[env::EXCLUDE_PATH], "/proc:/sys:/dev");
        assert_eq!(vars[env::FAKE_PRIVILEGED], "0");
        assert!(!vars.contains_key(env::REQUIRE_CROSS));
    }

    #[test]
    fn test_merge_project_over_global() {
        let mut global = Config::default();
        global.root.cross = Some(PathBuf::from("/opt/global-cross"));
        global.paths.own = vec!["/usr/lib/vchroot".to_string()];

        let project: Config = toml::from_str(
            r#"
[root]
base = "/srv/project-root"

[paths]
exclude = ["/proc"]
"#,
        )
        .unwrap();
        global.merge(project);

        assert_eq!(global.root.base, Some(PathBuf::from("/srv/project-root")));
        assert_eq!(global.root.cross, Some(PathBuf::from("/opt/global-cross")));
        assert_eq!(global.paths.exclude, vec!["/proc"]);
        assert_eq!(global.paths.own, vec!["/usr/lib/vchroot"]);
    }
}
